pub mod b_plus_tree;
pub mod codec;
pub mod index_iterator;
pub mod index_types;
pub mod node;
