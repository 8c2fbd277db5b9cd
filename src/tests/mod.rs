pub mod test_util;

mod concurrency_test;
mod extendible_hash_test;
mod iterator_test;
mod replacer_test;
