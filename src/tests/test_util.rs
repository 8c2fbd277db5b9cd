use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    index::{b_plus_tree::BPlusTree, codec::NodeCodec, index_types::IndexKey, node::Node},
    storage::{
        disk::manager::Manager,
        page::page::{PageId, INVALID_PAGE_ID},
    },
};

static NEXT_DB_ID: AtomicU32 = AtomicU32::new(0);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A database file under the system temp directory with a per-process
/// unique name, removed again on drop.
pub struct TestDb {
    pub path: PathBuf,
}

impl TestDb {
    pub fn new(tag: &str) -> Self {
        init_logging();
        let id = NEXT_DB_ID.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "basalt-{}-{}-{}.db",
            tag,
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);
        TestDb { path }
    }

    pub fn manager(&self) -> Manager {
        Manager::open(&self.path).unwrap()
    }

    pub fn pool(&self, pool_size: usize, replacer_k: usize) -> Arc<BufferPoolManager> {
        Arc::new(BufferPoolManager::new(pool_size, self.manager(), replacer_k))
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Walk the whole tree asserting the structural invariants: size bounds
/// for every non-root node, parent pointers, separator ordering, and a
/// leaf chain that visits every leaf in strictly increasing key order.
/// Returns all keys in order.
pub fn verify_tree<K: IndexKey>(bpm: &Arc<BufferPoolManager>, tree: &BPlusTree<K>) -> Vec<K> {
    let root = tree.root_page_id();
    if root == INVALID_PAGE_ID {
        return Vec::new();
    }

    let mut leaves_in_order = Vec::new();
    verify_subtree::<K>(bpm, root, INVALID_PAGE_ID, None, None, &mut leaves_in_order);

    // The leaf chain must visit exactly the in-order leaves.
    let mut chained = Vec::new();
    let mut current = leaves_in_order[0];
    while current != INVALID_PAGE_ID {
        let node = read_node::<K>(bpm, current);
        chained.push(current);
        current = node.leaf_next();
    }
    assert_eq!(
        chained, leaves_in_order,
        "leaf chain disagrees with in-order traversal"
    );

    let mut keys = Vec::new();
    for leaf in &leaves_in_order {
        let node = read_node::<K>(bpm, *leaf);
        keys.extend(node.leaf_entries().iter().map(|(k, _)| k.clone()));
    }
    assert!(
        keys.windows(2).all(|w| w[0] < w[1]),
        "keys across the leaf chain are not strictly increasing"
    );
    keys
}

pub fn read_node<K: IndexKey>(bpm: &Arc<BufferPoolManager>, page_id: PageId) -> Node<K> {
    let page = bpm.fetch_page(page_id).expect("buffer pool exhausted");
    let guard = page.read();
    let node = NodeCodec::decode::<K>(&guard[..]).unwrap();
    drop(guard);
    bpm.unpin_page(page_id, false);
    node
}

fn verify_subtree<K: IndexKey>(
    bpm: &Arc<BufferPoolManager>,
    page_id: PageId,
    expected_parent: PageId,
    lower: Option<&K>,
    upper: Option<&K>,
    leaves: &mut Vec<PageId>,
) {
    let node = read_node::<K>(bpm, page_id);
    assert_eq!(node.page_id, page_id, "page id mismatch in node header");
    assert_eq!(
        node.parent_page_id, expected_parent,
        "parent pointer of page {} is wrong",
        page_id
    );
    if !node.is_root() {
        assert!(
            (node.min_size()..=node.max_size).contains(&node.size()),
            "page {} violates size bounds: {} not in {}..={}",
            page_id,
            node.size(),
            node.min_size(),
            node.max_size
        );
    }

    let in_bounds = |key: &K| {
        lower.map_or(true, |low| key >= low) && upper.map_or(true, |up| key < up)
    };

    if node.is_leaf() {
        let entries = node.leaf_entries();
        assert!(
            entries.windows(2).all(|w| w[0].0 < w[1].0),
            "leaf {} keys out of order",
            page_id
        );
        for (key, _) in entries {
            assert!(in_bounds(key), "leaf {} key {:?} out of bounds", page_id, key);
        }
        leaves.push(page_id);
        return;
    }

    let keys = node.internal_keys();
    assert!(
        keys.windows(2).all(|w| w[0] < w[1]),
        "internal {} separators out of order",
        page_id
    );
    for key in keys {
        assert!(in_bounds(key), "internal {} separator {:?} out of bounds", page_id, key);
    }

    let children = node.internal_children();
    for (i, child) in children.iter().enumerate() {
        let child_lower = if i == 0 { lower } else { Some(&keys[i - 1]) };
        let child_upper = if i == children.len() - 1 {
            upper
        } else {
            Some(&keys[i])
        };
        verify_subtree::<K>(bpm, *child, page_id, child_lower, child_upper, leaves);
    }
}
