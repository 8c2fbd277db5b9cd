use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    index::{b_plus_tree::BPlusTree, index_types::Rid},
    tests::test_util::{verify_tree, TestDb},
};

const THREADS: i64 = 4;
const KEYS_PER_THREAD: i64 = 200;

fn rid(key: i64) -> Rid {
    Rid::new(key as u32, 0)
}

#[test]
fn concurrent_disjoint_inserts() {
    let db = TestDb::new("conc-insert");
    // Far fewer frames than pages of data, so eviction runs constantly.
    let bpm = db.pool(64, 2);
    let tree: Arc<BPlusTree<i64>> =
        Arc::new(BPlusTree::new("pk", Arc::clone(&bpm), 4, 4).unwrap());

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let tree = Arc::clone(&tree);
            scope.spawn(move || {
                let base = t * 1000;
                for i in 0..KEYS_PER_THREAD {
                    let key = base + i;
                    assert!(tree.insert(&key, rid(key)).unwrap());
                }
            });
        }
    });

    let mut expected = Vec::new();
    for t in 0..THREADS {
        for i in 0..KEYS_PER_THREAD {
            expected.push(t * 1000 + i);
        }
    }
    expected.sort_unstable();

    for key in &expected {
        assert_eq!(tree.get_value(key).unwrap(), Some(rid(*key)), "key {}", key);
    }
    assert_eq!(verify_tree(&bpm, &tree), expected);
}

#[test]
fn concurrent_overlapping_inserts_keep_keys_unique() {
    let db = TestDb::new("conc-overlap");
    let bpm = db.pool(64, 2);
    let tree: Arc<BPlusTree<i64>> =
        Arc::new(BPlusTree::new("pk", Arc::clone(&bpm), 4, 4).unwrap());
    let successes = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            let tree = Arc::clone(&tree);
            let successes = &successes;
            scope.spawn(move || {
                for key in 0..KEYS_PER_THREAD {
                    if tree.insert(&key, rid(key)).unwrap() {
                        successes.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    // Every key won exactly once across all threads.
    assert_eq!(successes.load(Ordering::Relaxed), KEYS_PER_THREAD as usize);
    assert_eq!(
        verify_tree(&bpm, &tree),
        (0..KEYS_PER_THREAD).collect::<Vec<i64>>()
    );
}

#[test]
fn concurrent_mixed_insert_remove_lookup() {
    let db = TestDb::new("conc-mixed");
    let bpm = db.pool(64, 2);
    let tree: Arc<BPlusTree<i64>> =
        Arc::new(BPlusTree::new("pk", Arc::clone(&bpm), 4, 4).unwrap());

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let tree = Arc::clone(&tree);
            scope.spawn(move || {
                let base = t * 1000;
                for i in 0..KEYS_PER_THREAD {
                    let key = base + i;
                    assert!(tree.insert(&key, rid(key)).unwrap());
                    // Interleave lookups of our own recent writes.
                    if i % 7 == 0 {
                        assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)));
                    }
                }
                // Each thread removes the even half of its own range.
                for i in (0..KEYS_PER_THREAD).step_by(2) {
                    tree.remove(&(base + i)).unwrap();
                }
            });
        }
    });

    let mut expected = Vec::new();
    for t in 0..THREADS {
        for i in (1..KEYS_PER_THREAD).step_by(2) {
            expected.push(t * 1000 + i);
        }
    }
    expected.sort_unstable();

    for t in 0..THREADS {
        for i in 0..KEYS_PER_THREAD {
            let key = t * 1000 + i;
            let found = tree.get_value(&key).unwrap();
            if i % 2 == 0 {
                assert_eq!(found, None, "removed key {} resurfaced", key);
            } else {
                assert_eq!(found, Some(rid(key)), "surviving key {} lost", key);
            }
        }
    }
    // Leaf-link order must agree with in-order traversal after the dust
    // settles.
    assert_eq!(verify_tree(&bpm, &tree), expected);
}
