use std::sync::Arc;

use crate::{
    index::{b_plus_tree::BPlusTree, index_types::Rid},
    tests::test_util::TestDb,
};

fn build_tree(db: &TestDb, keys: impl IntoIterator<Item = i64>) -> BPlusTree<i64> {
    let bpm = db.pool(16, 2);
    let tree = BPlusTree::new("scan", Arc::clone(&bpm), 4, 4).unwrap();
    for key in keys {
        assert!(tree.insert(&key, Rid::new(0, key as u32)).unwrap());
    }
    tree
}

fn collect(iter: impl Iterator<Item = anyhow::Result<(i64, Rid)>>) -> Vec<i64> {
    iter.map(|item| item.unwrap().0).collect()
}

#[test]
fn full_scan_yields_every_key_in_order() {
    let db = TestDb::new("scan-full");
    let tree = build_tree(&db, 1..=100);

    let keys = collect(tree.iter().unwrap());
    assert_eq!(keys, (1..=100).collect::<Vec<i64>>());
}

#[test]
fn scan_from_key_starts_at_lower_bound() {
    let db = TestDb::new("scan-from");
    let tree = build_tree(&db, 1..=100);

    let keys = collect(tree.iter_from(&37).unwrap());
    assert_eq!(keys, (37..=100).collect::<Vec<i64>>());

    // A start key between stored keys positions at the next larger one.
    let sparse_db = TestDb::new("scan-sparse");
    let sparse = build_tree(&sparse_db, (0..50i64).map(|k| k * 2));
    let keys = collect(sparse.iter_from(&31).unwrap());
    assert_eq!(keys.first(), Some(&32));

    // Past the last key the iterator is immediately exhausted.
    assert_eq!(collect(tree.iter_from(&101).unwrap()), Vec::<i64>::new());
}

#[test]
fn scan_of_empty_tree_is_exhausted() {
    let db = TestDb::new("scan-empty");
    let bpm = db.pool(8, 2);
    let tree: BPlusTree<i64> = BPlusTree::new("scan", Arc::clone(&bpm), 4, 4).unwrap();

    let mut iter = tree.iter().unwrap();
    assert!(iter.is_end());
    assert!(iter.next().is_none());
}

#[test]
fn scan_stays_monotonic_across_mid_scan_delete() {
    let db = TestDb::new("scan-delete");
    let tree = build_tree(&db, 1..=100);

    let mut iter = tree.iter_from(&37).unwrap();
    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(iter.next().unwrap().unwrap().0);
    }
    assert_eq!(seen, vec![37, 38, 39, 40, 41]);

    // Delete a key ahead of the cursor; the live scan must skip it and
    // stay strictly increasing.
    tree.remove(&50).unwrap();
    seen.extend(collect(iter));

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "sequence not increasing");
    assert!(!seen.contains(&50));
    let expected: Vec<i64> = (37..=100).filter(|k| *k != 50).collect();
    assert_eq!(seen, expected);
}
