use std::sync::Arc;

use crate::utils::extendible_hash_table::ExtendibleHashTable;

#[test]
fn insert_find_remove() {
    let table: ExtendibleHashTable<u32, String> = ExtendibleHashTable::new(4);

    assert_eq!(table.find(&1), None);
    table.insert(1, "a".to_string());
    table.insert(2, "b".to_string());
    assert_eq!(table.find(&1).as_deref(), Some("a"));
    assert_eq!(table.find(&2).as_deref(), Some("b"));
    assert_eq!(table.len(), 2);

    // Upsert does not grow the table.
    table.insert(1, "a2".to_string());
    assert_eq!(table.find(&1).as_deref(), Some("a2"));
    assert_eq!(table.len(), 2);

    assert!(table.remove(&1));
    assert!(!table.remove(&1));
    assert_eq!(table.find(&1), None);
    assert_eq!(table.len(), 1);
}

#[test]
fn buckets_split_and_directory_doubles() {
    let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);
    assert_eq!(table.global_depth(), 0);
    assert_eq!(table.num_buckets(), 1);

    for key in 0..64u32 {
        table.insert(key, key * 10);
    }

    // 64 entries cannot fit in one two-slot bucket; the directory must
    // have doubled and buckets split along the way.
    assert!(table.global_depth() >= 1);
    assert!(table.num_buckets() > 1);
    assert_eq!(table.len(), 64);

    // Every slot's local depth is bounded by the global depth.
    for index in 0..(1usize << table.global_depth()) {
        assert!(table.local_depth(index) <= table.global_depth());
    }

    for key in 0..64u32 {
        assert_eq!(table.find(&key), Some(key * 10), "key {} lost", key);
    }
    assert_eq!(table.find(&64), None);
}

#[test]
fn removal_keeps_remaining_entries_reachable() {
    let table: ExtendibleHashTable<u32, u32> = ExtendibleHashTable::new(2);
    for key in 0..32u32 {
        table.insert(key, key);
    }
    for key in (0..32u32).step_by(2) {
        assert!(table.remove(&key));
    }
    for key in 0..32u32 {
        if key % 2 == 0 {
            assert_eq!(table.find(&key), None);
        } else {
            assert_eq!(table.find(&key), Some(key));
        }
    }
    assert_eq!(table.len(), 16);
}

#[test]
fn concurrent_inserts_do_not_lose_entries() {
    let table: Arc<ExtendibleHashTable<u32, u32>> = Arc::new(ExtendibleHashTable::new(4));
    let threads = 4;
    let per_thread = 500u32;

    std::thread::scope(|scope| {
        for t in 0..threads {
            let table = Arc::clone(&table);
            scope.spawn(move || {
                let base = t * per_thread;
                for key in base..base + per_thread {
                    table.insert(key, key + 1);
                }
            });
        }
    });

    assert_eq!(table.len(), (threads * per_thread) as usize);
    for key in 0..threads * per_thread {
        assert_eq!(table.find(&key), Some(key + 1));
    }
}
