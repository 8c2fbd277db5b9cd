use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::Mutex;

struct Bucket<K, V> {
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(depth: usize) -> Self {
        Bucket {
            depth,
            items: Vec::new(),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    num_entries: usize,
    slots: Vec<Arc<Mutex<Bucket<K, V>>>>,
}

/// Extendible hash table: a power-of-two directory of shared bucket
/// handles. A full bucket splits locally; the directory doubles only when
/// the splitting bucket's local depth has caught up with the global
/// depth. One table mutex serializes all operations.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    dir: Mutex<Directory<K, V>>,
}

fn hash_of<K: Hash>(key: &K) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish() as usize
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size >= 1);
        ExtendibleHashTable {
            bucket_size,
            dir: Mutex::new(Directory {
                global_depth: 0,
                num_buckets: 1,
                num_entries: 0,
                slots: vec![Arc::new(Mutex::new(Bucket::new(0)))],
            }),
        }
    }

    fn index_of(global_depth: usize, key: &K) -> usize {
        hash_of(key) & ((1usize << global_depth) - 1)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.dir.lock();
        let idx = Self::index_of(dir.global_depth, key);
        let bucket = dir.slots[idx].lock();
        bucket.find(key).cloned()
    }

    /// Upsert. Splits the target bucket (and doubles the directory when
    /// required) until the key fits.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.dir.lock();

        {
            let idx = Self::index_of(dir.global_depth, &key);
            let mut bucket = dir.slots[idx].lock();
            if let Some(slot) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
                return;
            }
        }

        loop {
            let idx = Self::index_of(dir.global_depth, &key);
            let bucket_handle = Arc::clone(&dir.slots[idx]);
            let bucket = bucket_handle.lock();
            if bucket.items.len() < self.bucket_size {
                break;
            }
            let local_depth = bucket.depth;
            drop(bucket);

            if local_depth == dir.global_depth {
                // Double the directory: slot i and i + old_size alias the
                // same bucket until a split separates them.
                let old_size = dir.slots.len();
                for i in 0..old_size {
                    let alias = Arc::clone(&dir.slots[i]);
                    dir.slots.push(alias);
                }
                dir.global_depth += 1;
            }

            Self::split_bucket(&mut dir, self.bucket_size, &bucket_handle, local_depth);
        }

        let idx = Self::index_of(dir.global_depth, &key);
        dir.slots[idx].lock().items.push((key, value));
        dir.num_entries += 1;
    }

    fn split_bucket(
        dir: &mut Directory<K, V>,
        bucket_size: usize,
        old_bucket: &Arc<Mutex<Bucket<K, V>>>,
        old_depth: usize,
    ) {
        let mut zero = Bucket::new(old_depth + 1);
        let mut one = Bucket::new(old_depth + 1);
        zero.items.reserve(bucket_size);
        one.items.reserve(bucket_size);

        let distinguishing_bit = 1usize << old_depth;
        for (k, v) in old_bucket.lock().items.drain(..) {
            if hash_of(&k) & distinguishing_bit != 0 {
                one.items.push((k, v));
            } else {
                zero.items.push((k, v));
            }
        }

        let zero = Arc::new(Mutex::new(zero));
        let one = Arc::new(Mutex::new(one));
        for i in 0..dir.slots.len() {
            if Arc::ptr_eq(&dir.slots[i], old_bucket) {
                dir.slots[i] = if i & distinguishing_bit != 0 {
                    Arc::clone(&one)
                } else {
                    Arc::clone(&zero)
                };
            }
        }
        dir.num_buckets += 1;
    }

    pub fn remove(&self, key: &K) -> bool {
        let mut dir = self.dir.lock();
        let idx = Self::index_of(dir.global_depth, key);
        let bucket_handle = Arc::clone(&dir.slots[idx]);
        let mut bucket = bucket_handle.lock();
        let Some(pos) = bucket.items.iter().position(|(k, _)| k == key) else {
            return false;
        };
        bucket.items.remove(pos);
        drop(bucket);
        dir.num_entries -= 1;
        true
    }

    pub fn global_depth(&self) -> usize {
        self.dir.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        self.dir.lock().slots[dir_index].lock().depth
    }

    pub fn num_buckets(&self) -> usize {
        self.dir.lock().num_buckets
    }

    pub fn len(&self) -> usize {
        self.dir.lock().num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
