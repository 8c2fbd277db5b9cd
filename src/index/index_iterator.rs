use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    index::{
        codec::NodeCodec,
        index_types::{IndexKey, Rid},
        node::Node,
    },
    storage::page::page::{PageId, INVALID_PAGE_ID},
};

/// Forward scan over the leaf chain.
///
/// Semantics are **live**: every step briefly read-latches the current
/// leaf and yields the first currently-present key greater than the last
/// key yielded (or at/after the start key before the first yield),
/// following `next` links as leaves run out. Under concurrent mutation
/// the sequence is therefore always strictly increasing; keys inserted
/// behind the cursor are not revisited and keys deleted ahead of it are
/// not produced. The iterator holds no pins or latches between steps.
pub struct IndexIterator<K: IndexKey> {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    start_key: Option<K>,
    last_key: Option<K>,
}

impl<K: IndexKey> IndexIterator<K> {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, start_key: Option<K>) -> Self {
        IndexIterator {
            bpm,
            page_id,
            start_key,
            last_key: None,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        IndexIterator {
            bpm,
            page_id: INVALID_PAGE_ID,
            start_key: None,
            last_key: None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.page_id == INVALID_PAGE_ID
    }
}

impl<K: IndexKey> Iterator for IndexIterator<K> {
    type Item = Result<(K, Rid)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }
            let Some(page) = self.bpm.fetch_page(self.page_id) else {
                self.page_id = INVALID_PAGE_ID;
                return Some(Err(anyhow!("buffer pool exhausted during index scan")));
            };
            let guard = page.read();
            let node: Node<K> = match NodeCodec::decode(&guard[..]) {
                Ok(node) => node,
                Err(err) => {
                    drop(guard);
                    self.bpm.unpin_page(self.page_id, false);
                    self.page_id = INVALID_PAGE_ID;
                    return Some(Err(err));
                }
            };
            if !node.is_leaf() {
                // The page was recycled out from under a stale cursor.
                drop(guard);
                self.bpm.unpin_page(self.page_id, false);
                self.page_id = INVALID_PAGE_ID;
                return None;
            }

            let entries = node.leaf_entries();
            let position = match (&self.last_key, &self.start_key) {
                (Some(last), _) => entries.partition_point(|(k, _)| k <= last),
                (None, Some(start)) => entries.partition_point(|(k, _)| k < start),
                (None, None) => 0,
            };

            if position < entries.len() {
                let (key, rid) = entries[position].clone();
                drop(guard);
                self.bpm.unpin_page(self.page_id, false);
                self.last_key = Some(key.clone());
                return Some(Ok((key, rid)));
            }

            let next = node.leaf_next();
            drop(guard);
            self.bpm.unpin_page(self.page_id, false);
            self.page_id = next;
        }
    }
}
