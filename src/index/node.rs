use crate::{
    index::index_types::{IndexKey, Rid},
    storage::page::page::{PageId, INVALID_PAGE_ID},
};

/// Decoded shape of a tree page. An internal node with `n` children
/// carries `n - 1` separator keys: `children[0]` covers keys below
/// `keys[0]`, `children[i]` covers `keys[i-1] <= k < keys[i]`.
#[derive(Clone, Debug, PartialEq)]
pub enum NodePayload<K> {
    Internal {
        keys: Vec<K>,
        children: Vec<PageId>,
    },
    Leaf {
        entries: Vec<(K, Rid)>,
        next_page_id: PageId,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node<K> {
    pub page_id: PageId,
    pub parent_page_id: PageId,
    pub max_size: usize,
    pub payload: NodePayload<K>,
}

impl<K: IndexKey> Node<K> {
    pub fn new_leaf(page_id: PageId, parent_page_id: PageId, max_size: usize) -> Self {
        Node {
            page_id,
            parent_page_id,
            max_size,
            payload: NodePayload::Leaf {
                entries: Vec::new(),
                next_page_id: INVALID_PAGE_ID,
            },
        }
    }

    pub fn new_internal(
        page_id: PageId,
        parent_page_id: PageId,
        max_size: usize,
        keys: Vec<K>,
        children: Vec<PageId>,
    ) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Node {
            page_id,
            parent_page_id,
            max_size,
            payload: NodePayload::Internal { keys, children },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.payload, NodePayload::Leaf { .. })
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id == INVALID_PAGE_ID
    }

    /// Entry count for leaves, child count for internal nodes.
    pub fn size(&self) -> usize {
        match &self.payload {
            NodePayload::Leaf { entries, .. } => entries.len(),
            NodePayload::Internal { children, .. } => children.len(),
        }
    }

    /// Occupancy floor. The root is exempt from the halves rule: a root
    /// leaf only needs one entry, a root internal node two children
    /// (below that it collapses).
    pub fn min_size(&self) -> usize {
        if self.is_root() {
            if self.is_leaf() {
                1
            } else {
                2
            }
        } else if self.is_leaf() {
            self.max_size / 2
        } else {
            (self.max_size + 1) / 2
        }
    }

    // ---- leaf accessors ------------------------------------------------

    pub fn leaf_entries(&self) -> &Vec<(K, Rid)> {
        match &self.payload {
            NodePayload::Leaf { entries, .. } => entries,
            _ => unreachable!("leaf access on internal node {}", self.page_id),
        }
    }

    pub fn leaf_entries_mut(&mut self) -> &mut Vec<(K, Rid)> {
        let page_id = self.page_id;
        match &mut self.payload {
            NodePayload::Leaf { entries, .. } => entries,
            _ => unreachable!("leaf access on internal node {}", page_id),
        }
    }

    pub fn leaf_next(&self) -> PageId {
        match &self.payload {
            NodePayload::Leaf { next_page_id, .. } => *next_page_id,
            _ => unreachable!("leaf access on internal node {}", self.page_id),
        }
    }

    pub fn set_leaf_next(&mut self, next: PageId) {
        let page_id = self.page_id;
        match &mut self.payload {
            NodePayload::Leaf { next_page_id, .. } => *next_page_id = next,
            _ => unreachable!("leaf access on internal node {}", page_id),
        }
    }

    pub fn leaf_lookup(&self, key: &K) -> Option<Rid> {
        let entries = self.leaf_entries();
        entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| entries[i].1)
    }

    /// Sorted insert; false on a duplicate key.
    pub fn leaf_insert(&mut self, key: K, rid: Rid) -> bool {
        let entries = self.leaf_entries_mut();
        match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(_) => false,
            Err(pos) => {
                entries.insert(pos, (key, rid));
                true
            }
        }
    }

    /// False when the key is absent.
    pub fn leaf_remove(&mut self, key: &K) -> bool {
        let entries = self.leaf_entries_mut();
        match entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(pos) => {
                entries.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    // ---- internal accessors --------------------------------------------

    pub fn internal_keys(&self) -> &Vec<K> {
        match &self.payload {
            NodePayload::Internal { keys, .. } => keys,
            _ => unreachable!("internal access on leaf node {}", self.page_id),
        }
    }

    pub fn internal_keys_mut(&mut self) -> &mut Vec<K> {
        let page_id = self.page_id;
        match &mut self.payload {
            NodePayload::Internal { keys, .. } => keys,
            _ => unreachable!("internal access on leaf node {}", page_id),
        }
    }

    pub fn internal_children(&self) -> &Vec<PageId> {
        match &self.payload {
            NodePayload::Internal { children, .. } => children,
            _ => unreachable!("internal access on leaf node {}", self.page_id),
        }
    }

    pub fn internal_children_mut(&mut self) -> &mut Vec<PageId> {
        let page_id = self.page_id;
        match &mut self.payload {
            NodePayload::Internal { children, .. } => children,
            _ => unreachable!("internal access on leaf node {}", page_id),
        }
    }

    /// Child covering `key`: binary search for the greatest separator
    /// at most `key`.
    pub fn child_for(&self, key: &K) -> PageId {
        let idx = self.internal_keys().partition_point(|k| k <= key);
        self.internal_children()[idx]
    }

    pub fn child_index(&self, child: PageId) -> Option<usize> {
        self.internal_children().iter().position(|c| *c == child)
    }

    /// Insert a separator and its right child in key order.
    pub fn internal_insert(&mut self, key: K, right_child: PageId) {
        let pos = self.internal_keys().partition_point(|k| *k <= key);
        self.internal_keys_mut().insert(pos, key);
        self.internal_children_mut().insert(pos + 1, right_child);
    }
}
