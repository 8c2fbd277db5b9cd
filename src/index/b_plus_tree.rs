use std::{collections::VecDeque, fmt::Write as _, marker::PhantomData, sync::Arc};

use anyhow::{Context as _, Result};
use log::trace;
use parking_lot::{
    lock_api::{ArcRwLockUpgradableReadGuard, ArcRwLockWriteGuard},
    RawRwLock, RwLock,
};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    index::{
        codec::{internal_capacity, leaf_capacity, NodeCodec},
        index_iterator::IndexIterator,
        index_types::{IndexKey, Rid},
        node::Node,
    },
    storage::page::{
        header_page::HeaderPage,
        page::{Page, PageId, PageReadGuard, PageWriteGuard, HEADER_PAGE_ID, INVALID_PAGE_ID},
    },
};

type RootWriteGuard = ArcRwLockWriteGuard<RawRwLock, PageId>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Operation {
    Insert,
    Remove,
}

/// One entry of the crabbing held set: either the tree-wide root latch
/// (always at the bottom of the set when held) or a write-latched,
/// pinned page.
enum LatchEntry {
    Root(RootWriteGuard),
    Page(Arc<Page>, PageWriteGuard),
}

/// Per-operation descent state: the ordered held set of write latches
/// plus the pages emptied by merges, which are handed back to the buffer
/// pool only after every latch is dropped. Dropping a `Context` releases
/// anything still held (error paths), without marking pages dirty.
struct Context {
    bpm: Arc<BufferPoolManager>,
    write_set: VecDeque<LatchEntry>,
    deleted: Vec<PageId>,
}

impl Context {
    fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Context {
            bpm,
            write_set: VecDeque::new(),
            deleted: Vec::new(),
        }
    }

    fn push_root(&mut self, guard: RootWriteGuard) {
        debug_assert!(self.write_set.is_empty());
        self.write_set.push_back(LatchEntry::Root(guard));
    }

    fn push_page(&mut self, page: Arc<Page>, guard: PageWriteGuard) {
        self.write_set.push_back(LatchEntry::Page(page, guard));
    }

    /// Release every held latch, oldest ancestor first. Pages are
    /// unpinned after their latch is dropped.
    fn release_all(&mut self, is_dirty: bool) {
        while let Some(entry) = self.write_set.pop_front() {
            match entry {
                LatchEntry::Root(guard) => drop(guard),
                LatchEntry::Page(page, guard) => {
                    let page_id = page.page_id();
                    drop(guard);
                    self.bpm.unpin_page(page_id, is_dirty);
                }
            }
        }
    }

    fn holds_page(&self, page_id: PageId) -> bool {
        self.write_set.iter().any(|entry| {
            matches!(entry, LatchEntry::Page(page, _) if page.page_id() == page_id)
        })
    }

    fn page_guard(&self, page_id: PageId) -> &PageWriteGuard {
        self.write_set
            .iter()
            .rev()
            .find_map(|entry| match entry {
                LatchEntry::Page(page, guard) if page.page_id() == page_id => Some(guard),
                _ => None,
            })
            .expect("page not in the held set")
    }

    fn page_guard_mut(&mut self, page_id: PageId) -> &mut PageWriteGuard {
        self.write_set
            .iter_mut()
            .rev()
            .find_map(|entry| match entry {
                LatchEntry::Page(page, guard) if page.page_id() == page_id => Some(guard),
                _ => None,
            })
            .expect("page not in the held set")
    }

    /// Update the root page id through the held root latch.
    fn set_root_id(&mut self, root: PageId) {
        for entry in self.write_set.iter_mut() {
            if let LatchEntry::Root(guard) = entry {
                **guard = root;
                return;
            }
        }
        panic!("root latch not in the held set");
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.release_all(false);
    }
}

/// Unique-key B+ tree over buffer-pool pages.
///
/// Reads crab down with read latches. Writes first descend
/// optimistically (read latches on internals, a write latch only on the
/// leaf) and, when the leaf turns out unsafe, restart pessimistically,
/// write-latching the whole path and releasing ancestors as soon as a
/// node is known safe. The restart re-latches the same leaf a second
/// time within one operation; nothing relies on latch reentrancy. A
/// tree-wide root latch guards the root page id and the empty
/// transition, and the header page record is rewritten under it on
/// every root change.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    root_page_id: Arc<RwLock<PageId>>,
    leaf_max_size: usize,
    internal_max_size: usize,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Open (or register) the named index. The root page id is loaded
    /// from the header page record.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = name.into();
        assert!(
            (3..=leaf_capacity::<K>()).contains(&leaf_max_size),
            "leaf max size {} out of range",
            leaf_max_size
        );
        assert!(
            (3..=internal_capacity::<K>()).contains(&internal_max_size),
            "internal max size {} out of range",
            internal_max_size
        );

        let header = bpm
            .fetch_page(HEADER_PAGE_ID)
            .context("buffer pool exhausted")?;
        let mut guard = header.write();
        let root_page_id = match HeaderPage::get_root_id(&guard, &index_name) {
            Some(root) => {
                drop(guard);
                bpm.unpin_page(HEADER_PAGE_ID, false);
                root
            }
            None => {
                let inserted = HeaderPage::insert_record(&mut guard, &index_name, INVALID_PAGE_ID);
                assert!(inserted, "header page full");
                drop(guard);
                bpm.unpin_page(HEADER_PAGE_ID, true);
                INVALID_PAGE_ID
            }
        };

        Ok(BPlusTree {
            index_name,
            bpm,
            root_page_id: Arc::new(RwLock::new(root_page_id)),
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    // ---- public operations ---------------------------------------------

    /// Point lookup.
    pub fn get_value(&self, key: &K) -> Result<Option<Rid>> {
        let Some((page, guard)) = self.find_leaf_read(Some(key))? else {
            return Ok(None);
        };
        let leaf: Node<K> = NodeCodec::decode(&guard[..])?;
        let found = leaf.leaf_lookup(key);
        let page_id = page.page_id();
        drop(guard);
        self.bpm.unpin_page(page_id, false);
        Ok(found)
    }

    /// False iff the key already exists.
    pub fn insert(&self, key: &K, rid: Rid) -> Result<bool> {
        let mut ctx = Context::new(Arc::clone(&self.bpm));
        let leaf_page_id = self
            .find_leaf_write(key, Operation::Insert, &mut ctx)?
            .expect("insert descent always yields a leaf");

        let mut leaf: Node<K> = NodeCodec::decode(&ctx.page_guard(leaf_page_id)[..])?;
        if !leaf.leaf_insert(key.clone(), rid) {
            ctx.release_all(false);
            return Ok(false);
        }

        if leaf.size() < self.leaf_max_size {
            self.write_node(&mut ctx, &leaf);
            ctx.release_all(true);
            return Ok(true);
        }

        self.split_leaf(&mut ctx, leaf)?;
        ctx.release_all(true);
        Ok(true)
    }

    /// No-op if the key is absent.
    pub fn remove(&self, key: &K) -> Result<()> {
        let mut ctx = Context::new(Arc::clone(&self.bpm));
        let Some(leaf_page_id) = self.find_leaf_write(key, Operation::Remove, &mut ctx)? else {
            return Ok(()); // empty tree
        };

        let mut leaf: Node<K> = NodeCodec::decode(&ctx.page_guard(leaf_page_id)[..])?;
        if !leaf.leaf_remove(key) {
            ctx.release_all(false);
            return Ok(());
        }
        self.write_node(&mut ctx, &leaf);

        if leaf.is_root() {
            if leaf.size() == 0 {
                // Last key gone: invalidate the root id instead of
                // leaving a zombie root resident.
                ctx.set_root_id(INVALID_PAGE_ID);
                self.persist_root_id(INVALID_PAGE_ID)?;
                ctx.deleted.push(leaf_page_id);
                trace!("index {}: tree emptied", self.index_name);
            }
        } else if leaf.size() < leaf.min_size() {
            self.handle_underflow(&mut ctx, leaf_page_id)?;
        }

        let deleted = std::mem::take(&mut ctx.deleted);
        ctx.release_all(true);
        for page_id in deleted {
            let ok = self.bpm.delete_page(page_id);
            debug_assert!(ok, "deferred delete of page {} failed", page_id);
        }
        Ok(())
    }

    /// Forward iterator from the leftmost key.
    pub fn iter(&self) -> Result<IndexIterator<K>> {
        match self.find_leaf_read(None)? {
            Some((page, guard)) => {
                let page_id = page.page_id();
                drop(guard);
                self.bpm.unpin_page(page_id, false);
                Ok(IndexIterator::new(Arc::clone(&self.bpm), page_id, None))
            }
            None => Ok(IndexIterator::end(Arc::clone(&self.bpm))),
        }
    }

    /// Forward iterator positioned at the first key >= `key`.
    pub fn iter_from(&self, key: &K) -> Result<IndexIterator<K>> {
        match self.find_leaf_read(Some(key))? {
            Some((page, guard)) => {
                let page_id = page.page_id();
                drop(guard);
                self.bpm.unpin_page(page_id, false);
                Ok(IndexIterator::new(
                    Arc::clone(&self.bpm),
                    page_id,
                    Some(key.clone()),
                ))
            }
            None => Ok(IndexIterator::end(Arc::clone(&self.bpm))),
        }
    }

    /// Render the tree level by level (debugging aid for tests).
    pub fn dump(&self) -> Result<String> {
        let root = *self.root_page_id.read();
        let mut out = String::new();
        if root == INVALID_PAGE_ID {
            out.push_str("(empty tree)\n");
            return Ok(out);
        }
        self.dump_node(root, 0, &mut out)?;
        Ok(out)
    }

    // ---- descent --------------------------------------------------------

    fn fetch(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.bpm
            .fetch_page(page_id)
            .context("buffer pool exhausted")
    }

    fn new_page(&self) -> Result<(PageId, Arc<Page>)> {
        self.bpm.new_page().context("buffer pool exhausted")
    }

    fn release_read(&self, slot: &mut Option<(Arc<Page>, PageReadGuard)>) {
        if let Some((page, guard)) = slot.take() {
            let page_id = page.page_id();
            drop(guard);
            self.bpm.unpin_page(page_id, false);
        }
    }

    /// Read crabbing: latch the child, then release the parent (or the
    /// root latch on the first step). `None` key descends leftmost.
    /// Returns the read-latched, pinned leaf; `None` on an empty tree.
    fn find_leaf_read(&self, key: Option<&K>) -> Result<Option<(Arc<Page>, PageReadGuard)>> {
        let root_guard = self.root_page_id.read_arc();
        let mut current = *root_guard;
        if current == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut root_guard = Some(root_guard);
        let mut parent: Option<(Arc<Page>, PageReadGuard)> = None;

        loop {
            let page = self.fetch(current)?;
            let guard = page.read();
            if let Some(root) = root_guard.take() {
                drop(root);
            }
            self.release_read(&mut parent);

            let node: Node<K> = NodeCodec::decode(&guard[..])?;
            if node.is_leaf() {
                return Ok(Some((page, guard)));
            }
            current = match key {
                Some(key) => node.child_for(key),
                None => node.internal_children()[0],
            };
            parent = Some((page, guard));
        }
    }

    fn is_safe(&self, node: &Node<K>, op: Operation) -> bool {
        match op {
            Operation::Insert => {
                if node.is_leaf() {
                    node.size() < node.max_size - 1
                } else {
                    node.size() < node.max_size
                }
            }
            Operation::Remove => node.size() > node.min_size(),
        }
    }

    /// Write descent. Optimistic pass first: read latches down the
    /// spine, a write latch only on the leaf; if the leaf is unsafe for
    /// `op`, everything is released and the pessimistic pass re-descends
    /// holding write latches, releasing ancestors at every safe node.
    /// On return the leaf (and any retained ancestors, root latch
    /// included) sit in `ctx`. `None` means the tree is empty (remove).
    fn find_leaf_write(
        &self,
        key: &K,
        op: Operation,
        ctx: &mut Context,
    ) -> Result<Option<PageId>> {
        // Optimistic pass.
        let mut root_guard = self.root_page_id.write_arc();
        if *root_guard == INVALID_PAGE_ID {
            if op == Operation::Insert {
                self.start_new_tree(&mut root_guard)?;
            } else {
                return Ok(None);
            }
        }
        let mut current = *root_guard;
        let mut root_guard = Some(root_guard);
        let mut parent: Option<(Arc<Page>, PageReadGuard)> = None;

        loop {
            let page = self.fetch(current)?;
            let upgradable = page.upgradable();
            let node: Node<K> = NodeCodec::decode(&upgradable[..])?;

            if node.is_leaf() {
                let guard = ArcRwLockUpgradableReadGuard::upgrade(upgradable);
                self.release_read(&mut parent);
                if self.is_safe(&node, op) {
                    if let Some(root) = root_guard.take() {
                        ctx.push_root(root);
                    }
                    ctx.push_page(page, guard);
                    return Ok(Some(current));
                }
                // Unsafe leaf: give everything up and go pessimistic.
                drop(guard);
                self.bpm.unpin_page(current, false);
                root_guard = None;
                break;
            }

            let guard = ArcRwLockUpgradableReadGuard::downgrade(upgradable);
            if let Some(root) = root_guard.take() {
                drop(root);
            }
            self.release_read(&mut parent);
            current = node.child_for(key);
            parent = Some((page, guard));
        }
        drop(root_guard);

        // Pessimistic pass: the root latch is re-acquired, and the leaf
        // checked above will be latched a second time.
        let mut root_guard = self.root_page_id.write_arc();
        if *root_guard == INVALID_PAGE_ID {
            // The tree emptied while no latch was held.
            if op == Operation::Insert {
                self.start_new_tree(&mut root_guard)?;
            } else {
                return Ok(None);
            }
        }
        let mut current = *root_guard;
        ctx.push_root(root_guard);

        loop {
            let page = self.fetch(current)?;
            let guard = page.write();
            let node: Node<K> = NodeCodec::decode(&guard[..])?;

            if self.is_safe(&node, op) {
                ctx.release_all(false);
            }
            let next = (!node.is_leaf()).then(|| node.child_for(key));
            ctx.push_page(page, guard);
            match next {
                Some(child) => current = child,
                None => return Ok(Some(current)),
            }
        }
    }

    /// Create the empty root leaf while the root latch is held
    /// exclusively.
    fn start_new_tree(&self, root_guard: &mut RootWriteGuard) -> Result<()> {
        let (page_id, page) = self.new_page()?;
        {
            let mut guard = page.write();
            let root: Node<K> = Node::new_leaf(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            NodeCodec::encode(&root, &mut guard[..]);
        }
        self.bpm.unpin_page(page_id, true);
        **root_guard = page_id;
        self.persist_root_id(page_id)?;
        trace!("index {}: new root leaf {}", self.index_name, page_id);
        Ok(())
    }

    // ---- structure changes ----------------------------------------------

    fn write_node(&self, ctx: &mut Context, node: &Node<K>) {
        NodeCodec::encode(node, &mut ctx.page_guard_mut(node.page_id)[..]);
    }

    /// Rewrite a node's parent pointer under its write latch, going
    /// through the held set when the child is on the descent path.
    fn set_parent(&self, ctx: &mut Context, child: PageId, parent: PageId) -> Result<()> {
        if ctx.holds_page(child) {
            let guard = ctx.page_guard_mut(child);
            let mut node: Node<K> = NodeCodec::decode(&guard[..])?;
            node.parent_page_id = parent;
            NodeCodec::encode(&node, &mut guard[..]);
            return Ok(());
        }
        let page = self.fetch(child)?;
        {
            let mut guard = page.write();
            let mut node: Node<K> = NodeCodec::decode(&guard[..])?;
            node.parent_page_id = parent;
            NodeCodec::encode(&node, &mut guard[..]);
        }
        self.bpm.unpin_page(child, true);
        Ok(())
    }

    /// Split a full leaf: the upper half moves to a fresh right sibling,
    /// the first right key is promoted to the parent.
    fn split_leaf(&self, ctx: &mut Context, mut leaf: Node<K>) -> Result<()> {
        let (right_page_id, right_page) = self.new_page()?;

        let split_at = self.leaf_max_size / 2;
        let right_entries = leaf.leaf_entries_mut().split_off(split_at);
        let separator = right_entries[0].0.clone();

        let mut right: Node<K> =
            Node::new_leaf(right_page_id, leaf.parent_page_id, self.leaf_max_size);
        *right.leaf_entries_mut() = right_entries;
        right.set_leaf_next(leaf.leaf_next());
        leaf.set_leaf_next(right_page_id);

        {
            let mut right_guard = right_page.write();
            NodeCodec::encode(&right, &mut right_guard[..]);
        }
        self.bpm.unpin_page(right_page_id, true);
        self.write_node(ctx, &leaf);

        trace!(
            "index {}: leaf {} split into {} (sep {:?})",
            self.index_name,
            leaf.page_id,
            right_page_id,
            separator
        );
        self.insert_in_parent(ctx, leaf.page_id, leaf.parent_page_id, separator, right_page_id)
    }

    /// Link `right` next to `left` under their parent, growing a new
    /// root or splitting the parent as needed. The parent of a splitting
    /// node is always still write-latched in the held set.
    fn insert_in_parent(
        &self,
        ctx: &mut Context,
        left: PageId,
        left_parent: PageId,
        separator: K,
        right: PageId,
    ) -> Result<()> {
        if left_parent == INVALID_PAGE_ID {
            // The root split: grow the tree by one level.
            let (root_page_id, root_page) = self.new_page()?;
            let root: Node<K> = Node::new_internal(
                root_page_id,
                INVALID_PAGE_ID,
                self.internal_max_size,
                vec![separator],
                vec![left, right],
            );
            {
                let mut guard = root_page.write();
                NodeCodec::encode(&root, &mut guard[..]);
            }
            self.bpm.unpin_page(root_page_id, true);

            self.set_parent(ctx, left, root_page_id)?;
            self.set_parent(ctx, right, root_page_id)?;
            ctx.set_root_id(root_page_id);
            self.persist_root_id(root_page_id)?;
            trace!("index {}: new root {} at higher level", self.index_name, root_page_id);
            return Ok(());
        }

        let mut node: Node<K> = NodeCodec::decode(&ctx.page_guard(left_parent)[..])?;
        node.internal_insert(separator, right);
        if node.size() <= self.internal_max_size {
            self.write_node(ctx, &node);
            return Ok(());
        }

        // Parent overflowed: partition its max_size + 1 children.
        let split_at = (self.internal_max_size + 1) / 2;
        let right_children = node.internal_children_mut().split_off(split_at);
        let mut right_keys = node.internal_keys_mut().split_off(split_at - 1);
        let promoted = right_keys.remove(0);

        let (new_page_id, new_page) = self.new_page()?;
        let new_node: Node<K> = Node::new_internal(
            new_page_id,
            node.parent_page_id,
            self.internal_max_size,
            right_keys,
            right_children,
        );
        {
            let mut guard = new_page.write();
            NodeCodec::encode(&new_node, &mut guard[..]);
        }
        for child in new_node.internal_children() {
            self.set_parent(ctx, *child, new_page_id)?;
        }
        self.bpm.unpin_page(new_page_id, true);
        self.write_node(ctx, &node);

        trace!(
            "index {}: internal {} split into {}",
            self.index_name,
            node.page_id,
            new_page_id
        );
        self.insert_in_parent(ctx, node.page_id, node.parent_page_id, promoted, new_page_id)
    }

    /// Restore occupancy after a removal left `page_id` below its
    /// minimum: borrow from a sibling when one can spare an entry,
    /// otherwise merge (preferring the left sibling) and recurse into
    /// the parent. Pages emptied by merges land in the deferred set.
    fn handle_underflow(&self, ctx: &mut Context, page_id: PageId) -> Result<()> {
        let mut node: Node<K> = NodeCodec::decode(&ctx.page_guard(page_id)[..])?;

        if node.is_root() {
            if node.is_leaf() || node.size() > 1 {
                return Ok(());
            }
            // Internal root with a single child: drop one level.
            let new_root = node.internal_children()[0];
            ctx.deleted.push(page_id);
            self.set_parent(ctx, new_root, INVALID_PAGE_ID)?;
            ctx.set_root_id(new_root);
            self.persist_root_id(new_root)?;
            trace!("index {}: root collapsed into {}", self.index_name, new_root);
            return Ok(());
        }

        let parent_page_id = node.parent_page_id;
        let mut parent: Node<K> = NodeCodec::decode(&ctx.page_guard(parent_page_id)[..])?;
        let index = parent
            .child_index(page_id)
            .expect("underflowing node missing from its parent");

        let left_page_id = (index > 0).then(|| parent.internal_children()[index - 1]);
        let right_page_id =
            (index + 1 < parent.size()).then(|| parent.internal_children()[index + 1]);

        // Sibling latches: left before right, parent already held.
        let mut left_sibling = match left_page_id {
            Some(id) => {
                let page = self.fetch(id)?;
                let guard = page.write();
                let sibling: Node<K> = NodeCodec::decode(&guard[..])?;
                Some((page, guard, sibling))
            }
            None => None,
        };
        let mut right_sibling = match right_page_id {
            Some(id) => {
                let page = self.fetch(id)?;
                let guard = page.write();
                let sibling: Node<K> = NodeCodec::decode(&guard[..])?;
                Some((page, guard, sibling))
            }
            None => None,
        };

        let left_can_spare = left_sibling
            .as_ref()
            .map_or(false, |(_, _, s)| s.size() > s.min_size());
        let right_can_spare = right_sibling
            .as_ref()
            .map_or(false, |(_, _, s)| s.size() > s.min_size());

        if left_can_spare {
            // Rotate the left sibling's last entry through the parent.
            let (page, mut guard, mut sibling) = left_sibling.take().unwrap();
            if node.is_leaf() {
                let moved = sibling.leaf_entries_mut().pop().unwrap();
                parent.internal_keys_mut()[index - 1] = moved.0.clone();
                node.leaf_entries_mut().insert(0, moved);
            } else {
                let moved_child = sibling.internal_children_mut().pop().unwrap();
                let old_separator = parent.internal_keys()[index - 1].clone();
                parent.internal_keys_mut()[index - 1] = sibling.internal_keys_mut().pop().unwrap();
                node.internal_keys_mut().insert(0, old_separator);
                node.internal_children_mut().insert(0, moved_child);
                self.set_parent(ctx, moved_child, page_id)?;
            }
            NodeCodec::encode(&sibling, &mut guard[..]);
            self.write_node(ctx, &node);
            self.write_node(ctx, &parent);
            drop(guard);
            self.bpm.unpin_page(page.page_id(), true);
            self.release_sibling(right_sibling, false);
            return Ok(());
        }

        if right_can_spare {
            // Rotate the right sibling's first entry through the parent.
            let (page, mut guard, mut sibling) = right_sibling.take().unwrap();
            if node.is_leaf() {
                let moved = sibling.leaf_entries_mut().remove(0);
                node.leaf_entries_mut().push(moved);
                parent.internal_keys_mut()[index] = sibling.leaf_entries()[0].0.clone();
            } else {
                let moved_child = sibling.internal_children_mut().remove(0);
                let old_separator = parent.internal_keys()[index].clone();
                parent.internal_keys_mut()[index] = sibling.internal_keys_mut().remove(0);
                node.internal_keys_mut().push(old_separator);
                node.internal_children_mut().push(moved_child);
                self.set_parent(ctx, moved_child, page_id)?;
            }
            NodeCodec::encode(&sibling, &mut guard[..]);
            self.write_node(ctx, &node);
            self.write_node(ctx, &parent);
            drop(guard);
            self.bpm.unpin_page(page.page_id(), true);
            self.release_sibling(left_sibling, false);
            return Ok(());
        }

        // No sibling can spare an entry: merge, preferring the left.
        if let Some((page, mut guard, mut left)) = left_sibling.take() {
            self.merge_into_left(ctx, &mut left, &mut node, &mut parent, index - 1)?;
            NodeCodec::encode(&left, &mut guard[..]);
            self.write_node(ctx, &parent);
            drop(guard);
            self.bpm.unpin_page(page.page_id(), true);
            self.release_sibling(right_sibling, false);
        } else {
            let (page, guard, mut right) = right_sibling
                .take()
                .expect("non-root node with no siblings");
            self.merge_into_left(ctx, &mut node, &mut right, &mut parent, index)?;
            self.write_node(ctx, &node);
            self.write_node(ctx, &parent);
            drop(guard);
            self.bpm.unpin_page(page.page_id(), true);
        }

        if parent.size() < parent.min_size() {
            self.handle_underflow(ctx, parent_page_id)?;
        }
        Ok(())
    }

    /// Fold `right` into `left` and drop the separator at
    /// `separator_index` from the parent. `right` is queued for deferred
    /// deletion; its contents (for internal merges, re-parented) now
    /// live in `left`.
    fn merge_into_left(
        &self,
        ctx: &mut Context,
        left: &mut Node<K>,
        right: &mut Node<K>,
        parent: &mut Node<K>,
        separator_index: usize,
    ) -> Result<()> {
        if left.is_leaf() {
            let moved = std::mem::take(right.leaf_entries_mut());
            left.leaf_entries_mut().extend(moved);
            left.set_leaf_next(right.leaf_next());
        } else {
            let separator = parent.internal_keys()[separator_index].clone();
            left.internal_keys_mut().push(separator);
            let moved_keys = std::mem::take(right.internal_keys_mut());
            left.internal_keys_mut().extend(moved_keys);
            let moved_children = std::mem::take(right.internal_children_mut());
            for child in &moved_children {
                self.set_parent(ctx, *child, left.page_id)?;
            }
            left.internal_children_mut().extend(moved_children);
        }

        parent.internal_keys_mut().remove(separator_index);
        parent.internal_children_mut().remove(separator_index + 1);
        ctx.deleted.push(right.page_id);
        trace!(
            "index {}: merged {} into {}",
            self.index_name,
            right.page_id,
            left.page_id
        );
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn release_sibling(&self, sibling: Option<(Arc<Page>, PageWriteGuard, Node<K>)>, dirty: bool) {
        if let Some((page, guard, _)) = sibling {
            let page_id = page.page_id();
            drop(guard);
            self.bpm.unpin_page(page_id, dirty);
        }
    }

    // ---- root persistence and debugging ---------------------------------

    /// Rewrite this index's header record. Callers hold the root latch.
    fn persist_root_id(&self, root: PageId) -> Result<()> {
        let header = self
            .bpm
            .fetch_page(HEADER_PAGE_ID)
            .context("buffer pool exhausted")?;
        {
            let mut guard = header.write();
            let updated = HeaderPage::update_record(&mut guard, &self.index_name, root);
            assert!(updated, "index {} missing from header page", self.index_name);
        }
        self.bpm.unpin_page(HEADER_PAGE_ID, true);
        Ok(())
    }

    fn dump_node(&self, page_id: PageId, depth: usize, out: &mut String) -> Result<()> {
        let page = self.fetch(page_id)?;
        let guard = page.read();
        let node: Node<K> = NodeCodec::decode(&guard[..])?;
        drop(guard);
        self.bpm.unpin_page(page_id, false);

        let indent = "  ".repeat(depth);
        if node.is_leaf() {
            let keys: Vec<&K> = node.leaf_entries().iter().map(|(k, _)| k).collect();
            writeln!(
                out,
                "{}leaf {} parent {} next {} keys {:?}",
                indent,
                node.page_id,
                node.parent_page_id,
                node.leaf_next(),
                keys
            )
            .unwrap();
        } else {
            writeln!(
                out,
                "{}internal {} parent {} keys {:?}",
                indent, node.page_id, node.parent_page_id, node.internal_keys()
            )
            .unwrap();
            for child in node.internal_children() {
                self.dump_node(*child, depth + 1, out)?;
            }
        }
        Ok(())
    }
}
