use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use parking_lot::{
    lock_api::{ArcRwLockReadGuard, ArcRwLockUpgradableReadGuard, ArcRwLockWriteGuard},
    RawRwLock, RwLock,
};

pub const PAGE_SIZE: usize = 4096;

pub type PageId = u32;
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// Page id 0 is reserved for the header page holding index roots.
pub const HEADER_PAGE_ID: PageId = 0;

/// Owned latch guards so callers can stash them in a held set that
/// outlives the stack frame that acquired them (latch crabbing).
pub type PageReadGuard = ArcRwLockReadGuard<RawRwLock, PageBuf>;
pub type PageWriteGuard = ArcRwLockWriteGuard<RawRwLock, PageBuf>;
pub type PageUpgradableGuard = ArcRwLockUpgradableReadGuard<RawRwLock, PageBuf>;

/// A frame-resident page: a fixed 4 KiB buffer behind a reader/writer
/// latch, plus the bookkeeping the buffer pool needs. The latch protects
/// the bytes only; pin count, dirty flag and the current page id are
/// atomics maintained under the pool's own mutex.
pub struct Page {
    latch: Arc<RwLock<PageBuf>>,
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Page {
    pub fn new() -> Self {
        Page {
            latch: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
            page_id: AtomicU32::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub(crate) fn incr_pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_pin(&self) {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "pin count underflow on page {}", self.page_id());
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Latch the page bytes for reading.
    pub fn read(&self) -> PageReadGuard {
        self.latch.read_arc()
    }

    /// Latch the page bytes for writing.
    pub fn write(&self) -> PageWriteGuard {
        self.latch.write_arc()
    }

    /// Latch upgradably: blocks writers but not readers, and can be
    /// upgraded in place once the caller knows it must mutate.
    pub fn upgradable(&self) -> PageUpgradableGuard {
        self.latch.upgradable_read_arc()
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}
