use std::{collections::VecDeque, sync::Arc};

use log::debug;
use parking_lot::Mutex;

use crate::{
    storage::{
        disk::manager::Manager,
        page::page::{Page, PageId, INVALID_PAGE_ID},
    },
    utils::{
        extendible_hash_table::ExtendibleHashTable,
        replacer::{LRUKReplacer, Replacer},
    },
    wal::LogManager,
};

pub type FrameId = u32;

const PAGE_TABLE_BUCKET_SIZE: usize = 4;

struct PoolState {
    // Frames never used, or released by page deletion.
    free_list: VecDeque<FrameId>,
}

/// Fixed-size pool of page frames mediating between clients and the disk
/// manager. Residency is tracked by an extendible-hash page table
/// (page id -> frame id); eviction candidates come from the LRU-K
/// replacer. One pool mutex serializes every operation; the replacer and
/// the page table keep their own internal locks.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<Arc<Page>>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: LRUKReplacer,
    state: Mutex<PoolState>,
    disk: Mutex<Manager>,
    log: LogManager,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Manager, replacer_k: usize) -> Self {
        assert!(pool_size >= 1);
        let frames = (0..pool_size).map(|_| Arc::new(Page::new())).collect();
        let free_list = (0..pool_size as FrameId).collect();

        BufferPoolManager {
            pool_size,
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            replacer: LRUKReplacer::new(pool_size, replacer_k),
            state: Mutex::new(PoolState { free_list }),
            disk: Mutex::new(disk_manager),
            log: LogManager::new(),
        }
    }

    /// Pop a free frame, or evict. The victim is written back if dirty
    /// and its metadata reset. `None` means every frame is pinned.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = self.replacer.evict()?;
        let frame = &self.frames[frame_id as usize];
        let old_page_id = frame.page_id();
        debug_assert_eq!(frame.pin_count(), 0);
        debug!("evicting page {} from frame {}", old_page_id, frame_id);

        if frame.is_dirty() {
            // Write-ahead ordering point before the dirty page goes out.
            self.log.flush();
            let buf = frame.read();
            self.disk
                .lock()
                .write_page(old_page_id, &buf[..])
                .expect("disk write during eviction failed");
            frame.set_dirty(false);
        }
        self.page_table.remove(&old_page_id);

        frame.write().fill(0);
        frame.set_page_id(INVALID_PAGE_ID);
        Some(frame_id)
    }

    fn pin_frame(&self, frame_id: FrameId) {
        let frame = &self.frames[frame_id as usize];
        frame.incr_pin();
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
    }

    /// Allocate a fresh page id and install it pinned in a frame. `None`
    /// when every frame is pinned.
    pub fn new_page(&self) -> Option<(PageId, Arc<Page>)> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = self.disk.lock().allocate_page();
        let frame = &self.frames[frame_id as usize];
        frame.set_page_id(page_id);
        self.page_table.insert(page_id, frame_id);
        self.pin_frame(frame_id);

        debug!("new page {} in frame {}", page_id, frame_id);
        Some((page_id, Arc::clone(frame)))
    }

    /// Return the page pinned, reading it from disk on a miss. `None`
    /// when it is not resident and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>> {
        assert_ne!(page_id, INVALID_PAGE_ID);
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.pin_frame(frame_id);
            return Some(Arc::clone(&self.frames[frame_id as usize]));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id as usize];
        {
            let mut buf = frame.write();
            self.disk
                .lock()
                .read_page(page_id, &mut buf[..])
                .expect("disk read failed");
        }
        frame.set_page_id(page_id);
        self.page_table.insert(page_id, frame_id);
        self.pin_frame(frame_id);
        Some(Arc::clone(frame))
    }

    /// Drop one pin; the dirty flag is OR-ed in. False if the page is not
    /// resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.state.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id as usize];
        if frame.pin_count() == 0 {
            return false;
        }
        frame.decr_pin();
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.pin_count() == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write the page out regardless of the dirty flag, then clear it.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        assert_ne!(page_id, INVALID_PAGE_ID, "flush of the invalid page id");
        let _state = self.state.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id as usize];
        let buf = frame.read();
        self.disk
            .lock()
            .write_page(page_id, &buf[..])
            .expect("disk write failed");
        frame.set_dirty(false);
        true
    }

    /// Flush every resident dirty page.
    pub fn flush_all_pages(&self) {
        let _state = self.state.lock();
        for frame in &self.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID || !frame.is_dirty() {
                continue;
            }
            let buf = frame.read();
            self.disk
                .lock()
                .write_page(page_id, &buf[..])
                .expect("disk write failed");
            frame.set_dirty(false);
        }
    }

    /// Purge a resident page and release its id. A no-op success when the
    /// page is not resident; false when it is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id as usize];
        if frame.pin_count() > 0 {
            return false;
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        frame.write().fill(0);
        frame.set_page_id(INVALID_PAGE_ID);
        frame.set_dirty(false);
        state.free_list.push_back(frame_id);
        self.disk.lock().deallocate_page(page_id);
        debug!("deleted page {} (frame {})", page_id, frame_id);
        true
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_list_len(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages (page-table entries).
    pub fn resident_pages(&self) -> usize {
        self.page_table.len()
    }

    pub fn pin_count_of(&self, page_id: PageId) -> Option<u32> {
        let _state = self.state.lock();
        let frame_id = self.page_table.find(&page_id)?;
        Some(self.frames[frame_id as usize].pin_count())
    }

    pub fn log_manager(&self) -> &LogManager {
        &self.log
    }

    pub fn disk(&self) -> &Mutex<Manager> {
        &self.disk
    }
}
