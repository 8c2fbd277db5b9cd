use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;

use crate::storage::page::page::{PageId, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE};

/// File-backed block device. Page `p` lives at byte offset `p * PAGE_SIZE`
/// in a single database file. Deallocated page ids are recycled through a
/// free-slot list before the monotonic counter is advanced.
pub struct Manager {
    db_io: File,
    db_path: PathBuf,

    next_page_id: PageId,
    // Ids of deallocated pages, handed out again before fresh ids.
    free_slots: VecDeque<PageId>,

    num_reads: u64,
    num_writes: u64,
    num_allocations: u64,
}

impl Manager {
    /// Open (or create) the database file. Page id 0 is reserved for the
    /// header page and is never handed out by `allocate_page`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&db_path)
            .with_context(|| format!("opening database file {}", db_path.display()))?;

        let len = db_io.metadata()?.len();
        let pages_on_disk = (len / PAGE_SIZE as u64) as PageId;
        let next_page_id = pages_on_disk.max(1);

        info!(
            "opened database file {} ({} pages on disk)",
            db_path.display(),
            pages_on_disk
        );

        Ok(Manager {
            db_io,
            db_path,
            next_page_id,
            free_slots: VecDeque::new(),
            num_reads: 0,
            num_writes: 0,
            num_allocations: 0,
        })
    }

    /// Fill `buf` with the page's on-disk content. A page that was
    /// allocated but never written reads back as zeroes.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        assert_ne!(page_id, INVALID_PAGE_ID);

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let file_len = self.db_io.metadata()?.len();
        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        self.db_io.seek(SeekFrom::Start(offset))?;
        self.db_io
            .read_exact(buf)
            .with_context(|| format!("reading page {}", page_id))?;
        self.num_reads += 1;
        Ok(())
    }

    /// Persist one page, extending the file as needed.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        assert_ne!(page_id, INVALID_PAGE_ID);

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.db_io.seek(SeekFrom::Start(offset))?;
        self.db_io
            .write_all(data)
            .with_context(|| format!("writing page {}", page_id))?;
        self.db_io.flush()?;
        self.num_writes += 1;
        Ok(())
    }

    pub fn allocate_page(&mut self) -> PageId {
        self.num_allocations += 1;
        if let Some(page_id) = self.free_slots.pop_front() {
            return page_id;
        }
        let page_id = self.next_page_id;
        assert!(page_id < INVALID_PAGE_ID, "page id space exhausted");
        self.next_page_id += 1;
        page_id
    }

    pub fn deallocate_page(&mut self, page_id: PageId) {
        assert_ne!(page_id, HEADER_PAGE_ID, "header page cannot be deallocated");
        assert_ne!(page_id, INVALID_PAGE_ID);
        self.free_slots.push_back(page_id);
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }

    pub fn num_writes(&self) -> u64 {
        self.num_writes
    }

    pub fn num_allocations(&self) -> u64 {
        self.num_allocations
    }
}
