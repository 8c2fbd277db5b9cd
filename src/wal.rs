use std::sync::atomic::{AtomicU64, Ordering};

/// Write-ahead log hook. Recovery is out of scope, so this never writes
/// anything: the buffer pool calls `flush` before evicting a dirty page
/// to preserve the write-ahead ordering point, and tests can observe the
/// counter.
pub struct LogManager {
    num_flushes: AtomicU64,
}

impl LogManager {
    pub fn new() -> Self {
        LogManager {
            num_flushes: AtomicU64::new(0),
        }
    }

    pub fn flush(&self) -> u64 {
        self.num_flushes.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn num_flushes(&self) -> u64 {
        self.num_flushes.load(Ordering::Relaxed)
    }
}

impl Default for LogManager {
    fn default() -> Self {
        LogManager::new()
    }
}
