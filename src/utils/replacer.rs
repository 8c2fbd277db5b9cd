use std::collections::HashMap;

use hashlink::LinkedHashMap;
use log::trace;
use parking_lot::Mutex;

use crate::buffer::buffer_pool_manager::FrameId;

pub trait Replacer {
    fn record_access(&self, frame_id: FrameId);
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);
    fn evict(&self) -> Option<FrameId>;
    fn remove(&self, frame_id: FrameId);
    fn size(&self) -> usize;
}

struct FrameEntry {
    access_count: usize,
    is_evictable: bool,
}

/// LRU-K bookkeeping. A frame's k-th backward distance is +inf until it
/// has k recorded accesses; eviction picks the largest distance, breaking
/// ties by earliest first access.
///
/// Instead of timestamps, two access-ordered lists (newest at the back):
/// `young` holds frames below k accesses in first-access order, `old`
/// holds the rest ordered by their k-th most recent access. Scanning
/// `young` then `old` from the front yields exactly the LRU-K victim
/// order, so `evict` is a scan for the first evictable entry.
struct LruKState {
    entries: HashMap<FrameId, FrameEntry>,
    young: LinkedHashMap<FrameId, ()>,
    old: LinkedHashMap<FrameId, ()>,
    evictable_count: usize,
}

pub struct LRUKReplacer {
    state: Mutex<LruKState>,
    num_frames: usize,
    k: usize,
}

impl LRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "replacer k must be at least 1");
        LRUKReplacer {
            state: Mutex::new(LruKState {
                entries: HashMap::with_capacity(num_frames),
                young: LinkedHashMap::new(),
                old: LinkedHashMap::new(),
                evictable_count: 0,
            }),
            num_frames,
            k,
        }
    }

    fn check_frame_id(&self, frame_id: FrameId) {
        assert!(
            (frame_id as usize) < self.num_frames,
            "frame id {} out of range for replacer of {} frames",
            frame_id,
            self.num_frames
        );
    }
}

impl Replacer for LRUKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id);
        let mut state = self.state.lock();

        let entry = state.entries.entry(frame_id).or_insert(FrameEntry {
            access_count: 0,
            is_evictable: false,
        });
        entry.access_count += 1;
        let count = entry.access_count;

        if count == 1 {
            // First track: tail of young, keeps first-access order.
            state.young.insert(frame_id, ());
        } else if count == self.k {
            state.young.remove(&frame_id);
            state.old.insert(frame_id, ());
        } else if count > self.k {
            // k-th most recent access changed: re-queue at the tail.
            state.old.remove(&frame_id);
            state.old.insert(frame_id, ());
        }
        // Below k, later accesses do not move the entry.
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        self.check_frame_id(frame_id);
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(&frame_id) else {
            return;
        };
        if entry.is_evictable == evictable {
            return;
        }
        entry.is_evictable = evictable;
        if evictable {
            state.evictable_count += 1;
        } else {
            state.evictable_count -= 1;
        }
    }

    fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        let victim = state
            .young
            .iter()
            .map(|(frame_id, _)| *frame_id)
            .find(|frame_id| state.entries[frame_id].is_evictable)
            .or_else(|| {
                state
                    .old
                    .iter()
                    .map(|(frame_id, _)| *frame_id)
                    .find(|frame_id| state.entries[frame_id].is_evictable)
            })?;

        state.young.remove(&victim);
        state.old.remove(&victim);
        state.entries.remove(&victim);
        state.evictable_count -= 1;
        trace!("lru-k victim: frame {}", victim);
        Some(victim)
    }

    fn remove(&self, frame_id: FrameId) {
        self.check_frame_id(frame_id);
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get(&frame_id) else {
            return;
        };
        assert!(
            entry.is_evictable,
            "remove of non-evictable frame {}",
            frame_id
        );
        state.young.remove(&frame_id);
        state.old.remove(&frame_id);
        state.entries.remove(&frame_id);
        state.evictable_count -= 1;
    }

    fn size(&self) -> usize {
        self.state.lock().evictable_count
    }
}
