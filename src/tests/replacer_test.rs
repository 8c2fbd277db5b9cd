use crate::utils::replacer::{LRUKReplacer, Replacer};

#[test]
fn lru_k_eviction_order() {
    let replacer = LRUKReplacer::new(8, 2);

    // Accesses 1,2,3,1,2,3,1,2 at timestamps 1..=8. All three frames
    // reach k = 2; their second-most-recent accesses are at t4 (frame 1),
    // t5 (frame 2) and t3 (frame 3), so the backward distances order the
    // victims 3, 1, 2.
    for frame in [1, 2, 3, 1, 2, 3, 1, 2] {
        replacer.record_access(frame);
    }
    for frame in [1, 2, 3] {
        replacer.set_evictable(frame, true);
    }
    assert_eq!(replacer.size(), 3);

    assert_eq!(replacer.evict(), Some(3));
    assert_eq!(replacer.evict(), Some(1));
    assert_eq!(replacer.evict(), Some(2));
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn infinite_distance_evicted_first() {
    let replacer = LRUKReplacer::new(8, 2);

    // Frames 2,3,4,5 have a single access (+inf distance); frame 1 has
    // two. The +inf frames go first, oldest first access first.
    for frame in [1, 2, 3, 4, 1, 5] {
        replacer.record_access(frame);
    }
    for frame in 1..=5 {
        replacer.set_evictable(frame, true);
    }
    assert_eq!(replacer.size(), 5);

    assert_eq!(replacer.evict(), Some(2));
    assert_eq!(replacer.evict(), Some(3));
    assert_eq!(replacer.evict(), Some(4));
    assert_eq!(replacer.evict(), Some(5));
    assert_eq!(replacer.evict(), Some(1));
}

#[test]
fn non_evictable_frames_are_skipped() {
    let replacer = LRUKReplacer::new(4, 2);
    for frame in [0, 1, 2] {
        replacer.record_access(frame);
    }
    replacer.set_evictable(0, false);
    replacer.set_evictable(1, true);
    replacer.set_evictable(2, true);
    assert_eq!(replacer.size(), 2);

    assert_eq!(replacer.evict(), Some(1));
    assert_eq!(replacer.evict(), Some(2));
    // Only the pinned frame is left.
    assert_eq!(replacer.evict(), None);
    assert_eq!(replacer.size(), 0);

    replacer.set_evictable(0, true);
    assert_eq!(replacer.evict(), Some(0));
}

#[test]
fn toggling_evictability_is_idempotent() {
    let replacer = LRUKReplacer::new(4, 2);
    replacer.record_access(1);
    replacer.set_evictable(1, true);
    replacer.set_evictable(1, true);
    assert_eq!(replacer.size(), 1);
    replacer.set_evictable(1, false);
    replacer.set_evictable(1, false);
    assert_eq!(replacer.size(), 0);
    // Untracked frames are ignored.
    replacer.set_evictable(3, true);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn remove_forgets_history() {
    let replacer = LRUKReplacer::new(4, 2);
    for frame in [1, 1, 2] {
        replacer.record_access(frame);
    }
    replacer.set_evictable(1, true);
    replacer.set_evictable(2, true);

    replacer.remove(1);
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(2));
    assert_eq!(replacer.evict(), None);

    // A removed frame starts from scratch.
    replacer.record_access(1);
    replacer.set_evictable(1, true);
    assert_eq!(replacer.evict(), Some(1));
}

#[test]
#[should_panic(expected = "non-evictable")]
fn remove_of_non_evictable_frame_panics() {
    let replacer = LRUKReplacer::new(4, 2);
    replacer.record_access(1);
    replacer.remove(1);
}

#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_frame_panics() {
    let replacer = LRUKReplacer::new(4, 2);
    replacer.record_access(9);
}
