use dynatlas_core::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn allocation_is_exact_and_left_first() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(16, 16, 8).unwrap();

    // More slack in x: vertical cut, then a horizontal cut down to 4x8.
    let a = alloc.allocate(1, 4, 8).expect("allocate a");
    assert_eq!(a, Rect::new(0, 0, 4, 8));

    // The 4x8 remainder below `a` is too narrow, so the right half is used.
    let b = alloc.allocate(2, 8, 4).expect("allocate b");
    assert_eq!(b, Rect::new(4, 0, 8, 4));

    assert_eq!(alloc.get(&1), Some(a));
    assert_eq!(alloc.get(&2), Some(b));
    assert_eq!(alloc.len(), 2);
    alloc.verify().unwrap();
}

#[test]
fn release_merges_back_to_root() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(4, 4, 4).unwrap();
    let a = alloc.allocate(1, 2, 2).expect("allocate a");
    let b = alloc.allocate(2, 2, 2).expect("allocate b");
    assert_eq!(a, Rect::new(0, 0, 2, 2));
    assert_eq!(b, Rect::new(0, 2, 2, 2));
    assert_eq!(alloc.stats().nodes_in_use, 7);

    assert!(alloc.release(&1));
    alloc.verify().unwrap();
    // `a`'s sibling subtree still holds `b`; nothing merges yet.
    assert_eq!(alloc.stats().nodes_in_use, 7);

    assert!(alloc.release(&2));
    alloc.verify().unwrap();
    assert_eq!(alloc.stats().nodes_in_use, 1);

    let full = alloc.allocate(3, 4, 4).expect("whole atlas after merge");
    assert_eq!(full, Rect::new(0, 0, 4, 4));
}

#[test]
fn allocate_release_allocate_is_congruent() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(128, 64, 16).unwrap();
    let first = alloc.allocate(9, 30, 20).unwrap();
    assert!(alloc.release(&9));
    let second = alloc.allocate(9, 30, 20).unwrap();
    assert_eq!((first.w, first.h), (second.w, second.h));
    assert_eq!(first, second);
}

#[test]
fn release_unknown_key_is_noop() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(32, 32, 4).unwrap();
    alloc.allocate(1, 8, 8).unwrap();
    let before = alloc.debug_string(None);
    assert!(!alloc.release(&2));
    assert_eq!(alloc.debug_string(None), before);
    assert!(alloc.contains(&1));
}

#[test]
fn zero_dimension_is_rejected_without_side_effects() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(32, 32, 4).unwrap();
    alloc.allocate(1, 8, 8).unwrap();
    let before = alloc.debug_string(None);

    assert_eq!(
        alloc.allocate(2, 0, 5),
        Err(AtlasError::InvalidRequest {
            width: 0,
            height: 5
        })
    );
    assert!(matches!(
        alloc.allocate(3, 5, 0),
        Err(AtlasError::InvalidRequest { .. })
    ));

    assert_eq!(alloc.debug_string(None), before);
    assert_eq!(alloc.len(), 1);
    assert!(!alloc.contains(&2));
}

#[test]
fn no_fit_leaves_tree_unchanged() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(16, 16, 8).unwrap();
    alloc.allocate(1, 16, 10).unwrap();
    let before = alloc.debug_string(None);
    let err = alloc.allocate(2, 8, 8).unwrap_err();
    assert_eq!(err, AtlasError::NoFit { width: 8, height: 8 });
    assert!(err.is_recoverable());
    assert_eq!(alloc.debug_string(None), before);
    // Too large for the atlas outright.
    assert!(matches!(
        alloc.allocate(3, 17, 1),
        Err(AtlasError::NoFit { .. })
    ));
}

#[test]
fn duplicate_key_is_rejected() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(16, 16, 8).unwrap();
    let a = alloc.allocate(1, 4, 4).unwrap();
    let before = alloc.debug_string(None);
    assert_eq!(alloc.allocate(1, 2, 2), Err(AtlasError::KeyInUse));
    assert_eq!(alloc.get(&1), Some(a));
    assert_eq!(alloc.debug_string(None), before);
}

#[test]
fn capacity_exhaustion_is_surfaced_and_tree_stays_valid() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(4, 4, 1).unwrap();
    let a = alloc.allocate(1, 2, 4).expect("single split fits");
    assert_eq!(a, Rect::new(0, 0, 2, 4));
    assert_eq!(alloc.stats().nodes_in_use, 3);

    // The right half is free, but only one region may be resident.
    let before = alloc.debug_string(None);
    let err = alloc.allocate(2, 2, 4).unwrap_err();
    assert_eq!(err, AtlasError::CapacityExceeded { capacity: 1 });
    assert!(!err.is_recoverable());

    alloc.verify().unwrap();
    assert_eq!(alloc.debug_string(None), before);
    assert_eq!(alloc.get(&1), Some(a));
    assert!(!alloc.contains(&2));

    assert!(alloc.release(&1));
    assert_eq!(alloc.stats().nodes_in_use, 1);
    alloc.allocate(2, 2, 4).expect("fits after release");
    alloc.verify().unwrap();
}

#[test]
fn capacity_holds_that_many_double_splits() {
    // Shrinking heights leave slack on both axes of every leaf they land in.
    let mut atlas: DynamicAtlas = DynamicAtlas::new(1024, 1024, 8).unwrap();
    for key in 0..8u64 {
        let slot = atlas
            .ensure_slot(key, 32, 16 - key as u32)
            .expect("within capacity");
        assert!(slot.upload_needed);
        assert_eq!(slot.pixel_rect, Rect::new(32 * key as u32, 0, 32, 16 - key as u32));
    }
    assert_eq!(atlas.len(), 8);
    assert_eq!(atlas.stats().nodes_in_use, 1 + 8 * 4);
    atlas.allocator().verify().unwrap();

    assert_eq!(
        atlas.ensure_slot(8, 32, 16),
        Err(AtlasError::CapacityExceeded { capacity: 8 })
    );
    // Hits are still served when full.
    assert!(!atlas.ensure_slot(3, 32, 16).unwrap().upload_needed);
}

#[test]
fn arena_shortfall_is_checked_before_splitting() {
    let cfg = AtlasConfig::builder()
        .with_dimensions(16, 16)
        .capacity(2)
        .node_capacity(9)
        .build();
    let mut alloc: AtlasAllocator = AtlasAllocator::from_config(&cfg).unwrap();
    assert_eq!(alloc.allocate(1, 4, 4).unwrap(), Rect::new(0, 0, 4, 4));
    assert_eq!(alloc.allocate(2, 4, 4).unwrap(), Rect::new(0, 4, 4, 4));
    assert_eq!(alloc.stats().nodes_in_use, 7);

    // The freed 4x4 cannot merge while its sibling subtree holds key 2.
    assert!(alloc.release(&1));
    assert_eq!(alloc.stats().nodes_in_use, 7);

    // 8x8 goes to the right half and needs two splits; only two slots are left.
    let before = alloc.debug_string(None);
    let err = alloc.allocate(3, 8, 8).unwrap_err();
    assert_eq!(err, AtlasError::ArenaExhausted { nodes: 9 });
    assert!(!err.is_recoverable());
    assert_eq!(alloc.debug_string(None), before);
    assert_eq!(alloc.stats().nodes_in_use, 7);
    alloc.verify().unwrap();

    assert!(alloc.release(&2));
    assert_eq!(alloc.stats().nodes_in_use, 1);
    assert_eq!(alloc.allocate(3, 8, 8).unwrap(), Rect::new(0, 0, 8, 8));
}

#[test]
fn freed_nodes_are_recycled() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(8, 8, 1).unwrap();
    for key in 0..100u64 {
        alloc.allocate(key, 4, 8).expect("recycled slots");
        assert!(alloc.release(&key));
        assert_eq!(alloc.stats().nodes_in_use, 1);
    }
    alloc.verify().unwrap();
}

#[test]
fn reset_discards_everything() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(64, 64, 8).unwrap();
    for key in 0..4u64 {
        alloc.allocate(key, 10, 10).unwrap();
    }
    alloc.reset();
    assert!(alloc.is_empty());
    assert_eq!(alloc.get(&0), None);
    assert!(!alloc.release(&1));
    assert_eq!(alloc.stats().nodes_in_use, 1);
    alloc.verify().unwrap();
    assert_eq!(alloc.allocate(0, 64, 64).unwrap(), Rect::new(0, 0, 64, 64));
}

#[test]
fn debug_dump_respects_depth() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(8, 8, 4).unwrap();
    assert_eq!(
        alloc.debug_string(None),
        "{[0], occupied = false, self = 0, 8,8, 0, 0}\n"
    );

    alloc.allocate(1, 4, 8).unwrap();
    let full = alloc.debug_string(None);
    assert_eq!(
        full,
        "{[0], occupied = false, self = 0, 8,8, 0, 0}\n\
         {[1], occupied = true, self = 1, 4,8, 0, 0}\n\
         {[1], occupied = false, self = 2, 4,8, 4, 0}\n"
    );
    assert_eq!(alloc.debug_string(Some(0)).lines().count(), 1);
    assert_eq!(alloc.debug_string(Some(1)), full);
}

#[test]
fn stats_track_area_and_largest_free() {
    let mut alloc: AtlasAllocator = AtlasAllocator::new(16, 16, 8).unwrap();
    alloc.allocate(1, 4, 8).unwrap();
    let stats = alloc.stats();
    assert_eq!(stats.resident, 1);
    assert_eq!(stats.used_area, 32);
    assert_eq!(stats.total_area, 256);
    assert_eq!(stats.free_area(), 224);
    assert_eq!(stats.node_capacity, 8 * 16 + 1);
    assert_eq!(stats.largest_free, Some(Rect::new(4, 0, 12, 16)));
    assert!((stats.occupancy - 0.125).abs() < 1e-9);
}

#[test]
fn random_churn_preserves_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut alloc: AtlasAllocator = AtlasAllocator::new(256, 256, 64).unwrap();
    let mut live: Vec<u64> = Vec::new();
    let mut next_key = 0u64;

    for step in 0..2000 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let (w, h) = (rng.gen_range(1..=48), rng.gen_range(1..=48));
            match alloc.allocate(next_key, w, h) {
                Ok(rect) => {
                    assert_eq!((rect.w, rect.h), (w, h));
                    live.push(next_key);
                }
                Err(AtlasError::NoFit { .. }) => {}
                Err(AtlasError::CapacityExceeded { capacity }) => {
                    assert_eq!(capacity, 64);
                    assert_eq!(live.len(), 64, "capacity hit early at step {step}");
                }
                Err(e) => panic!("step {step}: unexpected error with {} live: {e}", live.len()),
            }
            next_key += 1;
        } else {
            let idx = rng.gen_range(0..live.len());
            let key = live.swap_remove(idx);
            assert!(alloc.release(&key));
        }
        alloc.verify().unwrap();
        assert_eq!(alloc.len(), live.len());
    }

    for key in live.drain(..) {
        assert!(alloc.release(&key));
    }
    assert_eq!(alloc.stats().nodes_in_use, 1);
}
