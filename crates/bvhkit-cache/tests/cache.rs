use std::sync::atomic::{AtomicUsize, Ordering};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use bvhkit_cache::{CacheError, CacheSettings, CacheStats, SubtreeCache};

fn cache(slot_count: usize, capacity_blocks: usize, growth_factor: usize) -> SubtreeCache<u64> {
    SubtreeCache::new(CacheSettings {
        slot_count,
        capacity_blocks,
        growth_factor,
    })
    .unwrap()
}

#[test]
fn test_concurrent_misses_build_once() {
    const THREADS: usize = 50;
    let cache = cache(256, 1024, 16);
    let builds = AtomicUsize::new(0);
    let reads = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                let payload = cache
                    .get_or_build(
                        0xdead_beef,
                        5,
                        8,
                        || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            (0..8).collect()
                        },
                        |blocks| {
                            reads.fetch_add(1, Ordering::SeqCst);
                            blocks.to_vec()
                        },
                    )
                    .unwrap();
                assert_eq!(payload, (0..8).collect::<Vec<u64>>());
            });
        }
    });

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(reads.load(Ordering::SeqCst), THREADS);
    let snap = cache.stats().snapshot();
    assert_eq!(snap.builds, 1);
    assert_eq!(snap.hits + snap.misses, snap.accesses);
    assert!(snap.hits >= (THREADS - 1) as u64);
    assert_eq!(cache.used_blocks(), 8);
}

#[test]
fn test_growth_invalidates_everything() {
    let cache = cache(64, 64, 16);
    for key in 0..4 {
        cache.insert(key, 0, &[key; 4]).unwrap();
    }
    assert_eq!(cache.used_blocks(), 16);

    let big = vec![9u64; 100];
    let entry = cache.insert(1000, 0, &big).unwrap();
    assert_eq!(entry.block_offset, 0);
    assert!(cache.capacity_blocks() >= 16 * 100);
    for key in 0..4 {
        assert!(cache.lookup(key, 0).is_none());
    }
    assert_eq!(cache.get(1000, 0, |b| b.len()), Some(100));

    let snap = cache.stats().snapshot();
    assert_eq!(snap.resizes, 1);
    assert_eq!(snap.clears, 1);
}

#[test]
fn test_full_arena_clears_without_growing() {
    let cache = cache(16, 64, 2);
    // Strictly increasing sizes, so no slot can reuse its old region.
    for key in 0..10u64 {
        let needed = key as usize + 1;
        cache.insert(key, 0, &vec![key; needed]).unwrap();
    }
    assert_eq!(cache.used_blocks(), 55);
    assert_eq!(cache.stats().snapshot().clears, 0);

    cache.insert(10, 0, &[10; 11]).unwrap();
    assert_eq!(cache.capacity_blocks(), 64);
    assert_eq!(cache.used_blocks(), 11);
    for key in 0..10 {
        assert!(cache.lookup(key, 0).is_none());
    }
    let snap = cache.stats().snapshot();
    assert_eq!(snap.clears, 1);
    assert_eq!(snap.resizes, 0);
}

#[test]
fn test_colliding_key_reuses_region() {
    // One slot: every key collides.
    let cache = cache(1, 64, 16);
    let first = cache.insert(1, 0, &[1; 4]).unwrap();
    let second = cache.insert(2, 0, &[2; 2]).unwrap();
    assert_eq!(second.block_offset, first.block_offset);
    assert_eq!(cache.used_blocks(), 4);
    assert!(cache.lookup(1, 0).is_none());
    assert_eq!(cache.get(2, 0, |b| b.to_vec()), Some(vec![2, 2]));

    // Needs more than the slot reserved: bump-allocated past it.
    let third = cache.insert(3, 0, &[3; 6]).unwrap();
    assert_eq!(third.block_offset, 4);
    assert_eq!(cache.used_blocks(), 10);
    assert_eq!(cache.stats().snapshot().evictions, 2);
}

#[test]
fn test_new_generation_replaces_entry() {
    let cache = cache(32, 64, 16);
    cache.insert(5, 1, &[1, 1]).unwrap();
    let value = cache
        .get_or_build(5, 2, 2, || vec![2, 2], |b| b[0])
        .unwrap();
    assert_eq!(value, 2);
    assert!(cache.lookup(5, 1).is_none());
    assert_eq!(cache.get(5, 2, |b| b.to_vec()), Some(vec![2, 2]));
}

#[test]
fn test_builder_must_match_announced_size() {
    let cache = cache(8, 32, 4);
    let err = cache
        .get_or_build(1, 0, 3, || vec![0; 2], |b| b.len())
        .unwrap_err();
    assert_eq!(
        err,
        CacheError::PayloadSize {
            expected: 3,
            actual: 2
        }
    );
    assert!(cache.lookup(1, 0).is_none());
    // The gate was released, so a later build succeeds.
    assert_eq!(cache.get_or_build(1, 0, 3, || vec![0; 3], |b| b.len()), Ok(3));
}

#[test]
fn test_shared_statistics() {
    let stats = Arc::new(CacheStats::new());
    let settings = CacheSettings {
        slot_count: 8,
        capacity_blocks: 32,
        growth_factor: 4,
    };
    let a: SubtreeCache<u64> = SubtreeCache::with_stats(settings.clone(), stats.clone()).unwrap();
    let b: SubtreeCache<u64> = SubtreeCache::with_stats(settings, stats.clone()).unwrap();
    a.insert(1, 0, &[1]).unwrap();
    assert!(a.lookup(1, 0).is_some());
    assert!(b.lookup(1, 0).is_none());
    let snap = stats.snapshot();
    assert_eq!(snap.accesses, 2);
    assert_eq!(snap.hits, 1);
    stats.reset();
    assert_eq!(stats.snapshot().accesses, 0);
}

#[test]
fn test_invalid_settings_rejected() {
    let settings = CacheSettings {
        slot_count: 0,
        ..Default::default()
    };
    assert!(matches!(
        SubtreeCache::<u64>::new(settings),
        Err(CacheError::InvalidSettings(_))
    ));
}

#[test]
fn test_oversized_request_leaves_entries_intact() {
    let cache = cache(64, 64, 16);
    cache.insert(1, 0, &[1; 4]).unwrap();

    let err = cache
        .insert_with(2, 0, usize::MAX - 1, |_| panic!("nothing to fill"))
        .unwrap_err();
    assert_eq!(
        err,
        CacheError::CapacityOverflow {
            requested: usize::MAX - 1
        }
    );
    assert_eq!(cache.used_blocks(), 4);
    assert_eq!(cache.capacity_blocks(), 64);

    cache.insert(3, 0, &[3; 4]).unwrap();
    assert_eq!(cache.get(1, 0, |b| b.to_vec()), Some(vec![1; 4]));
    assert_eq!(cache.get(3, 0, |b| b.to_vec()), Some(vec![3; 4]));
    let snap = cache.stats().snapshot();
    assert_eq!(snap.clears, 0);
    assert_eq!(snap.resizes, 0);
}

#[test]
fn test_unallocatable_growth_is_an_error() {
    // Growth factor 1: the multiplication succeeds but the arena cannot exist.
    let cache = cache(8, 16, 1);
    cache.insert(1, 0, &[1; 4]).unwrap();
    assert!(matches!(
        cache.insert_with(2, 0, usize::MAX / 2, |_| {}),
        Err(CacheError::CapacityOverflow { .. })
    ));
    assert_eq!(cache.get(1, 0, |b| b.to_vec()), Some(vec![1; 4]));
}

#[test]
fn test_panicking_fill_leaves_no_stale_entry() {
    let cache = cache(1, 64, 16);
    cache.insert(1, 0, &[1; 4]).unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| {
        cache
            .insert_with(2, 0, 2, |dst| {
                dst[0] = 99;
                panic!("fill failed");
            })
            .ok();
    }));
    assert!(result.is_err());
    assert!(cache.lookup(1, 0).is_none());
    assert!(cache.lookup(2, 0).is_none());

    // The slot keeps its region and the next entry reuses it.
    let entry = cache.insert(3, 0, &[3; 3]).unwrap();
    assert_eq!(entry.block_offset, 0);
    assert_eq!(cache.used_blocks(), 4);
    assert_eq!(cache.get(3, 0, |b| b.to_vec()), Some(vec![3; 3]));
}

fn payload_value(key: u64, generation: u32) -> u64 {
    key ^ (u64::from(generation) << 32)
}

#[test]
fn test_concurrent_mixed_traffic_reads_own_payload() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 3000;
    // Small arena and few slots: collisions, in-place reuse and clear-all
    // happen constantly.
    let cache = cache(16, 48, 2);
    let barrier = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for thread in 0..THREADS {
            let cache = &cache;
            let barrier = &barrier;
            s.spawn(move || {
                let mut state = 0x9e37_79b9_7f4a_7c15u64 ^ thread as u64;
                let mut next = move || {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    state
                };
                barrier.wait();
                for _ in 0..ROUNDS {
                    let r = next();
                    let key = r % 64;
                    let generation = ((r >> 8) % 3) as u32;
                    let needed = 1 + (key % 5) as usize;
                    let expected = payload_value(key, generation);
                    let matches = |blocks: &[u64]| {
                        blocks.len() == needed && blocks.iter().all(|&b| b == expected)
                    };
                    match (r >> 16) % 20 {
                        0 => cache.clear(),
                        1..=5 => {
                            if let Some(ok) = cache.get(key, generation, matches) {
                                assert!(ok, "key {key} gen {generation} read foreign blocks");
                            }
                        }
                        _ => {
                            let ok = cache
                                .get_or_build(
                                    key,
                                    generation,
                                    needed,
                                    || vec![expected; needed],
                                    matches,
                                )
                                .unwrap();
                            assert!(ok, "key {key} gen {generation} read foreign blocks");
                        }
                    }
                }
            });
        }
    });

    let snap = cache.stats().snapshot();
    assert_eq!(snap.hits + snap.misses, snap.accesses);
    assert!(snap.builds > 0);
    assert!(snap.clears > 0);
    assert!(snap.evictions > 0);
    assert_eq!(snap.resizes, 0);
    assert!(cache.used_blocks() <= cache.capacity_blocks());
}
