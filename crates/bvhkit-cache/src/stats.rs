//! Hit/miss accounting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use serde::Serialize;

/// Shared, lock-free cache counters.
///
/// Counters are updated with relaxed atomics from any thread. Several caches
/// may share one instance through an `Arc` to aggregate their statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    accesses: CachePadded<AtomicU64>,
    hits: CachePadded<AtomicU64>,
    misses: CachePadded<AtomicU64>,
    evictions: AtomicU64,
    clears: AtomicU64,
    resizes: AtomicU64,
    builds: AtomicU64,
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups performed.
    pub accesses: u64,
    /// Lookups whose key and generation matched.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Live entries replaced by an insert into the same slot.
    pub evictions: u64,
    /// Times the whole arena was invalidated.
    pub clears: u64,
    /// Times the arena was reallocated.
    pub resizes: u64,
    /// Payloads produced through the lazy build protocol.
    pub builds: u64,
}

impl CacheStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lookup(&self, hit: bool) {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_build(&self) {
        self.builds.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            accesses: self.accesses.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &*self.accesses,
            &*self.hits,
            &*self.misses,
            &self.evictions,
            &self.clears,
            &self.resizes,
            &self.builds,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl CacheStatsSnapshot {
    /// Fraction of accesses that hit, or 0 before the first access.
    pub fn hit_rate(&self) -> f64 {
        if self.accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses as f64
        }
    }
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accesses: {}, hits: {} ({:.1}%), misses: {}, evictions: {}, clears: {}, resizes: {}, builds: {}",
            self.accesses,
            self.hits,
            100.0 * self.hit_rate(),
            self.misses,
            self.evictions,
            self.clears,
            self.resizes,
            self.builds,
        )
    }
}
