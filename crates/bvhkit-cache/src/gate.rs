//! Single-builder gate.
//!
//! A counter of threads currently claiming the right to build. The thread that
//! moves it from zero is the builder and holds the claim until its guard is
//! dropped. Every other thread undoes its increment right away and waits for
//! the counter to drain before checking for the published result.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::Backoff;

/// Per-slot construction counter.
#[derive(Debug, Default)]
pub struct BuildGate {
    claims: AtomicU32,
}

/// Held by the builder; releases the claim when dropped, also on unwind.
#[derive(Debug)]
#[must_use = "the claim is released as soon as the guard is dropped"]
pub struct BuildGuard<'a> {
    gate: &'a BuildGate,
}

impl BuildGate {
    /// An idle gate.
    pub const fn new() -> Self {
        Self {
            claims: AtomicU32::new(0),
        }
    }

    /// Try to become the builder.
    ///
    /// Returns `None` if another thread already holds the claim; the caller's
    /// own increment has been undone by then.
    pub fn try_claim(&self) -> Option<BuildGuard<'_>> {
        if self.claims.fetch_add(1, Ordering::AcqRel) == 0 {
            Some(BuildGuard { gate: self })
        } else {
            self.claims.fetch_sub(1, Ordering::AcqRel);
            None
        }
    }

    /// Spin, then yield, until nobody holds the gate.
    pub fn wait(&self) {
        let backoff = Backoff::new();
        while self.claims.load(Ordering::Acquire) != 0 {
            backoff.snooze();
        }
    }

    /// True while some thread holds or is attempting a claim.
    pub fn is_building(&self) -> bool {
        self.claims.load(Ordering::Acquire) != 0
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.gate.claims.fetch_sub(1, Ordering::Release);
    }
}
