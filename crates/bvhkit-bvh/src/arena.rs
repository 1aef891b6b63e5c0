//! Thread-shared bump arena for nodes and leaf blocks.
//!
//! Slots are reserved by advancing an atomic cursor and each reserved slot is
//! written exactly once, so concurrent subtree builds never contend on
//! anything but the cursor. Once the build returns, the arena is frozen into a
//! plain `Vec`.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::error::{BuildError, Result};

/// Fixed-capacity, append-only arena of write-once slots.
pub struct BumpArena<T> {
    kind: &'static str,
    slots: Box<[OnceLock<T>]>,
    cursor: AtomicUsize,
}

impl<T> BumpArena<T> {
    /// Create an arena with room for `capacity` values.
    ///
    /// `kind` names the arena in error messages.
    pub fn with_capacity(kind: &'static str, capacity: usize) -> Self {
        Self {
            kind,
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots reserved so far.
    pub fn len(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// True if nothing has been reserved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve `count` consecutive slots.
    pub fn alloc(&self, count: usize) -> Result<Range<usize>> {
        let capacity = self.capacity();
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |start| {
                start.checked_add(count).filter(|&end| end <= capacity)
            })
            .map(|start| start..start + count)
            .map_err(|start| BuildError::ArenaExhausted {
                kind: self.kind,
                requested: start.saturating_add(count),
                capacity,
            })
    }

    /// Write the value of a reserved slot.
    ///
    /// Each slot takes exactly one value; a second write is ignored.
    pub fn publish(&self, index: usize, value: T) {
        let fresh = self.slots[index].set(value).is_ok();
        debug_assert!(fresh, "{} slot {index} published twice", self.kind);
    }

    /// Value of a published slot.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// Drop every value and rewind the cursor.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.take();
        }
        *self.cursor.get_mut() = 0;
    }

    /// Freeze the reserved prefix into a `Vec`.
    ///
    /// Fails if any reserved slot was never published.
    pub fn into_vec(self) -> Result<Vec<T>> {
        let len = self.len();
        let kind = self.kind;
        self.slots
            .into_vec()
            .into_iter()
            .take(len)
            .enumerate()
            .map(|(index, slot)| {
                slot.into_inner()
                    .ok_or(BuildError::UnpublishedSlot { kind, index })
            })
            .collect()
    }
}

impl<T> std::fmt::Debug for BumpArena<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BumpArena")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
