//! Direct-mapped block cache.
//!
//! Entries are identified by a 64-bit key and a generation counter and live in
//! one contiguous arena of blocks. Each key maps to exactly one slot; a slot
//! remembers the region it last reserved so that a later entry of equal or
//! smaller size reuses that region in place. Otherwise space is bump-allocated,
//! and when the arena runs out every slot is invalidated at once (growing the
//! arena first if the request is large relative to it).

use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

use crate::error::{CacheError, Result};
use crate::gate::BuildGate;
use crate::settings::CacheSettings;
use crate::stats::CacheStats;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(key: u64) -> u64 {
    key.to_le_bytes()
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Location of a live entry in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheEntry {
    /// Caller-chosen identity of the cached subtree.
    pub key: u64,
    /// Commit counter the payload was built for.
    pub generation: u32,
    /// First block of the payload.
    pub block_offset: usize,
    /// Number of payload blocks.
    pub block_count: usize,
}

/// A slot owns the region `offset..offset + reserved` until the next
/// clear-all, whether or not it currently holds a live entry.
#[derive(Debug, Clone, Copy, Default)]
struct SlotTag {
    entry: Option<CacheEntry>,
    offset: usize,
    reserved: usize,
}

#[derive(Debug)]
struct CacheState<B> {
    tags: Vec<SlotTag>,
    arena: Vec<B>,
    cursor: usize,
}

impl<B> CacheState<B> {
    fn invalidate_all(&mut self) {
        self.tags.fill(SlotTag::default());
        self.cursor = 0;
    }

    fn payload(&self, entry: &CacheEntry) -> &[B] {
        &self.arena[entry.block_offset..entry.block_offset + entry.block_count]
    }
}

/// A shared cache of variable-size block payloads.
///
/// Readers take a shared lock; inserts, growth and clears take it exclusively,
/// so a payload handed to a reader is never overwritten while it is being read.
/// Concurrent misses on one key are coalesced by [`SubtreeCache::get_or_build`].
pub struct SubtreeCache<B> {
    settings: CacheSettings,
    state: RwLock<CacheState<B>>,
    gates: Box<[CachePadded<BuildGate>]>,
    stats: Arc<CacheStats>,
}

impl<B: Copy + Default> SubtreeCache<B> {
    /// Create a cache with its own statistics.
    pub fn new(settings: CacheSettings) -> Result<Self> {
        Self::with_stats(settings, Arc::new(CacheStats::new()))
    }

    /// Create a cache that reports into `stats`.
    pub fn with_stats(settings: CacheSettings, stats: Arc<CacheStats>) -> Result<Self> {
        settings.validate()?;
        let state = CacheState {
            tags: vec![SlotTag::default(); settings.slot_count],
            arena: vec![B::default(); settings.capacity_blocks],
            cursor: 0,
        };
        let gates = (0..settings.slot_count)
            .map(|_| CachePadded::new(BuildGate::new()))
            .collect();
        Ok(Self {
            settings,
            state: RwLock::new(state),
            gates,
            stats,
        })
    }

    /// Settings the cache was created with. The arena may since have grown.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Number of direct-mapped slots.
    pub fn slot_count(&self) -> usize {
        self.settings.slot_count
    }

    /// Current arena size in blocks.
    pub fn capacity_blocks(&self) -> usize {
        self.state.read().arena.len()
    }

    /// Blocks handed out since the last clear.
    pub fn used_blocks(&self) -> usize {
        self.state.read().cursor
    }

    /// Slot that `key` maps to.
    pub fn slot_of(&self, key: u64) -> usize {
        (fnv1a(key) % self.settings.slot_count as u64) as usize
    }

    fn find(&self, state: &CacheState<B>, key: u64, generation: u32) -> Option<CacheEntry> {
        let found = state.tags[self.slot_of(key)]
            .entry
            .filter(|e| e.key == key && e.generation == generation);
        self.stats.record_lookup(found.is_some());
        found
    }

    /// Find the live entry for `key` at `generation`.
    pub fn lookup(&self, key: u64, generation: u32) -> Option<CacheEntry> {
        let state = self.state.read();
        self.find(&state, key, generation)
    }

    /// Look up `key` and, on a hit, pass its payload to `read` while the
    /// shared lock is held.
    pub fn get<R, F>(&self, key: u64, generation: u32, read: F) -> Option<R>
    where
        F: FnOnce(&[B]) -> R,
    {
        let state = self.state.read();
        let entry = self.find(&state, key, generation)?;
        Some(read(state.payload(&entry)))
    }

    /// Reserve `needed_blocks` for `key`, let `fill` write the payload, then
    /// publish the entry.
    ///
    /// `fill` runs under the exclusive lock and must not call back into the
    /// cache.
    pub fn insert_with<F>(
        &self,
        key: u64,
        generation: u32,
        needed_blocks: usize,
        fill: F,
    ) -> Result<CacheEntry>
    where
        F: FnOnce(&mut [B]),
    {
        if needed_blocks == 0 {
            return Err(CacheError::ZeroBlocks);
        }
        let slot = self.slot_of(key);
        let mut state = self.state.write();
        let tag = state.tags[slot];

        let (block_offset, reserved) = if tag.reserved >= needed_blocks {
            (tag.offset, tag.reserved)
        } else {
            let fits = state
                .cursor
                .checked_add(needed_blocks)
                .is_some_and(|end| end <= state.arena.len());
            if !fits {
                self.make_room(&mut state, needed_blocks)?;
            }
            let offset = state.cursor;
            state.cursor = offset + needed_blocks;
            (offset, needed_blocks)
        };
        if state.tags[slot].entry.is_some() {
            self.stats.record_eviction();
        }

        // Unpublish before writing so a panicking fill leaves no stale hit.
        state.tags[slot] = SlotTag {
            entry: None,
            offset: block_offset,
            reserved,
        };
        fill(&mut state.arena[block_offset..block_offset + needed_blocks]);
        let entry = CacheEntry {
            key,
            generation,
            block_offset,
            block_count: needed_blocks,
        };
        state.tags[slot].entry = Some(entry);
        Ok(entry)
    }

    /// Invalidate everything, first growing the arena if `needed_blocks` is
    /// large relative to it. Leaves `state` untouched on error; afterwards
    /// `needed_blocks` fits at cursor zero.
    fn make_room(&self, state: &mut CacheState<B>, needed_blocks: usize) -> Result<()> {
        let overflow = CacheError::CapacityOverflow {
            requested: needed_blocks,
        };
        let wanted = needed_blocks
            .checked_mul(self.settings.growth_factor)
            .ok_or(overflow.clone())?;
        if wanted > state.arena.len() {
            let mut arena = Vec::new();
            arena.try_reserve_exact(wanted).map_err(|_| overflow)?;
            arena.resize(wanted, B::default());
            log::info!(
                "growing subtree cache from {} to {} blocks",
                state.arena.len(),
                wanted
            );
            state.arena = arena;
            self.stats.record_resize();
        }
        log::debug!("subtree cache full, invalidating all {} slots", state.tags.len());
        state.invalidate_all();
        self.stats.record_clear();
        Ok(())
    }

    /// Copy `blocks` into the cache under `key`.
    pub fn insert(&self, key: u64, generation: u32, blocks: &[B]) -> Result<CacheEntry> {
        self.insert_with(key, generation, blocks.len(), |dst| {
            dst.copy_from_slice(blocks)
        })
    }

    /// Read the payload for `key`, building it first if necessary.
    ///
    /// Of all threads that miss concurrently on the same slot, exactly one
    /// runs `build` into a private buffer and publishes it; the others spin
    /// until the slot's gate drains and then read the published entry. If the
    /// entry was displaced in the meantime the waiter competes to build again.
    /// `build` must return exactly `needed_blocks` blocks. It runs while this
    /// thread holds the slot's gate, so it must not call `get_or_build` for a
    /// key mapping to the same slot: that call would wait on itself forever.
    pub fn get_or_build<R, F, G>(
        &self,
        key: u64,
        generation: u32,
        needed_blocks: usize,
        build: F,
        read: G,
    ) -> Result<R>
    where
        F: FnOnce() -> Vec<B>,
        G: Fn(&[B]) -> R,
    {
        if needed_blocks == 0 {
            return Err(CacheError::ZeroBlocks);
        }
        let gate = &self.gates[self.slot_of(key)];
        let _guard = loop {
            if let Some(r) = self.get(key, generation, &read) {
                return Ok(r);
            }
            match gate.try_claim() {
                Some(guard) => break guard,
                None => gate.wait(),
            }
        };
        // Another builder may have published between our miss and our claim.
        if let Some(r) = self.get(key, generation, &read) {
            return Ok(r);
        }

        let blocks = build();
        if blocks.len() != needed_blocks {
            return Err(CacheError::PayloadSize {
                expected: needed_blocks,
                actual: blocks.len(),
            });
        }
        self.stats.record_build();
        self.insert(key, generation, &blocks)?;
        Ok(read(&blocks))
    }

    /// Invalidate every entry and rewind the arena.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.invalidate_all();
        self.stats.record_clear();
        log::debug!("subtree cache cleared");
    }
}

impl<B> std::fmt::Debug for SubtreeCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SubtreeCache")
            .field("slots", &self.settings.slot_count)
            .field("capacity_blocks", &state.arena.len())
            .field("used_blocks", &state.cursor)
            .finish()
    }
}
