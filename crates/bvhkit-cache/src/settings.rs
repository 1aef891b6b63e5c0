//! Cache sizing.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Sizing of a [`crate::SubtreeCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Number of direct-mapped slots.
    pub slot_count: usize,
    /// Initial arena size in blocks.
    pub capacity_blocks: usize,
    /// When a request does not fit and `growth_factor * needed` exceeds the
    /// arena, the arena is reallocated to that size.
    pub growth_factor: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            slot_count: 4096,
            capacity_blocks: 1 << 14,
            growth_factor: 16,
        }
    }
}

impl CacheSettings {
    /// Check that the settings describe a usable cache.
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(CacheError::InvalidSettings(
                "slot_count must be positive".into(),
            ));
        }
        if self.capacity_blocks == 0 {
            return Err(CacheError::InvalidSettings(
                "capacity_blocks must be positive".into(),
            ));
        }
        if self.growth_factor == 0 {
            return Err(CacheError::InvalidSettings(
                "growth_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
