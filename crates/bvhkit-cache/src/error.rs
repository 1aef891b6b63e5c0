//! Error types for the subtree cache.

use thiserror::Error;

/// Errors that can occur while inserting into the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Cache settings are out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// An entry must occupy at least one block.
    #[error("cache entries need at least one block")]
    ZeroBlocks,

    /// Growing the arena for this request would overflow.
    #[error("cannot grow the cache arena for a {requested}-block entry")]
    CapacityOverflow {
        /// Blocks requested by the entry.
        requested: usize,
    },

    /// A builder produced a different number of blocks than it announced.
    #[error("builder produced {actual} blocks, expected {expected}")]
    PayloadSize {
        /// Announced block count.
        expected: usize,
        /// Produced block count.
        actual: usize,
    },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
