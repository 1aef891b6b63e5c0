//! Error types for BVH construction.

use bvhkit_parallel::ParallelError;
use thiserror::Error;

/// Errors that can occur while building a hierarchy.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Builder settings are out of range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// An arena ran out of slots.
    #[error("{kind} arena exhausted: requested {requested} slots, capacity {capacity}")]
    ArenaExhausted {
        /// Which arena overflowed.
        kind: &'static str,
        /// Cursor position the allocation would have reached.
        requested: usize,
        /// Fixed capacity of the arena.
        capacity: usize,
    },

    /// A reserved arena slot was never written.
    #[error("{kind} slot {index} was reserved but never published")]
    UnpublishedSlot {
        /// Which arena holds the slot.
        kind: &'static str,
        /// Index of the slot.
        index: usize,
    },

    /// The worker pool failed.
    #[error(transparent)]
    Pool(#[from] ParallelError),
}

/// Structural problems found by [`crate::Bvh::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A stored child box differs from the union of its subtree.
    #[error("child {index} of node {node} does not match the bounds of its subtree")]
    BoundsMismatch {
        /// Parent node index.
        node: u32,
        /// Child slot within the parent.
        index: usize,
    },

    /// The root bounds differ from the union of all primitives.
    #[error("root bounds do not match the hierarchy")]
    RootBounds,

    /// A node reference points outside the node array.
    #[error("node {0} is out of range")]
    DanglingNode(u32),

    /// A node is referenced more than once.
    #[error("node {0} is referenced more than once")]
    SharedNode(u32),

    /// Some nodes are not reachable from the root.
    #[error("{0} nodes are unreachable from the root")]
    UnreachableNodes(usize),

    /// A leaf refers to blocks outside the block array or to no blocks.
    #[error("leaf blocks {offset}..{offset}+{count} are out of range")]
    LeafOutOfRange {
        /// First block.
        offset: u32,
        /// Number of blocks.
        count: u32,
    },

    /// A block is owned by more than one leaf, or by none.
    #[error("block {0} is not owned by exactly one leaf")]
    BlockOwnership(usize),

    /// An interior node has fewer than two children.
    #[error("node {0} has fewer than two children")]
    UnderfullNode(u32),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
