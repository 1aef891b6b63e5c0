//! Node model shared by both builders.

use bvhkit_math::Aabb3;
use serde::{Deserialize, Serialize};

/// Index of an interior node in [`crate::Bvh::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position in the node array.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference to a child subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeRef {
    /// Unused child slot, or the root of a hierarchy without primitives.
    #[default]
    Empty,
    /// Interior node.
    Interior(NodeId),
    /// Run of `count` consecutive leaf blocks starting at `offset`.
    Leaf {
        /// First block in [`crate::Bvh::blocks`].
        offset: u32,
        /// Number of blocks, at least one.
        count: u32,
    },
}

impl NodeRef {
    /// True for [`NodeRef::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeRef::Empty)
    }

    /// True for [`NodeRef::Leaf`].
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeRef::Leaf { .. })
    }
}

/// Interior node with fan-out `N`.
///
/// Used children occupy the leading slots; trailing slots are
/// [`NodeRef::Empty`] with empty bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<const N: usize> {
    /// Bounds of each child subtree.
    pub bounds: [Aabb3; N],
    /// Child references.
    pub children: [NodeRef; N],
}

impl<const N: usize> Node<N> {
    /// Set child slot `index`.
    pub fn set(&mut self, index: usize, bounds: Aabb3, child: NodeRef) {
        self.bounds[index] = bounds;
        self.children[index] = child;
    }

    /// Number of non-empty children.
    pub fn child_count(&self) -> usize {
        self.children.iter().filter(|c| !c.is_empty()).count()
    }

    /// Iterate over `(slot, bounds, child)` for non-empty children.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &Aabb3, &NodeRef)> {
        self.bounds
            .iter()
            .zip(self.children.iter())
            .enumerate()
            .filter(|(_, (_, c))| !c.is_empty())
            .map(|(i, (b, c))| (i, b, c))
    }

    /// Union of all child bounds.
    pub fn bounds(&self) -> Aabb3 {
        self.iter().map(|(_, b, _)| b).collect()
    }
}

impl<const N: usize> Default for Node<N> {
    fn default() -> Self {
        Self {
            bounds: [Aabb3::empty(); N],
            children: [NodeRef::Empty; N],
        }
    }
}
