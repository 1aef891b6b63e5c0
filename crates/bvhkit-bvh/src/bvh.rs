//! The built hierarchy.

use bvhkit_math::Aabb3;
use serde::Serialize;

use crate::error::ValidationError;
use crate::node::{Node, NodeId, NodeRef};

/// Diagnostics recorded while building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    /// Leaves created at the depth limit with more primitives than a leaf
    /// should hold.
    pub forced_leaves: usize,
    /// Ranges whose split fell back to the index midpoint.
    pub midpoint_splits: usize,
    /// Ranges whose Morton codes were recomputed against their own bounds.
    pub recoded_ranges: usize,
}

/// A bounding volume hierarchy with fan-out `N` over leaf blocks of type `B`.
///
/// Interior nodes live in [`Bvh::nodes`], leaves are runs of consecutive
/// blocks in [`Bvh::blocks`]. Node numbering depends on scheduling; the
/// topology does not.
#[derive(Debug, Clone)]
pub struct Bvh<B, const N: usize = 4> {
    root: NodeRef,
    bounds: Aabb3,
    nodes: Vec<Node<N>>,
    blocks: Vec<B>,
    prim_count: usize,
    info: BuildInfo,
}

impl<B, const N: usize> Bvh<B, N> {
    /// Hierarchy without primitives.
    pub fn empty() -> Self {
        Self {
            root: NodeRef::Empty,
            bounds: Aabb3::empty(),
            nodes: Vec::new(),
            blocks: Vec::new(),
            prim_count: 0,
            info: BuildInfo::default(),
        }
    }

    pub(crate) fn from_parts(
        root: NodeRef,
        bounds: Aabb3,
        nodes: Vec<Node<N>>,
        blocks: Vec<B>,
        prim_count: usize,
        info: BuildInfo,
    ) -> Self {
        Self {
            root,
            bounds,
            nodes,
            blocks,
            prim_count,
            info,
        }
    }

    /// Root reference; [`NodeRef::Empty`] when there are no primitives.
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Bounds of every primitive in the hierarchy.
    pub fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    /// All interior nodes.
    pub fn nodes(&self) -> &[Node<N>] {
        &self.nodes
    }

    /// All leaf blocks.
    pub fn blocks(&self) -> &[B] {
        &self.blocks
    }

    /// Interior node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node<N>> {
        self.nodes.get(id.index())
    }

    /// Blocks of a leaf; empty for any other reference.
    pub fn leaf_blocks(&self, node: NodeRef) -> &[B] {
        match node {
            NodeRef::Leaf { offset, count } => {
                let start = offset as usize;
                self.blocks
                    .get(start..start + count as usize)
                    .unwrap_or(&[])
            }
            _ => &[],
        }
    }

    /// Number of primitives the hierarchy was built over.
    pub fn prim_count(&self) -> usize {
        self.prim_count
    }

    /// Diagnostics of the build that produced this hierarchy.
    pub fn build_info(&self) -> &BuildInfo {
        &self.info
    }

    /// True if the hierarchy holds no primitives.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Every leaf with its stored bounds, in depth-first child order.
    pub fn leaves(&self) -> Vec<(NodeRef, Aabb3)> {
        let mut leaves = Vec::new();
        let mut stack = vec![(self.root, self.bounds)];
        while let Some((node, bounds)) = stack.pop() {
            match node {
                NodeRef::Empty => {}
                NodeRef::Leaf { .. } => leaves.push((node, bounds)),
                NodeRef::Interior(id) => {
                    if let Some(n) = self.node(id) {
                        stack.extend(n.iter().map(|(_, b, c)| (*c, *b)).rev());
                    }
                }
            }
        }
        leaves
    }

    /// Check the structure against the leaf contents.
    ///
    /// `block_bounds` returns the union of the primitives in one block. Every
    /// stored child box must equal the union of its subtree exactly, every node
    /// must be reachable exactly once, and every block must belong to exactly
    /// one leaf.
    pub fn validate<F>(&self, block_bounds: F) -> Result<(), ValidationError>
    where
        F: Fn(&B) -> Aabb3,
    {
        let mut check = Validator {
            bvh: self,
            block_bounds: &block_bounds,
            seen: vec![false; self.nodes.len()],
            owned: vec![false; self.blocks.len()],
        };
        let actual = check.subtree(self.root)?;
        if actual != self.bounds {
            return Err(ValidationError::RootBounds);
        }
        let unreachable = check.seen.iter().filter(|s| !**s).count();
        if unreachable > 0 {
            return Err(ValidationError::UnreachableNodes(unreachable));
        }
        if let Some(block) = check.owned.iter().position(|o| !o) {
            return Err(ValidationError::BlockOwnership(block));
        }
        Ok(())
    }
}

impl<B, const N: usize> Default for Bvh<B, N> {
    fn default() -> Self {
        Self::empty()
    }
}

struct Validator<'a, B, F, const N: usize> {
    bvh: &'a Bvh<B, N>,
    block_bounds: &'a F,
    seen: Vec<bool>,
    owned: Vec<bool>,
}

impl<B, F, const N: usize> Validator<'_, B, F, N>
where
    F: Fn(&B) -> Aabb3,
{
    fn subtree(&mut self, node: NodeRef) -> Result<Aabb3, ValidationError> {
        match node {
            NodeRef::Empty => Ok(Aabb3::empty()),
            NodeRef::Leaf { offset, count } => {
                let start = offset as usize;
                let end = start + count as usize;
                if count == 0 || end > self.bvh.blocks.len() {
                    return Err(ValidationError::LeafOutOfRange { offset, count });
                }
                let mut bounds = Aabb3::empty();
                for block in start..end {
                    if self.owned[block] {
                        return Err(ValidationError::BlockOwnership(block));
                    }
                    self.owned[block] = true;
                    bounds.include(&(self.block_bounds)(&self.bvh.blocks[block]));
                }
                Ok(bounds)
            }
            NodeRef::Interior(id) => {
                let Some(n) = self.bvh.node(id) else {
                    return Err(ValidationError::DanglingNode(id.0));
                };
                if std::mem::replace(&mut self.seen[id.index()], true) {
                    return Err(ValidationError::SharedNode(id.0));
                }
                if n.child_count() < 2 {
                    return Err(ValidationError::UnderfullNode(id.0));
                }
                let mut bounds = Aabb3::empty();
                for (index, stored, child) in n.iter() {
                    let actual = self.subtree(*child)?;
                    if actual != *stored {
                        return Err(ValidationError::BoundsMismatch { node: id.0, index });
                    }
                    bounds.include(&actual);
                }
                Ok(bounds)
            }
        }
    }
}
