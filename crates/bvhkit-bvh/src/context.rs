//! Arenas and leaf/node creation shared by both builders.

use std::sync::atomic::{AtomicUsize, Ordering};

use bvhkit_math::Aabb3;

use crate::arena::BumpArena;
use crate::bvh::{BuildInfo, Bvh};
use crate::error::{BuildError, Result};
use crate::node::{Node, NodeId, NodeRef};
use crate::prim_ref::PrimRef;
use crate::source::PrimitiveSource;

pub(crate) struct BuildContext<'a, S: PrimitiveSource + ?Sized, const N: usize> {
    pub(crate) source: &'a S,
    nodes: BumpArena<Node<N>>,
    blocks: BumpArena<S::Block>,
    forced_leaves: AtomicUsize,
    midpoint_splits: AtomicUsize,
    recoded_ranges: AtomicUsize,
}

impl<'a, S: PrimitiveSource + ?Sized, const N: usize> BuildContext<'a, S, N> {
    /// Arenas sized for `prim_count` references.
    ///
    /// Every interior node has at least two children and every leaf block
    /// holds at least one primitive, so `prim_count` bounds both.
    pub(crate) fn new(source: &'a S, prim_count: usize) -> Result<Self> {
        if N < 2 {
            return Err(BuildError::InvalidSettings(format!(
                "fan-out must be at least 2, got {N}"
            )));
        }
        if S::BLOCK_CAPACITY == 0 {
            return Err(BuildError::InvalidSettings(
                "primitive source has a block capacity of zero".into(),
            ));
        }
        Ok(Self {
            source,
            nodes: BumpArena::with_capacity("node", prim_count.saturating_sub(1).max(1)),
            blocks: BumpArena::with_capacity("block", prim_count),
            forced_leaves: AtomicUsize::new(0),
            midpoint_splits: AtomicUsize::new(0),
            recoded_ranges: AtomicUsize::new(0),
        })
    }

    pub(crate) fn reserve_node(&self) -> Result<NodeId> {
        let range = self.nodes.alloc(1)?;
        Ok(NodeId(range.start as u32))
    }

    /// Fill a reserved node from `(bounds, child)` pairs and return its
    /// reference and bounds.
    pub(crate) fn publish_node<I>(&self, id: NodeId, children: I) -> (NodeRef, Aabb3)
    where
        I: IntoIterator<Item = (NodeRef, Aabb3)>,
    {
        let mut node = Node::<N>::default();
        let mut bounds = Aabb3::empty();
        for (index, (child, child_bounds)) in children.into_iter().enumerate() {
            node.set(index, child_bounds, child);
            bounds.include(&child_bounds);
        }
        self.nodes.publish(id.index(), node);
        (NodeRef::Interior(id), bounds)
    }

    /// Pack `prims` into freshly reserved leaf blocks.
    pub(crate) fn create_leaf(&self, prims: &[PrimRef]) -> Result<(NodeRef, Aabb3)> {
        let range = self.blocks.alloc(S::blocks(prims.len()))?;
        let offset = range.start;
        for (slot, chunk) in range.zip(prims.chunks(S::BLOCK_CAPACITY)) {
            self.blocks.publish(slot, self.source.fill_block(chunk));
        }
        let bounds: Aabb3 = prims.iter().map(|p| &p.bounds).collect();
        let leaf = NodeRef::Leaf {
            offset: offset as u32,
            count: S::blocks(prims.len()) as u32,
        };
        Ok((leaf, bounds))
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn note_forced_leaf(&self) {
        self.forced_leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_midpoint_split(&self) {
        self.midpoint_splits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_recode(&self) {
        self.recoded_ranges.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn info(&self) -> BuildInfo {
        BuildInfo {
            forced_leaves: self.forced_leaves.load(Ordering::Relaxed),
            midpoint_splits: self.midpoint_splits.load(Ordering::Relaxed),
            recoded_ranges: self.recoded_ranges.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn finish(
        self,
        root: NodeRef,
        bounds: Aabb3,
        prim_count: usize,
    ) -> Result<Bvh<S::Block, N>> {
        let info = self.info();
        Ok(Bvh::from_parts(
            root,
            bounds,
            self.nodes.into_vec()?,
            self.blocks.into_vec()?,
            prim_count,
            info,
        ))
    }
}
