//! Morton-curve linear builder.
//!
//! Reference centroids are quantized onto a 1024³ lattice inside the
//! centroid bounds and ordered along the Z-order curve. The sorted range is
//! cut at the highest bit where the first and last codes differ. The upper
//! levels are split on the calling thread until ranges are small enough to be
//! independent tasks; the tasks are built in parallel and the upper levels
//! are refit from their results.

use std::ops::Range;

use bvhkit_math::{Aabb3, Axis, Point3};
use bvhkit_parallel::WorkerPool;
use rayon::prelude::*;

use crate::bvh::Bvh;
use crate::context::BuildContext;
use crate::error::Result;
use crate::node::{NodeId, NodeRef};
use crate::prim_ref::{BuildRecord, PrimRef};
use crate::radix::{radix_sort, MortonId};
use crate::settings::MortonSettings;
use crate::source::{create_prim_refs, PrimitiveSource};

const LATTICE_BITS_PER_DIM: u32 = 10;
const LATTICE_MAX: u32 = (1 << LATTICE_BITS_PER_DIM) - 1;

/// Quantizes points inside a box to 30-bit Morton codes.
#[derive(Debug, Clone, Copy)]
pub struct MortonEncoder {
    origin: Point3,
    scale: [f64; 3],
}

impl MortonEncoder {
    /// Encoder for points inside `bounds`. Flat axes map to zero.
    pub fn new(bounds: &Aabb3) -> Self {
        let extent = bounds.extent();
        let scale = Axis::ALL.map(|axis| {
            let e = axis.of_vec(&extent);
            if e > 0.0 {
                f64::from(LATTICE_MAX + 1) / e
            } else {
                0.0
            }
        });
        Self {
            origin: bounds.min,
            scale,
        }
    }

    /// Morton code of `p`, bits interleaved as `..z1y1x1z0y0x0`.
    pub fn encode(&self, p: &Point3) -> u32 {
        let cell = |axis: Axis| {
            let i = axis.index();
            (((p[i] - self.origin[i]) * self.scale[i]) as u32).min(LATTICE_MAX)
        };
        spread_bits(cell(Axis::X)) | (spread_bits(cell(Axis::Y)) << 1) | (spread_bits(cell(Axis::Z)) << 2)
    }
}

/// Spread the low 10 bits of `x` so two zero bits separate each input bit.
fn spread_bits(x: u32) -> u32 {
    let mut x = x & 0x3ff;
    x = (x | (x << 16)) & 0x0300_00ff;
    x = (x | (x << 8)) & 0x0300_f00f;
    x = (x | (x << 4)) & 0x030c_30c3;
    x = (x | (x << 2)) & 0x0924_9249;
    x
}

/// Throughput-oriented BVH builder.
#[derive(Debug, Clone)]
pub struct MortonBuilder<const N: usize = 4> {
    settings: MortonSettings,
}

impl<const N: usize> MortonBuilder<N> {
    /// Create a builder with validated settings.
    pub fn new(settings: MortonSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Builder settings.
    pub fn settings(&self) -> &MortonSettings {
        &self.settings
    }

    /// Build a hierarchy over every valid primitive of `source`.
    pub fn build<S>(&self, pool: &WorkerPool, source: &S) -> Result<Bvh<S::Block, N>>
    where
        S: PrimitiveSource + ?Sized,
    {
        let (prims, info) = create_prim_refs(pool, source);
        let ctx = BuildContext::<S, N>::new(source, info.count)?;
        if info.is_empty() {
            log::debug!("morton build: no primitives");
            return ctx.finish(NodeRef::Empty, Aabb3::empty(), 0);
        }

        let encoder = MortonEncoder::new(&info.cent_bounds);
        let mut morton: Vec<MortonId> = pool.install(|| {
            prims
                .par_iter()
                .enumerate()
                .map(|(index, prim)| MortonId {
                    code: encoder.encode(&prim.centroid()),
                    index: index as u32,
                })
                .collect()
        });
        radix_sort(pool, &mut morton, self.settings.parallel_sort_threshold);

        let threshold = self
            .settings
            .top_level_threshold_for(info.count, pool.worker_count());
        let recursion = Recursion {
            settings: &self.settings,
            ctx: &ctx,
            prims: &prims,
        };
        let mut top = TopLevel::default();
        let root = recursion.split_top(BuildRecord::root(info.count), &mut morton, threshold, &mut top)?;
        let subtrees = pool.install(|| recursion.build_subtrees(&top.tasks, &mut morton))?;
        let (root, bounds) = pool.install(|| recursion.refit(&top, root, &subtrees));

        log::debug!(
            "morton build: {} primitives, {} subtree tasks of at most {}, {} nodes, {} recoded ranges",
            info.count,
            top.tasks.len(),
            threshold,
            ctx.node_count(),
            ctx.info().recoded_ranges
        );
        ctx.finish(root, bounds, info.count)
    }
}

impl<const N: usize> Default for MortonBuilder<N> {
    fn default() -> Self {
        Self {
            settings: MortonSettings::default(),
        }
    }
}

/// Upper levels of the tree, split sequentially.
#[derive(Debug, Default)]
struct TopLevel {
    nodes: Vec<TopNode>,
    tasks: Vec<BuildRecord>,
}

/// A reserved node whose bounds are only known after the subtrees are built.
#[derive(Debug)]
struct TopNode {
    id: NodeId,
    children: Vec<TopChild>,
}

#[derive(Debug, Clone, Copy)]
enum TopChild {
    Node(usize),
    Task(usize),
}

struct Recursion<'a, S: PrimitiveSource + ?Sized, const N: usize> {
    settings: &'a MortonSettings,
    ctx: &'a BuildContext<'a, S, N>,
    prims: &'a [PrimRef],
}

impl<S: PrimitiveSource + ?Sized, const N: usize> Recursion<'_, S, N> {
    /// Split `record` until ranges fit under `threshold`, queueing each such
    /// range as a subtree task.
    fn split_top(
        &self,
        record: BuildRecord,
        morton: &mut [MortonId],
        threshold: usize,
        top: &mut TopLevel,
    ) -> Result<TopChild> {
        let size = record.size();
        if size <= threshold || size <= self.settings.leaf_size || record.depth >= self.settings.max_depth {
            top.tasks.push(record);
            return Ok(TopChild::Task(top.tasks.len() - 1));
        }

        let ranges = self.grow(&mut morton[record.begin..record.end]);
        if ranges.len() == 1 {
            top.tasks.push(record);
            return Ok(TopChild::Task(top.tasks.len() - 1));
        }

        let id = self.ctx.reserve_node()?;
        let slot = top.nodes.len();
        top.nodes.push(TopNode {
            id,
            children: Vec::new(),
        });
        let mut children = Vec::with_capacity(ranges.len());
        for r in ranges {
            let child = record.child(record.begin + r.start, record.begin + r.end);
            children.push(self.split_top(child, morton, threshold, top)?);
        }
        top.nodes[slot].children = children;
        Ok(TopChild::Node(slot))
    }

    /// Build every queued task in parallel. Results are indexed like `tasks`.
    fn build_subtrees(
        &self,
        tasks: &[BuildRecord],
        morton: &mut [MortonId],
    ) -> Result<Vec<(NodeRef, Aabb3)>> {
        // Tasks are queued depth-first over children sorted by position, so
        // they tile the code array in order.
        let mut jobs = Vec::with_capacity(tasks.len());
        let mut rest = morton;
        let mut cursor = 0;
        for record in tasks {
            debug_assert_eq!(record.begin, cursor);
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(record.size());
            jobs.push((*record, head));
            rest = tail;
            cursor = record.end;
        }
        jobs.into_par_iter()
            .map(|(record, codes)| self.recurse(record, codes))
            .collect()
    }

    /// Write the reserved upper nodes bottom-up from the subtree results.
    fn refit(&self, top: &TopLevel, child: TopChild, subtrees: &[(NodeRef, Aabb3)]) -> (NodeRef, Aabb3) {
        match child {
            TopChild::Task(task) => subtrees[task],
            TopChild::Node(slot) => {
                let node = &top.nodes[slot];
                let children: Vec<(NodeRef, Aabb3)> = node
                    .children
                    .par_iter()
                    .map(|&c| self.refit(top, c, subtrees))
                    .collect();
                self.ctx.publish_node(node.id, children)
            }
        }
    }

    fn recurse(&self, record: BuildRecord, codes: &mut [MortonId]) -> Result<(NodeRef, Aabb3)> {
        if codes.len() <= self.settings.leaf_size {
            return self.create_leaf(codes);
        }
        if record.depth >= self.settings.max_depth {
            log::debug!(
                "depth limit {} reached with {} primitives, splitting by index",
                self.settings.max_depth,
                codes.len()
            );
            return self.split_by_index(record, codes);
        }

        let ranges = self.grow(codes);
        if ranges.len() == 1 {
            return self.create_leaf(codes);
        }

        let id = self.ctx.reserve_node()?;
        let mut children = Vec::with_capacity(ranges.len());
        let mut rest = codes;
        for r in ranges {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(r.len());
            let child = record.child(record.begin + r.start, record.begin + r.end);
            children.push(self.recurse(child, head)?);
            rest = tail;
        }
        Ok(self.ctx.publish_node(id, children))
    }

    /// Below the depth limit: split into `N` even index ranges until leaves.
    fn split_by_index(&self, record: BuildRecord, codes: &mut [MortonId]) -> Result<(NodeRef, Aabb3)> {
        let size = codes.len();
        if size <= self.settings.leaf_size {
            return self.create_leaf(codes);
        }
        let parts = N.min(size);
        let id = self.ctx.reserve_node()?;
        let mut children = Vec::with_capacity(parts);
        let mut rest = codes;
        for index in 0..parts {
            let begin = index * size / parts;
            let end = (index + 1) * size / parts;
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(end - begin);
            let child = record.child(record.begin + begin, record.begin + end);
            children.push(self.split_by_index(child, head)?);
            rest = tail;
        }
        Ok(self.ctx.publish_node(id, children))
    }

    /// Grow one node: repeatedly split the child with the most items until
    /// there are `N` children or nothing left to split. Returned ranges are
    /// relative to `codes` and sorted by position.
    fn grow(&self, codes: &mut [MortonId]) -> Vec<Range<usize>> {
        let mut children = Vec::with_capacity(N);
        children.push(0..codes.len());
        while children.len() < N {
            let mut best: Option<usize> = None;
            for (i, r) in children.iter().enumerate() {
                if r.len() <= self.settings.leaf_size {
                    continue;
                }
                if best.map_or(true, |b: usize| r.len() > children[b].len()) {
                    best = Some(i);
                }
            }
            let Some(best) = best else { break };
            let r = children[best].clone();
            let mid = r.start + self.split(&mut codes[r.clone()]);
            children[best] = r.start..mid;
            children.push(mid..r.end);
        }
        children.sort_by_key(|r| r.start);
        children
    }

    /// Position of the first code whose highest differing bit is set.
    fn split(&self, codes: &mut [MortonId]) -> usize {
        let mut attempts = 0;
        loop {
            let diff = codes[0].code ^ codes[codes.len() - 1].code;
            if diff != 0 {
                let mask = 1u32 << (31 - diff.leading_zeros());
                return codes.partition_point(|m| m.code & mask == 0);
            }
            if attempts == self.settings.max_recode_attempts {
                self.ctx.note_midpoint_split();
                return codes.len() / 2;
            }
            attempts += 1;
            self.recode(codes);
        }
    }

    /// Recompute codes for a range against its own centroid bounds and
    /// re-sort it.
    fn recode(&self, codes: &mut [MortonId]) {
        self.ctx.note_recode();
        let mut bounds = Aabb3::empty();
        for m in codes.iter() {
            bounds.include_point(&self.prims[m.index as usize].centroid());
        }
        let encoder = MortonEncoder::new(&bounds);
        for m in codes.iter_mut() {
            m.code = encoder.encode(&self.prims[m.index as usize].centroid());
        }
        codes.sort_by_key(|m| m.code);
    }

    fn create_leaf(&self, codes: &[MortonId]) -> Result<(NodeRef, Aabb3)> {
        let refs: Vec<PrimRef> = codes.iter().map(|m| self.prims[m.index as usize]).collect();
        self.ctx.create_leaf(&refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BoxBlock, BoxSource};

    fn cube(p: Point3) -> Aabb3 {
        Aabb3::new(p, p + bvhkit_math::Vec3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_spread_bits() {
        assert_eq!(spread_bits(0), 0);
        assert_eq!(spread_bits(1), 1);
        assert_eq!(spread_bits(0b11), 0b1001);
        assert_eq!(spread_bits(0x3ff), 0x0924_9249);
    }

    #[test]
    fn test_encoder_corners() {
        let bounds = Aabb3::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let enc = MortonEncoder::new(&bounds);
        assert_eq!(enc.encode(&Point3::origin()), 0);
        assert_eq!(enc.encode(&Point3::new(1.0, 1.0, 1.0)), 0x3fff_ffff);
        assert_eq!(enc.encode(&Point3::new(1.0, 0.0, 0.0)), 0x0924_9249);
        assert_eq!(enc.encode(&Point3::new(0.0, 1.0, 0.0)), 0x0924_9249 << 1);
    }

    #[test]
    fn test_flat_axis_encodes_to_zero() {
        let bounds = Aabb3::new(Point3::origin(), Point3::new(4.0, 0.0, 4.0));
        let enc = MortonEncoder::new(&bounds);
        let code = enc.encode(&Point3::new(2.0, 0.0, 2.0));
        assert_eq!(code & (0x0924_9249 << 1), 0);
    }

    #[test]
    fn test_build_grid() {
        let pool = WorkerPool::new(4).unwrap();
        let boxes: Vec<Aabb3> = (0..1000)
            .map(|i| cube(Point3::new((i % 10) as f64, ((i / 10) % 10) as f64, (i / 100) as f64)))
            .collect();
        let source = BoxSource::new(vec![boxes]);
        let bvh = MortonBuilder::<4>::default().build(&pool, &source).unwrap();
        bvh.validate(BoxBlock::bounds).unwrap();
        let stored: usize = bvh.blocks().iter().map(BoxBlock::len).sum();
        assert_eq!(stored, 1000);
        assert!(bvh.blocks().iter().all(|b| b.len() <= 4));
    }

    #[test]
    fn test_clustered_range_is_recoded() {
        // Half the centroids sit in one lattice cell of the global bounds but
        // are distinct at their own scale.
        let pool = WorkerPool::new(1).unwrap();
        let mut boxes: Vec<Aabb3> = (0..64)
            .map(|i| cube(Point3::new(i as f64 * 1e-6, 0.0, 0.0)))
            .collect();
        boxes.push(cube(Point3::new(1000.0, 1000.0, 1000.0)));
        let source = BoxSource::new(vec![boxes]);
        let bvh = MortonBuilder::<4>::default().build(&pool, &source).unwrap();
        bvh.validate(BoxBlock::bounds).unwrap();
        assert!(bvh.build_info().recoded_ranges > 0);
        assert_eq!(bvh.build_info().midpoint_splits, 0);
    }

    #[test]
    fn test_identical_centroids_fall_back_to_midpoint() {
        let pool = WorkerPool::new(2).unwrap();
        let source = BoxSource::new(vec![vec![cube(Point3::new(3.0, 3.0, 3.0)); 50]]);
        let bvh = MortonBuilder::<4>::default().build(&pool, &source).unwrap();
        bvh.validate(BoxBlock::bounds).unwrap();
        assert!(bvh.build_info().midpoint_splits > 0);
    }

    #[test]
    fn test_depth_limit_splits_by_index() {
        let pool = WorkerPool::new(1).unwrap();
        let settings = MortonSettings {
            max_depth: 1,
            leaf_size: 1,
            ..Default::default()
        };
        let boxes: Vec<Aabb3> = (0..40).map(|i| cube(Point3::new(i as f64, 0.0, 0.0))).collect();
        let bvh = MortonBuilder::<2>::new(settings)
            .unwrap()
            .build(&pool, &BoxSource::new(vec![boxes]))
            .unwrap();
        bvh.validate(BoxBlock::bounds).unwrap();
        assert_eq!(bvh.leaves().len(), 40);
    }
}
