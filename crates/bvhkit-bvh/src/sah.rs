//! Binned surface-area-heuristic builder.
//!
//! Top-down: each range is binned by centroid along every axis, the cheapest
//! bin boundary is chosen with the surface area heuristic, and the range is
//! partitioned in place. A node is grown to `N` children by repeatedly
//! splitting the child with the largest surface area.

use bvhkit_math::{Aabb3, Axis, Point3};
use bvhkit_parallel::WorkerPool;
use rayon::prelude::*;

use crate::bvh::Bvh;
use crate::context::BuildContext;
use crate::error::Result;
use crate::node::NodeRef;
use crate::prim_ref::{BuildRecord, PrimInfo, PrimRef};
use crate::settings::SahSettings;
use crate::source::{create_prim_refs, PrimitiveSource};

/// Quality-oriented BVH builder.
#[derive(Debug, Clone)]
pub struct SahBuilder<const N: usize = 4> {
    settings: SahSettings,
}

impl<const N: usize> SahBuilder<N> {
    /// Create a builder with validated settings.
    pub fn new(settings: SahSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Builder settings.
    pub fn settings(&self) -> &SahSettings {
        &self.settings
    }

    /// Build a hierarchy over every valid primitive of `source`.
    pub fn build<S>(&self, pool: &WorkerPool, source: &S) -> Result<Bvh<S::Block, N>>
    where
        S: PrimitiveSource + ?Sized,
    {
        let (mut prims, info) = create_prim_refs(pool, source);
        let ctx = BuildContext::<S, N>::new(source, info.count)?;
        if info.is_empty() {
            log::debug!("sah build: no primitives");
            return ctx.finish(NodeRef::Empty, Aabb3::empty(), 0);
        }

        let recursion = Recursion {
            settings: &self.settings,
            ctx: &ctx,
        };
        let (root, bounds) =
            pool.install(|| recursion.recurse(BuildRecord::root(info.count), info, &mut prims))?;

        log::debug!(
            "sah build: {} primitives, {} nodes, {} workers",
            info.count,
            ctx.node_count(),
            pool.worker_count()
        );
        ctx.finish(root, bounds, info.count)
    }
}

impl<const N: usize> Default for SahBuilder<N> {
    fn default() -> Self {
        Self {
            settings: SahSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Split {
    Binned { axis: Axis, bin: usize, cost: f64 },
    Midpoint,
}

/// A candidate child while a node is being grown. Positions are relative to
/// the parent's slice.
#[derive(Debug, Clone, Copy)]
struct Child {
    begin: usize,
    end: usize,
    info: PrimInfo,
    split: Option<Split>,
}

impl Child {
    fn size(&self) -> usize {
        self.end - self.begin
    }
}

/// Maps centroids to bins along each axis of a centroid box.
struct BinMapping {
    origin: Point3,
    scale: [f64; 3],
    bins: usize,
}

impl BinMapping {
    fn new(cent_bounds: &Aabb3, bins: usize) -> Self {
        let extent = cent_bounds.extent();
        let scale = Axis::ALL.map(|axis| {
            let e = axis.of_vec(&extent);
            if e > 0.0 {
                bins as f64 / e
            } else {
                0.0
            }
        });
        Self {
            origin: cent_bounds.min,
            scale,
            bins,
        }
    }

    fn splittable(&self, axis: Axis) -> bool {
        self.scale[axis.index()] > 0.0
    }

    fn bin(&self, p: &Point3, axis: Axis) -> usize {
        let b = (axis.of_point(p) - axis.of_point(&self.origin)) * self.scale[axis.index()];
        (b as usize).min(self.bins - 1)
    }
}

#[derive(Debug, Clone)]
struct Bins {
    counts: Vec<[usize; 3]>,
    bounds: Vec<[Aabb3; 3]>,
}

impl Bins {
    fn new(bins: usize) -> Self {
        Self {
            counts: vec![[0; 3]; bins],
            bounds: vec![[Aabb3::empty(); 3]; bins],
        }
    }

    fn add(&mut self, map: &BinMapping, prim: &PrimRef) {
        let c = prim.centroid();
        for axis in Axis::ALL {
            let b = map.bin(&c, axis);
            self.counts[b][axis.index()] += 1;
            self.bounds[b][axis.index()].include(&prim.bounds);
        }
    }

    fn merge(mut self, other: Bins) -> Bins {
        for (b, (counts, bounds)) in other.counts.iter().zip(&other.bounds).enumerate() {
            for i in 0..3 {
                self.counts[b][i] += counts[i];
                self.bounds[b][i].include(&bounds[i]);
            }
        }
        self
    }

    /// Cheapest bin boundary as `(axis, first right bin, cost)`.
    fn best_split(&self, map: &BinMapping, blocks: impl Fn(usize) -> usize) -> Option<(Axis, usize, f64)> {
        let n = map.bins;
        let mut best: Option<(Axis, usize, f64)> = None;
        let mut right_area = vec![0.0; n];
        let mut right_count = vec![0usize; n];
        for axis in Axis::ALL.into_iter().filter(|&a| map.splittable(a)) {
            let i = axis.index();

            let mut bounds = Aabb3::empty();
            let mut count = 0;
            for b in (1..n).rev() {
                bounds.include(&self.bounds[b][i]);
                count += self.counts[b][i];
                right_area[b] = bounds.half_area();
                right_count[b] = count;
            }

            let mut bounds = Aabb3::empty();
            let mut count = 0;
            for b in 1..n {
                bounds.include(&self.bounds[b - 1][i]);
                count += self.counts[b - 1][i];
                if count == 0 || right_count[b] == 0 {
                    continue;
                }
                let cost = bounds.half_area() * blocks(count) as f64
                    + right_area[b] * blocks(right_count[b]) as f64;
                if best.map_or(true, |(_, _, c)| cost < c) {
                    best = Some((axis, b, cost));
                }
            }
        }
        best
    }
}

struct Recursion<'a, S: PrimitiveSource + ?Sized, const N: usize> {
    settings: &'a SahSettings,
    ctx: &'a BuildContext<'a, S, N>,
}

impl<S: PrimitiveSource + ?Sized, const N: usize> Recursion<'_, S, N> {
    fn recurse(
        &self,
        record: BuildRecord,
        info: PrimInfo,
        prims: &mut [PrimRef],
    ) -> Result<(NodeRef, Aabb3)> {
        let s = self.settings;
        let count = prims.len();
        if count <= s.min_leaf_size {
            return self.ctx.create_leaf(prims);
        }
        if record.depth >= s.max_depth {
            if count > s.max_leaf_size {
                self.ctx.note_forced_leaf();
                log::warn!(
                    "depth limit {} reached with {} primitives, forcing a leaf",
                    s.max_depth,
                    count
                );
            }
            return self.ctx.create_leaf(prims);
        }

        let split = self.find_split(&info, prims);
        if count <= s.max_leaf_size {
            let area = info.geom_bounds.half_area();
            let leaf_cost = s.intersection_cost * area * S::blocks(count) as f64;
            let split_cost = match split {
                Split::Binned { cost, .. } => s.traversal_cost * area + s.intersection_cost * cost,
                Split::Midpoint => f64::INFINITY,
            };
            if leaf_cost <= split_cost {
                return self.ctx.create_leaf(prims);
            }
        }

        let mut children = Vec::with_capacity(N);
        children.push(Child {
            begin: 0,
            end: count,
            info,
            split: Some(split),
        });
        while children.len() < N {
            let mut best: Option<(usize, f64)> = None;
            for (i, child) in children.iter().enumerate() {
                if child.size() <= s.min_leaf_size {
                    continue;
                }
                let area = child.info.geom_bounds.half_area();
                if best.map_or(true, |(_, a)| area > a) {
                    best = Some((i, area));
                }
            }
            let Some((best, _)) = best else { break };
            let (left, right) = self.split_child(&children[best], prims);
            children[best] = left;
            children.push(right);
        }
        if children.len() == 1 {
            return self.ctx.create_leaf(prims);
        }

        children.sort_by_key(|c| c.begin);
        let id = self.ctx.reserve_node()?;
        let mut parts = Vec::with_capacity(children.len());
        let mut rest = prims;
        for child in &children {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(child.size());
            let rec = record.child(record.begin + child.begin, record.begin + child.end);
            parts.push((rec, child.info, head));
            rest = tail;
        }

        let results: Vec<(NodeRef, Aabb3)> = if count > s.parallel_threshold {
            parts
                .into_par_iter()
                .map(|(rec, info, slice)| self.recurse(rec, info, slice))
                .collect::<Result<_>>()?
        } else {
            parts
                .into_iter()
                .map(|(rec, info, slice)| self.recurse(rec, info, slice))
                .collect::<Result<_>>()?
        };
        Ok(self.ctx.publish_node(id, results))
    }

    fn find_split(&self, info: &PrimInfo, prims: &[PrimRef]) -> Split {
        let map = BinMapping::new(&info.cent_bounds, self.settings.bin_count);
        if !Axis::ALL.into_iter().any(|a| map.splittable(a)) {
            return Split::Midpoint;
        }
        let bins = if prims.len() > self.settings.parallel_threshold {
            prims
                .par_iter()
                .fold(
                    || Bins::new(map.bins),
                    |mut bins, prim| {
                        bins.add(&map, prim);
                        bins
                    },
                )
                .reduce(|| Bins::new(map.bins), Bins::merge)
        } else {
            let mut bins = Bins::new(map.bins);
            for prim in prims {
                bins.add(&map, prim);
            }
            bins
        };
        match bins.best_split(&map, S::blocks) {
            Some((axis, bin, cost)) => Split::Binned { axis, bin, cost },
            None => Split::Midpoint,
        }
    }

    /// Split `child` of the range `prims`, partitioning its slice in place.
    fn split_child(&self, child: &Child, prims: &mut [PrimRef]) -> (Child, Child) {
        let slice = &mut prims[child.begin..child.end];
        let split = match child.split {
            Some(split) => split,
            None => self.find_split(&child.info, slice),
        };
        let (mid, left, right) = match split {
            Split::Binned { axis, bin, .. } => {
                let map = BinMapping::new(&child.info.cent_bounds, self.settings.bin_count);
                partition(slice, |p| map.bin(&p.centroid(), axis) < bin)
            }
            Split::Midpoint => {
                self.ctx.note_midpoint_split();
                let mid = slice.len() / 2;
                (
                    mid,
                    PrimInfo::from_refs(&slice[..mid]),
                    PrimInfo::from_refs(&slice[mid..]),
                )
            }
        };
        (
            Child {
                begin: child.begin,
                end: child.begin + mid,
                info: left,
                split: None,
            },
            Child {
                begin: child.begin + mid,
                end: child.end,
                info: right,
                split: None,
            },
        )
    }
}

/// Move references satisfying `goes_left` to the front and summarize both
/// sides in the same pass.
fn partition<F>(prims: &mut [PrimRef], goes_left: F) -> (usize, PrimInfo, PrimInfo)
where
    F: Fn(&PrimRef) -> bool,
{
    let mut left = 0;
    let mut right = prims.len();
    let mut left_info = PrimInfo::empty();
    let mut right_info = PrimInfo::empty();

    while left < right {
        if goes_left(&prims[left]) {
            left_info.add(&prims[left]);
            left += 1;
        } else {
            right -= 1;
            prims.swap(left, right);
            right_info.add(&prims[right]);
        }
    }

    (left, left_info, right_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{BoxBlock, BoxSource};
    use approx::assert_relative_eq;

    fn unit_at(x: f64, y: f64, z: f64) -> Aabb3 {
        Aabb3::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    fn row(n: usize) -> BoxSource {
        BoxSource::new(vec![(0..n).map(|i| unit_at(i as f64 * 2.0, 0.0, 0.0)).collect()])
    }

    #[test]
    fn test_partition_summarizes_both_sides() {
        let mut prims: Vec<PrimRef> = (0..10)
            .map(|i| PrimRef::new(unit_at(i as f64, 0.0, 0.0), 0, i))
            .collect();
        let (mid, left, right) = partition(&mut prims, |p| p.prim_id % 2 == 0);
        assert_eq!(mid, 5);
        assert!(prims[..5].iter().all(|p| p.prim_id % 2 == 0));
        assert_eq!(left.count + right.count, 10);
        assert_eq!(left, PrimInfo::from_refs(&prims[..5]));
        assert_eq!(right, PrimInfo::from_refs(&prims[5..]));
    }

    #[test]
    fn test_bin_mapping_clamps_last_bin() {
        let bounds = Aabb3::new(Point3::origin(), Point3::new(16.0, 0.0, 0.0));
        let map = BinMapping::new(&bounds, 16);
        assert!(map.splittable(Axis::X));
        assert!(!map.splittable(Axis::Y));
        assert_eq!(map.bin(&Point3::new(0.0, 0.0, 0.0), Axis::X), 0);
        assert_eq!(map.bin(&Point3::new(15.5, 0.0, 0.0), Axis::X), 15);
        assert_eq!(map.bin(&Point3::new(16.0, 0.0, 0.0), Axis::X), 15);
    }

    #[test]
    fn test_best_split_separates_clusters() {
        let mut prims: Vec<PrimRef> = (0..4)
            .map(|i| PrimRef::new(unit_at(i as f64 * 0.1, 0.0, 0.0), 0, i))
            .chain((0..4).map(|i| PrimRef::new(unit_at(100.0 + i as f64 * 0.1, 0.0, 0.0), 0, 4 + i)))
            .collect();
        let info = PrimInfo::from_refs(&prims);
        let map = BinMapping::new(&info.cent_bounds, 16);
        let mut bins = Bins::new(16);
        for p in &prims {
            bins.add(&map, p);
        }
        let (axis, bin, cost) = bins.best_split(&map, BoxSource::blocks).unwrap();
        assert_eq!(axis, Axis::X);
        let (mid, _, _) = partition(&mut prims, |p| map.bin(&p.centroid(), axis) < bin);
        assert_eq!(mid, 4);
        // Two unit-ish clusters, one block each.
        assert_relative_eq!(cost, 2.0 * unit_at(0.0, 0.0, 0.0).merged(&unit_at(0.3, 0.0, 0.0)).half_area());
    }

    #[test]
    fn test_build_row() {
        let pool = WorkerPool::new(2).unwrap();
        let bvh = SahBuilder::<4>::default().build(&pool, &row(100)).unwrap();
        assert_eq!(bvh.prim_count(), 100);
        bvh.validate(BoxBlock::bounds).unwrap();
        let stored: usize = bvh.blocks().iter().map(BoxBlock::len).sum();
        assert_eq!(stored, 100);
    }

    #[test]
    fn test_single_primitive_is_a_leaf() {
        let pool = WorkerPool::new(1).unwrap();
        let bvh = SahBuilder::<4>::default().build(&pool, &row(1)).unwrap();
        assert!(bvh.root().is_leaf());
        assert!(bvh.nodes().is_empty());
        assert_eq!(*bvh.bounds(), unit_at(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_identical_centroids_fall_back_to_midpoint() {
        let pool = WorkerPool::new(2).unwrap();
        let source = BoxSource::new(vec![vec![unit_at(1.0, 1.0, 1.0); 200]]);
        let bvh = SahBuilder::<4>::default().build(&pool, &source).unwrap();
        bvh.validate(BoxBlock::bounds).unwrap();
        assert!(bvh.build_info().midpoint_splits > 0);
        let stored: usize = bvh.blocks().iter().map(BoxBlock::len).sum();
        assert_eq!(stored, 200);
    }

    #[test]
    fn test_depth_limit_forces_leaves() {
        let pool = WorkerPool::new(2).unwrap();
        let settings = SahSettings {
            max_depth: 1,
            min_leaf_size: 1,
            max_leaf_size: 2,
            ..Default::default()
        };
        let bvh = SahBuilder::<2>::new(settings).unwrap().build(&pool, &row(64)).unwrap();
        bvh.validate(BoxBlock::bounds).unwrap();
        assert_eq!(bvh.nodes().len(), 1);
        assert_eq!(bvh.build_info().forced_leaves, 2);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = SahSettings {
            min_leaf_size: 0,
            ..Default::default()
        };
        assert!(SahBuilder::<4>::new(settings).is_err());
    }
}
