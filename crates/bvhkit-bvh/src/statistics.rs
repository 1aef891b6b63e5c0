//! Summary statistics of a built hierarchy.

use std::fmt;

use bvhkit_math::Aabb3;
use serde::Serialize;

use crate::bvh::Bvh;
use crate::node::NodeRef;

/// Shape and estimated traversal cost of a hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BvhStatistics {
    /// Primitives the hierarchy was built over.
    pub primitives: usize,
    /// Interior nodes reachable from the root.
    pub interior_nodes: usize,
    /// Leaves reachable from the root.
    pub leaves: usize,
    /// Leaf blocks referenced by those leaves.
    pub blocks: usize,
    /// Length of the longest root-to-leaf path, counted in edges.
    pub depth: usize,
    /// Surface area heuristic cost relative to the root box: one unit per
    /// interior node visit and per leaf block.
    pub sah_cost: f64,
    /// Fraction of interior child slots in use.
    pub fill_ratio: f64,
    /// Leaves forced by the depth limit during the build.
    pub forced_leaves: usize,
}

impl BvhStatistics {
    /// Walk `bvh` and gather its statistics.
    pub fn compute<B, const N: usize>(bvh: &Bvh<B, N>) -> Self {
        let mut stats = Self {
            primitives: bvh.prim_count(),
            forced_leaves: bvh.build_info().forced_leaves,
            ..Default::default()
        };
        let root_area = bvh.bounds().half_area();
        let weight = |b: &Aabb3| {
            if root_area > 0.0 {
                b.half_area() / root_area
            } else {
                0.0
            }
        };

        let mut used_slots = 0;
        let mut stack = vec![(bvh.root(), *bvh.bounds(), 0usize)];
        while let Some((node, bounds, depth)) = stack.pop() {
            match node {
                NodeRef::Empty => {}
                NodeRef::Leaf { count, .. } => {
                    stats.leaves += 1;
                    stats.blocks += count as usize;
                    stats.depth = stats.depth.max(depth);
                    stats.sah_cost += weight(&bounds) * f64::from(count);
                }
                NodeRef::Interior(id) => {
                    let Some(n) = bvh.node(id) else { continue };
                    stats.interior_nodes += 1;
                    stats.sah_cost += weight(&bounds);
                    for (_, child_bounds, child) in n.iter() {
                        used_slots += 1;
                        stack.push((*child, *child_bounds, depth + 1));
                    }
                }
            }
        }
        if stats.interior_nodes > 0 {
            stats.fill_ratio = used_slots as f64 / (stats.interior_nodes * N) as f64;
        }
        stats
    }
}

impl fmt::Display for BvhStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "primitives: {}", self.primitives)?;
        writeln!(
            f,
            "nodes: {} interior, {} leaves, {} blocks",
            self.interior_nodes, self.leaves, self.blocks
        )?;
        writeln!(f, "depth: {}", self.depth)?;
        writeln!(f, "sah cost: {:.3}", self.sah_cost)?;
        write!(f, "fill: {:.1}%", self.fill_ratio * 100.0)?;
        if self.forced_leaves > 0 {
            write!(f, " ({} forced leaves)", self.forced_leaves)?;
        }
        Ok(())
    }
}
