//! Primitive references and build records.

use bvhkit_math::{Aabb3, Point3};

/// Bounds of one primitive plus the ids needed to find it again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimRef {
    /// World-space bounds of the primitive.
    pub bounds: Aabb3,
    /// Group (geometry) the primitive belongs to.
    pub geom_id: u32,
    /// Index of the primitive within its group.
    pub prim_id: u32,
}

impl PrimRef {
    /// Create a reference.
    pub fn new(bounds: Aabb3, geom_id: u32, prim_id: u32) -> Self {
        Self {
            bounds,
            geom_id,
            prim_id,
        }
    }

    /// Center of the primitive's bounds.
    pub fn centroid(&self) -> Point3 {
        self.bounds.centroid()
    }
}

/// Count, geometry bounds, and centroid bounds of a set of references.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimInfo {
    /// Number of references.
    pub count: usize,
    /// Union of the reference bounds.
    pub geom_bounds: Aabb3,
    /// Bounds of the reference centroids.
    pub cent_bounds: Aabb3,
}

impl PrimInfo {
    /// Summary of an empty set.
    pub fn empty() -> Self {
        Self {
            count: 0,
            geom_bounds: Aabb3::empty(),
            cent_bounds: Aabb3::empty(),
        }
    }

    /// Add one reference.
    pub fn add(&mut self, prim: &PrimRef) {
        self.count += 1;
        self.geom_bounds.include(&prim.bounds);
        self.cent_bounds.include_point(&prim.centroid());
    }

    /// Combine two summaries.
    pub fn merge(mut self, other: &PrimInfo) -> Self {
        self.count += other.count;
        self.geom_bounds.include(&other.geom_bounds);
        self.cent_bounds.include(&other.cent_bounds);
        self
    }

    /// Summarize a slice of references.
    pub fn from_refs(prims: &[PrimRef]) -> Self {
        let mut info = Self::empty();
        for prim in prims {
            info.add(prim);
        }
        info
    }

    /// True if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for PrimInfo {
    fn default() -> Self {
        Self::empty()
    }
}

/// A pending subtree over `begin..end` of the reference array.
///
/// Builders return each finished subtree as `(NodeRef, Aabb3)` to the caller
/// that created the record, which stores it in the parent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRecord {
    /// First reference, inclusive.
    pub begin: usize,
    /// Last reference, exclusive.
    pub end: usize,
    /// Depth of the subtree root.
    pub depth: usize,
}

impl BuildRecord {
    /// Record for the whole array of `count` references.
    pub fn root(count: usize) -> Self {
        Self {
            begin: 0,
            end: count,
            depth: 0,
        }
    }

    /// Number of references covered.
    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    /// Record for `begin..end` one level below this one.
    pub fn child(&self, begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            depth: self.depth + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prim(x: f64) -> PrimRef {
        PrimRef::new(
            Aabb3::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 2.0, 1.0, 1.0)),
            0,
            0,
        )
    }

    #[test]
    fn test_prim_info_tracks_centroids() {
        let info = PrimInfo::from_refs(&[prim(0.0), prim(4.0)]);
        assert_eq!(info.count, 2);
        assert_eq!(info.geom_bounds.min.x, 0.0);
        assert_eq!(info.geom_bounds.max.x, 6.0);
        assert_eq!(info.cent_bounds.min.x, 1.0);
        assert_eq!(info.cent_bounds.max.x, 5.0);
    }

    #[test]
    fn test_prim_info_merge() {
        let a = PrimInfo::from_refs(&[prim(0.0)]);
        let b = PrimInfo::from_refs(&[prim(4.0)]);
        assert_eq!(a.merge(&b), PrimInfo::from_refs(&[prim(0.0), prim(4.0)]));
        assert_eq!(PrimInfo::empty().merge(&a), a);
    }

    #[test]
    fn test_child_record() {
        let root = BuildRecord::root(10);
        let child = root.child(3, 7);
        assert_eq!(child.size(), 4);
        assert_eq!(child.depth, 1);
        assert_eq!(child.child(3, 5).depth, 2);
    }
}
