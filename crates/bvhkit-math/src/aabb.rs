//! Axis-aligned bounding boxes.

use crate::{Point3, Vec3};

/// Axis-aligned bounding box in 3D.
///
/// The empty box is inverted (`min = +inf`, `max = -inf`) so that growing
/// it by any point or box yields exactly that point or box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// True if no point has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// True if both corners are finite and ordered.
    pub fn is_valid(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|c| c.is_finite()) && !self.is_empty()
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand this AABB to include another box.
    pub fn include(&mut self, other: &Aabb3) {
        if other.is_empty() {
            return;
        }
        self.include_point(&other.min);
        self.include_point(&other.max);
    }

    /// Union of two boxes.
    pub fn merged(mut self, other: &Aabb3) -> Aabb3 {
        self.include(other);
        self
    }

    /// Center of the box.
    pub fn centroid(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Edge lengths, zero for an empty box.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::zeros();
        }
        self.max - self.min
    }

    /// Half the surface area, zero for an empty box.
    pub fn half_area(&self) -> f64 {
        let d = self.extent();
        d.x * d.y + d.y * d.z + d.z * d.x
    }
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> FromIterator<&'a Aabb3> for Aabb3 {
    fn from_iter<I: IntoIterator<Item = &'a Aabb3>>(iter: I) -> Self {
        iter.into_iter().fold(Aabb3::empty(), |acc, b| acc.merged(b))
    }
}
