#![warn(missing_docs)]

//! Math types for the bvhkit BVH builders.
//!
//! Thin wrappers around nalgebra providing the handful of types the
//! builders need: points, vectors, coordinate axes and axis-aligned
//! bounding boxes.

mod aabb;

pub use aabb::Aabb3;

use nalgebra::Vector3;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// One of the three coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The X axis.
    X,
    /// The Y axis.
    Y,
    /// The Z axis.
    Z,
}

impl Axis {
    /// All three axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of this axis (0, 1 or 2).
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Component of a point along this axis.
    pub fn of_point(self, p: &Point3) -> f64 {
        p[self.index()]
    }

    /// Component of a vector along this axis.
    pub fn of_vec(self, v: &Vec3) -> f64 {
        v[self.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_components() {
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(Axis::X.of_point(&p), 1.0);
        assert_eq!(Axis::Y.of_point(&p), 2.0);
        assert_eq!(Axis::Z.of_point(&p), 3.0);

        let v = Vec3::new(-4.0, 5.0, -6.0);
        assert_eq!(Axis::Z.of_vec(&v), -6.0);
    }

    #[test]
    fn test_axis_indices() {
        for (i, axis) in Axis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), i);
        }
    }
}
