//! World-space axis-aligned bounding boxes in f32.

use glam::{Mat4, Vec3};

/// An axis-aligned bounding box in world f32 space.
///
/// Invariant: `min <= max` on every axis. The constructor enforces this by
/// sorting components.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Vec3,
    /// Maximum corner of the bounding box.
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB from two corners. Automatically sorts components so
    /// that min <= max on every axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create an AABB from a center point and half-extents.
    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns the eight corner points.
    pub fn corners(&self) -> [Vec3; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            Vec3::new(mn.x, mn.y, mn.z),
            Vec3::new(mx.x, mn.y, mn.z),
            Vec3::new(mn.x, mx.y, mn.z),
            Vec3::new(mx.x, mx.y, mn.z),
            Vec3::new(mn.x, mn.y, mx.z),
            Vec3::new(mx.x, mn.y, mx.z),
            Vec3::new(mn.x, mx.y, mx.z),
            Vec3::new(mx.x, mx.y, mx.z),
        ]
    }

    /// Returns the smallest AABB enclosing both self and other.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Transform the AABB by an affine matrix, returning the enclosing
    /// world-space AABB of the transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for corner in self.corners() {
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Aabb { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_auto_sorts() {
        let aabb = Aabb::new(Vec3::splat(10.0), Vec3::ZERO);
        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_center_and_extents() {
        let aabb = Aabb::new(Vec3::new(-2.0, -3.0, -4.0), Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(aabb.center(), Vec3::ZERO);
        assert_eq!(aabb.extents(), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_from_center_half_extents() {
        let aabb = Aabb::from_center_half_extents(Vec3::splat(10.0), Vec3::splat(5.0));
        assert_eq!(aabb.min, Vec3::splat(5.0));
        assert_eq!(aabb.max, Vec3::splat(15.0));
    }

    #[test]
    fn test_union_encloses_both() {
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(5.0));
        let b = Aabb::new(Vec3::splat(3.0), Vec3::splat(10.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_corners_count_and_bounds() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let corners = aabb.corners();
        assert_eq!(corners.len(), 8);
        for c in corners {
            assert!(c.cmpge(aabb.min).all());
            assert!(c.cmple(aabb.max).all());
        }
    }

    #[test]
    fn test_transformed_by_translation() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.max, Vec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn test_transformed_by_rotation_stays_enclosing() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = aabb.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        // A 45° rotation widens the x/z footprint to sqrt(2).
        assert!(rotated.max.x > 1.0);
        assert!(rotated.max.x < 1.5);
        assert!((rotated.max.y - 1.0).abs() < 1e-6);
    }
}
