//! Frustum plane extraction and world-space AABB visibility tests.

use candela_scene::Aabb;
use glam::{Mat4, Vec3, Vec4};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// A view frustum defined by six inward-pointing planes extracted from
/// a view-projection matrix.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    /// Each `Vec4(a, b, c, d)` where `(a,b,c)` is the normalized inward
    /// normal and `d` is the signed distance term.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix
    /// using the Griggs-Hartmann method.
    ///
    /// Works with both perspective and orthographic projections,
    /// including reverse-Z.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // With reverse-Z (near→z=1, far→z=0), the standard Griggs-Hartmann
        // row3±row2 encodes the near clip plane but not the far clip plane
        // correctly. Use row2 directly for the geometric far plane and
        // row3+row2 for the geometric near plane.
        planes[NEAR] = rows[3] + rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Uses the p-vertex (positive vertex) method: for each plane, find
    /// the corner of the AABB furthest along the plane normal. If that
    /// corner is behind the plane, the entire AABB is outside.
    ///
    /// This is conservative. It may return `true` for some AABBs that
    /// are fully outside (false positives near frustum corners), but
    /// never returns `false` for visible objects.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();
            let d = plane.w;

            // Positive vertex: the corner furthest along the plane normal.
            let p = Vec3::new(
                if normal.x >= 0.0 {
                    aabb.max.x
                } else {
                    aabb.min.x
                },
                if normal.y >= 0.0 {
                    aabb.max.y
                } else {
                    aabb.min.y
                },
                if normal.z >= 0.0 {
                    aabb.max.z
                } else {
                    aabb.min.z
                },
            );

            if normal.dot(p) + d < 0.0 {
                return false;
            }
        }
        true
    }

    /// Signed distance of a point from the near plane, in world units.
    /// Positive values are inside the frustum. Used as the depth metric
    /// for front-to-back draw ordering.
    pub fn near_distance(&self, point: Vec3) -> f32 {
        let plane = self.planes[NEAR];
        plane.truncate().dot(point) + plane.w
    }
}
