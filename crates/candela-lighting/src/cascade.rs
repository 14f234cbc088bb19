//! Cascade split and light-space matrix math for directional shadows.
//!
//! The view depth range is divided into [`CASCADE_COUNT`] slices whose
//! boundaries blend an exponential distribution with a linear one and then
//! snap to cluster-grid depth slices, so the shader picks a cascade with
//! the same arithmetic it uses to pick a cluster. Each slice gets a tight
//! texel-snapped orthographic projection in light space.

use glam::{Mat4, Vec3};

use crate::classify::SHADOW_BATCH_SIZE;

/// Cascades per directional light. Equals the shadow batch size so one
/// directional "batch" is exactly one cascade block of atlas tiles.
pub const CASCADE_COUNT: usize = SHADOW_BATCH_SIZE as usize;

/// Light-space projections for one directional light.
pub struct CascadeSet {
    /// Light view-projection per cascade, ready for culling and drawing.
    pub matrices: [Mat4; CASCADE_COUNT],
    /// World-space point on each cascade's near plane. Moment depth is
    /// measured from this plane along the light direction.
    pub origins: [Vec3; CASCADE_COUNT],
    /// Largest near-to-far extent across the cascades, the moment clear
    /// distance.
    pub range: f32,
}

/// Computes the `CASCADE_COUNT + 1` split depths partitioning
/// `[z_near, z_far]`.
///
/// Interior splits blend the exponential distribution with a linear one by
/// `linearity` (0 = fully exponential, 1 = fully linear), then snap to the
/// nearest cluster depth-slice boundary of a `grid_z`-slice grid.
pub fn cascade_splits(
    z_near: f32,
    z_far: f32,
    linearity: f32,
    grid_z: u32,
) -> [f32; CASCADE_COUNT + 1] {
    let mut splits = [z_near; CASCADE_COUNT + 1];
    splits[CASCADE_COUNT] = z_far;
    for (i, split) in splits.iter_mut().enumerate().take(CASCADE_COUNT).skip(1) {
        let t = i as f32 / CASCADE_COUNT as f32;
        let exponential = z_near * (z_far / z_near).powf(t);
        let linear = z_near + (z_far - z_near) * t;
        let blended = exponential + (linear - exponential) * linearity;
        *split = snap_to_depth_slice(blended.clamp(z_near, z_far), z_near, z_far, grid_z);
    }
    splits
}

/// Snaps a view depth to the nearest boundary of the exponential cluster
/// depth slicing `z = z_near * (z_far / z_near)^(slice / grid_z)`.
fn snap_to_depth_slice(z: f32, z_near: f32, z_far: f32, grid_z: u32) -> f32 {
    let log_ratio = (z_far / z_near).log2();
    let scale = grid_z as f32 / log_ratio;
    let bias = -(grid_z as f32) * z_near.log2() / log_ratio;
    let slice = (z.log2() * scale + bias).round();
    z_near * (z_far / z_near).powf(slice / grid_z as f32)
}

/// Fits one orthographic projection per cascade around the camera
/// sub-frusta, as seen along `light_dir`.
///
/// `inverse_view_projection` unprojects the camera's full reverse-Z NDC
/// cube; sub-frustum corners are interpolated along its edges from the
/// split depths. Extents snap to shadow-map texels so the projection
/// translates in whole-texel steps as the camera moves. `near_extension`
/// pulls each near plane toward the light so casters outside the slice
/// still land in the map.
pub fn fit_cascades(
    light_dir: Vec3,
    inverse_view_projection: &Mat4,
    splits: &[f32; CASCADE_COUNT + 1],
    near_extension: f32,
    resolution: u32,
) -> CascadeSet {
    // Full-frustum corners, near plane first. Reverse-Z puts the near
    // plane at NDC z = 1.
    let mut near_corners = [Vec3::ZERO; 4];
    let mut far_corners = [Vec3::ZERO; 4];
    for (i, (x, y)) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
        .into_iter()
        .enumerate()
    {
        near_corners[i] = unproject(inverse_view_projection, x, y, 1.0);
        far_corners[i] = unproject(inverse_view_projection, x, y, 0.0);
    }

    let depth_span = splits[CASCADE_COUNT] - splits[0];
    let up = if light_dir.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };

    let mut matrices = [Mat4::IDENTITY; CASCADE_COUNT];
    let mut origins = [Vec3::ZERO; CASCADE_COUNT];
    let mut range = 0.0f32;

    for cascade in 0..CASCADE_COUNT {
        let t_near = (splits[cascade] - splits[0]) / depth_span;
        let t_far = (splits[cascade + 1] - splits[0]) / depth_span;

        // Frustum edges are straight lines, so corners at a given view
        // depth interpolate linearly between the near and far corners.
        let mut corners = [Vec3::ZERO; 8];
        for edge in 0..4 {
            corners[edge] = near_corners[edge].lerp(far_corners[edge], t_near);
            corners[edge + 4] = near_corners[edge].lerp(far_corners[edge], t_far);
        }

        let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
        let light_view = Mat4::look_to_rh(center, light_dir, up);

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for corner in &corners {
            let light_space = light_view.transform_point3(*corner);
            min = min.min(light_space);
            max = max.max(light_space);
        }

        let texel_x = (max.x - min.x) / resolution as f32;
        let texel_y = (max.y - min.y) / resolution as f32;
        if texel_x > 0.0 {
            min.x = (min.x / texel_x).floor() * texel_x;
            max.x = (max.x / texel_x).ceil() * texel_x;
        }
        if texel_y > 0.0 {
            min.y = (min.y / texel_y).floor() * texel_y;
            max.y = (max.y / texel_y).ceil() * texel_y;
        }

        // Reverse-Z ortho: the extended near plane maps to depth 1, the
        // far extent to 0.
        let near_z = max.z + near_extension;
        let ortho = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -min.z, -near_z);

        matrices[cascade] = ortho * light_view;
        origins[cascade] = light_view
            .inverse()
            .transform_point3(Vec3::new(0.0, 0.0, near_z));
        range = range.max(near_z - min.z);
    }

    CascadeSet {
        matrices,
        origins,
        range,
    }
}

fn unproject(inverse_view_projection: &Mat4, x: f32, y: f32, z: f32) -> Vec3 {
    inverse_view_projection.project_point3(Vec3::new(x, y, z))
}
