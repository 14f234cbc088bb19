//! Packs classified lights into the GPU-resident frame buffers.
//!
//! Three streams come out of packing: fixed-size light records indexed by
//! `linear_index`, projection matrices indexed by `projection_index`, and
//! spot directions sharing the projection indexing. All three are rebuilt
//! from scratch each frame and uploaded through grow-only buffers.

use bytemuck::{Pod, Zeroable};
use candela_render::GrowableBuffer;
use candela_scene::{LightType, SceneStore};
use glam::{Mat4, Vec4};
use static_assertions::const_assert_eq;

use crate::cascade::{CASCADE_COUNT, CascadeSet};
use crate::classify::{LightView, NONE_INDEX};

/// Near plane of spot shadow projections, world units.
pub const SPOT_Z_NEAR: f32 = 0.1;

/// One light as the shaders see it.
///
/// `position.xyz` is the world position for point and spot lights and the
/// forward direction for directional lights; `position.w` is the influence
/// radius or the cascade depth range.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub color: [f32; 4],
    pub position: [f32; 4],
    pub shadowmap_index: u32,
    pub projection_index: u32,
    pub cookie_index: u32,
    pub light_type: u32,
}

const_assert_eq!(std::mem::size_of::<GpuLight>(), 48);

impl GpuLight {
    /// The record written after the last light. Shader loops stop at the
    /// first record whose type reads as the sentinel.
    pub fn terminator() -> Self {
        Self {
            color: [0.0; 4],
            position: [0.0; 4],
            shadowmap_index: NONE_INDEX,
            projection_index: NONE_INDEX,
            cookie_index: NONE_INDEX,
            light_type: NONE_INDEX,
        }
    }
}

/// CPU staging for one frame's packed light data.
pub struct PackedFrame {
    /// `visible_count + 1` records, terminator last.
    pub records: Vec<GpuLight>,
    /// Projection matrices, one per spot slot and [`CASCADE_COUNT`] per
    /// directional block. Unwritten slots stay identity.
    pub matrices: Vec<Mat4>,
    /// Spot forward directions, `w` = full cone angle in radians. Only
    /// spot slots are written.
    pub directions: Vec<Vec4>,
}

/// Packs sorted, classified views into staging vectors.
///
/// `cascades` runs parallel to `views` and carries the fitted cascade set
/// of each directional light. Records land at `linear_index`, matrices and
/// directions at `projection_index`; projection slots not owned by any
/// visible light keep their defaults.
pub fn pack_frame(
    store: &SceneStore,
    views: &[LightView],
    cascades: &[Option<CascadeSet>],
    projection_count: u32,
) -> PackedFrame {
    assert_eq!(views.len(), cascades.len(), "one cascade slot per view");

    let mut records = vec![GpuLight::terminator(); views.len() + 1];
    let mut matrices = vec![Mat4::IDENTITY; projection_count as usize];
    let mut directions = vec![Vec4::ZERO; projection_count as usize];

    for (view, cascade_set) in views.iter().zip(cascades) {
        let transform = store.transform(view.handle);
        let slot = view.projection_index as usize;

        let position = match view.light_type {
            LightType::Point => transform.position.extend(view.radius),
            LightType::Spot => {
                let angle = view.angle.to_radians();
                matrices[slot] = Mat4::perspective_rh(angle, 1.0, view.radius, SPOT_Z_NEAR)
                    * transform.world_to_local();
                directions[slot] = transform.forward().extend(angle);
                transform.position.extend(view.radius)
            }
            LightType::Directional => {
                let range = match cascade_set {
                    Some(set) => {
                        matrices[slot..slot + CASCADE_COUNT].copy_from_slice(&set.matrices);
                        set.range
                    }
                    None => 0.0,
                };
                transform.forward().extend(range)
            }
        };

        records[view.linear_index as usize] = GpuLight {
            color: view.color.to_array(),
            position: position.to_array(),
            shadowmap_index: view.shadowmap_index,
            projection_index: view.projection_index,
            cookie_index: view.cookie_index,
            light_type: view.light_type.as_u32(),
        };
    }

    PackedFrame {
        records,
        matrices,
        directions,
    }
}

/// The GPU side of the packed frame: grow-only storage buffers for
/// records, matrices, and directions.
pub struct LightBuffers {
    pub lights: GrowableBuffer,
    pub matrices: GrowableBuffer,
    pub directions: GrowableBuffer,
}

impl LightBuffers {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            lights: GrowableBuffer::new(device, "light-records", wgpu::BufferUsages::STORAGE, 4096),
            matrices: GrowableBuffer::new(
                device,
                "light-matrices",
                wgpu::BufferUsages::STORAGE,
                4096,
            ),
            directions: GrowableBuffer::new(
                device,
                "light-directions",
                wgpu::BufferUsages::STORAGE,
                1024,
            ),
        }
    }

    /// Uploads the frame's staging vectors, growing buffers as needed.
    /// Matrices and directions are flattened because the math types carry
    /// no byte-cast guarantee.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &PackedFrame) {
        self.lights
            .write(device, queue, bytemuck::cast_slice(&frame.records));

        let matrix_data: Vec<f32> = frame
            .matrices
            .iter()
            .flat_map(|m| m.to_cols_array())
            .collect();
        self.matrices
            .write(device, queue, bytemuck::cast_slice(&matrix_data));

        let direction_data: Vec<f32> = frame
            .directions
            .iter()
            .flat_map(|d| d.to_array())
            .collect();
        self.directions
            .write(device, queue, bytemuck::cast_slice(&direction_data));
    }
}
