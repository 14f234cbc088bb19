//! Compute pipelines for clustered light assignment.
//!
//! Two kernels run after the shadow passes: a depth reduction that collects
//! per-tile min/max scene depth from the camera depth buffer, and the cluster
//! assignment that culls every visible light against each cluster's view-space
//! bounds and writes a packed (offset, count) word per cluster.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Threads per axis for the depth reduction workgroup.
pub const DEPTH_TILE_GROUP_SIZE: u32 = 16;

/// Upper bound on lights referenced by a single cluster.
pub const CLUSTER_MAX_LIGHTS_PER_TILE: u32 = 64;

/// Pack a cluster's index-list offset and light count into one u32.
pub fn pack_tile_entry(offset: u32, count: u32) -> u32 {
    (offset << 8) | (count & 0xFF)
}

/// Extract the index-list offset from a packed cluster word.
pub fn tile_entry_offset(entry: u32) -> u32 {
    entry >> 8
}

/// Extract the light count from a packed cluster word.
pub fn tile_entry_count(entry: u32) -> u32 {
    entry & 0xFF
}

/// WGSL shader source for the per-tile depth reduction kernel.
pub const CLUSTER_DEPTH_SHADER_SOURCE: &str = r#"
struct ClusterParams {
    view: mat4x4<f32>,
    inv_projection: mat4x4<f32>,
    grid: vec4<u32>,
    z_params: vec4<f32>,
    flags: vec4<u32>,
    screen: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: ClusterParams;
@group(1) @binding(0) var depth_tex: texture_depth_2d;
@group(1) @binding(1) var<storage, read_write> depth_tiles: array<atomic<u32>>;

@compute @workgroup_size(16, 16, 1)
fn cs_depth_reduce(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(depth_tex);
    if (gid.x >= dims.x || gid.y >= dims.y) {
        return;
    }
    let d = textureLoad(depth_tex, vec2<i32>(gid.xy), 0);
    // Reverse-Z: depth 0 is far plane / empty sky, skip it.
    if (d <= 0.0) {
        return;
    }
    let tile = gid.xy * vec2(params.grid.x, params.grid.y) / dims;
    let idx = (tile.y * params.grid.x + tile.x) * 2u;
    let bits = bitcast<u32>(d);
    atomicMin(&depth_tiles[idx], bits);
    atomicMax(&depth_tiles[idx + 1u], bits);
}
"#;

/// WGSL shader source for the cluster light assignment kernel.
///
/// The workgroup covers one full depth slice of the 16x9 cluster grid, so
/// the dispatch is `(1, 1, grid_z)`.
pub const CLUSTER_ASSIGN_SHADER_SOURCE: &str = r#"
struct ClusterParams {
    view: mat4x4<f32>,
    inv_projection: mat4x4<f32>,
    grid: vec4<u32>,
    z_params: vec4<f32>,
    flags: vec4<u32>,
    screen: vec4<f32>,
};

struct GpuLight {
    color: vec4<f32>,
    position: vec4<f32>,
    indices: vec4<u32>,
};

const LIGHT_TYPE_DIRECTIONAL = 2u;
const MAX_LIGHTS_PER_TILE = 64u;

@group(0) @binding(0) var<uniform> params: ClusterParams;
@group(1) @binding(0) var<storage, read> lights: array<GpuLight>;
@group(1) @binding(1) var<storage, read_write> light_index_list: array<u32>;
@group(1) @binding(2) var<storage, read_write> cursor: atomic<u32>;
@group(1) @binding(3) var light_tiles: texture_storage_3d<r32uint, write>;
@group(1) @binding(4) var<storage, read> depth_tiles: array<vec2<u32>>;

// Reverse-Z: depth 1 is the near plane, 0 is far.
fn linearize(d: f32) -> f32 {
    let znear = params.z_params.x;
    let zfar = params.z_params.y;
    return (znear * zfar) / mix(znear, zfar, d);
}

fn tile_corner_ray(ndc_xy: vec2<f32>) -> vec3<f32> {
    // Unproject at the near plane and return a view-space ray through the corner.
    let p = params.inv_projection * vec4<f32>(ndc_xy, 1.0, 1.0);
    return p.xyz / p.w;
}

@compute @workgroup_size(16, 9, 1)
fn cs_assign_lights(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.grid.x || gid.y >= params.grid.y || gid.z >= params.grid.z) {
        return;
    }

    let znear = params.z_params.x;
    let zfar = params.z_params.y;
    let slice = f32(gid.z) / f32(params.grid.z);
    let slice_next = f32(gid.z + 1u) / f32(params.grid.z);
    let z0 = znear * pow(zfar / znear, slice);
    let z1 = znear * pow(zfar / znear, slice_next);

    let cluster = vec3<i32>(gid);

    if (params.flags.x != 0u) {
        let tile = depth_tiles[gid.y * params.grid.x + gid.x];
        if (tile.y == 0u) {
            textureStore(light_tiles, cluster, vec4<u32>(0u));
            return;
        }
        let tile_near = linearize(bitcast<f32>(tile.y));
        let tile_far = linearize(bitcast<f32>(tile.x));
        if (z0 > tile_far || z1 < tile_near) {
            textureStore(light_tiles, cluster, vec4<u32>(0u));
            return;
        }
    }

    // View-space AABB of the cluster: tile corner rays scaled to both slice depths.
    let gx = f32(params.grid.x);
    let gy = f32(params.grid.y);
    let ndc_min = vec2<f32>(2.0 * f32(gid.x) / gx - 1.0, 1.0 - 2.0 * f32(gid.y + 1u) / gy);
    let ndc_max = vec2<f32>(2.0 * f32(gid.x + 1u) / gx - 1.0, 1.0 - 2.0 * f32(gid.y) / gy);

    var aabb_min = vec3<f32>(1.0e30);
    var aabb_max = vec3<f32>(-1.0e30);
    for (var i = 0u; i < 4u; i++) {
        let corner = vec2<f32>(
            select(ndc_min.x, ndc_max.x, (i & 1u) != 0u),
            select(ndc_min.y, ndc_max.y, (i & 2u) != 0u),
        );
        let ray = tile_corner_ray(corner);
        let near_pt = ray * (z0 / znear);
        let far_pt = ray * (z1 / znear);
        aabb_min = min(aabb_min, min(near_pt, far_pt));
        aabb_max = max(aabb_max, max(near_pt, far_pt));
    }

    var local_list: array<u32, MAX_LIGHTS_PER_TILE>;
    var count = 0u;
    let light_count = params.grid.w;
    for (var i = 0u; i < light_count && count < MAX_LIGHTS_PER_TILE; i++) {
        let light = lights[i];
        if (light.indices.w == LIGHT_TYPE_DIRECTIONAL) {
            local_list[count] = i;
            count += 1u;
            continue;
        }
        let view_pos = (params.view * vec4<f32>(light.position.xyz, 1.0)).xyz;
        let radius = light.position.w;
        let closest = clamp(view_pos, aabb_min, aabb_max);
        let delta = closest - view_pos;
        if (dot(delta, delta) <= radius * radius) {
            local_list[count] = i;
            count += 1u;
        }
    }

    if (count == 0u) {
        textureStore(light_tiles, cluster, vec4<u32>(0u));
        return;
    }

    let offset = atomicAdd(&cursor, count);
    for (var i = 0u; i < count; i++) {
        light_index_list[offset + i] = local_list[i];
    }
    textureStore(light_tiles, cluster, vec4<u32>((offset << 8u) | count));
}
"#;

/// GPU uniform shared by both cluster kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ClusterParams {
    pub view: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    /// Grid dimensions in xyz, visible light count in w.
    pub grid: [u32; 4],
    /// znear, zfar, log slice scale, log slice bias.
    pub z_params: [f32; 4],
    /// x: nonzero when depth-tile culling is enabled.
    pub flags: [u32; 4],
    /// Camera target width and height in pixels.
    pub screen: [f32; 4],
}

impl ClusterParams {
    /// Assemble params for one frame.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        view: Mat4,
        projection: Mat4,
        grid: [u32; 3],
        light_count: u32,
        z_near: f32,
        z_far: f32,
        depth_cull: bool,
        screen: (f32, f32),
    ) -> Self {
        let log_ratio = (z_far / z_near).log2();
        let scale = grid[2] as f32 / log_ratio;
        let bias = -(grid[2] as f32 * z_near.log2() / log_ratio);
        Self {
            view: view.to_cols_array_2d(),
            inv_projection: projection.inverse().to_cols_array_2d(),
            grid: [grid[0], grid[1], grid[2], light_count],
            z_params: [z_near, z_far, scale, bias],
            flags: [u32::from(depth_cull), 0, 0, 0],
            screen: [screen.0, screen.1, 0.0, 0.0],
        }
    }
}

/// Compute pipelines for depth reduction and cluster light assignment.
pub struct ClusterPipelines {
    pub depth_reduce: wgpu::ComputePipeline,
    pub assign: wgpu::ComputePipeline,
    pub params_bind_group_layout: wgpu::BindGroupLayout,
    pub depth_bind_group_layout: wgpu::BindGroupLayout,
    pub assign_bind_group_layout: wgpu::BindGroupLayout,
}

impl ClusterPipelines {
    /// Create both cluster compute pipelines from their shader modules.
    pub fn new(
        device: &wgpu::Device,
        depth_shader: &wgpu::ShaderModule,
        assign_shader: &wgpu::ShaderModule,
    ) -> Self {
        let params_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("cluster-params-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<ClusterParams>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let depth_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("cluster-depth-bgl"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    storage_entry(1, false),
                ],
            });

        let assign_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("cluster-assign-bgl"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, false),
                    storage_entry(2, false),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::R32Uint,
                            view_dimension: wgpu::TextureViewDimension::D3,
                        },
                        count: None,
                    },
                    storage_entry(4, true),
                ],
            });

        let depth_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cluster-depth-layout"),
            bind_group_layouts: &[&params_bind_group_layout, &depth_bind_group_layout],
            immediate_size: 0,
        });

        let assign_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cluster-assign-layout"),
            bind_group_layouts: &[&params_bind_group_layout, &assign_bind_group_layout],
            immediate_size: 0,
        });

        let depth_reduce = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cluster-depth-reduce"),
            layout: Some(&depth_layout),
            module: depth_shader,
            entry_point: Some("cs_depth_reduce"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let assign = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cluster-assign"),
            layout: Some(&assign_layout),
            module: assign_shader,
            entry_point: Some("cs_assign_lights"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Self {
            depth_reduce,
            assign,
            params_bind_group_layout,
            depth_bind_group_layout,
            assign_bind_group_layout,
        }
    }
}

/// Workgroup counts for the depth reduction over a `width` x `height` target.
pub fn depth_reduce_groups(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(DEPTH_TILE_GROUP_SIZE),
        height.div_ceil(DEPTH_TILE_GROUP_SIZE),
    )
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    #[test]
    fn test_tile_entry_round_trips() {
        let entry = pack_tile_entry(1234, 17);
        assert_eq!(tile_entry_offset(entry), 1234);
        assert_eq!(tile_entry_count(entry), 17);
    }

    #[test]
    fn test_tile_entry_count_is_masked() {
        let entry = pack_tile_entry(0, 0x1FF);
        assert_eq!(tile_entry_count(entry), 0xFF);
    }

    #[test]
    fn test_depth_reduce_group_counts() {
        assert_eq!(depth_reduce_groups(1920, 1080), (120, 68));
        assert_eq!(depth_reduce_groups(1, 1), (1, 1));
        assert_eq!(depth_reduce_groups(16, 16), (1, 1));
    }

    #[test]
    fn test_cluster_params_layout() {
        assert_eq!(std::mem::size_of::<ClusterParams>(), 192);
    }

    #[test]
    fn test_cluster_params_slice_scale() {
        let params = ClusterParams::new(
            Mat4::IDENTITY,
            Mat4::perspective_rh(1.0, 16.0 / 9.0, 200.0, 0.1),
            [16, 9, 24],
            5,
            0.1,
            200.0,
            true,
            (1920.0, 1080.0),
        );
        assert_eq!(params.grid, [16, 9, 24, 5]);
        // scale * log2(zfar/znear) must span the full grid depth.
        let log_ratio = (200.0f32 / 0.1).log2();
        assert!((params.z_params[2] * log_ratio - 24.0).abs() < 0.001);
        assert_eq!(params.flags[0], 1);
    }

    #[test]
    fn test_cluster_pipeline_creation() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let depth_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cluster-depth-shader"),
            source: wgpu::ShaderSource::Wgsl(CLUSTER_DEPTH_SHADER_SOURCE.into()),
        });
        let assign_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cluster-assign-shader"),
            source: wgpu::ShaderSource::Wgsl(CLUSTER_ASSIGN_SHADER_SOURCE.into()),
        });
        let _ = ClusterPipelines::new(&device, &depth_shader, &assign_shader);
    }
}
