//! Drives the cluster compute passes and owns their GPU resources.
//!
//! The cluster grid is fixed at 16x9 screen tiles by 24 exponential depth
//! slices. Each frame the cursor is zeroed and the depth tiles reset, the
//! depth reduction collapses the camera depth buffer into per-tile min/max
//! bounds, and the assignment kernel culls the packed light records against
//! every cluster, emitting a compact index list plus one packed
//! (offset, count) word per cluster.

use candela_render::{
    CLUSTER_MAX_LIGHTS_PER_TILE, ClusterParams, ClusterPipelines, GrowableBuffer,
    depth_reduce_groups,
};
use glam::Mat4;

use crate::packer::LightBuffers;

/// Cluster grid dimensions: screen tiles in x and y, depth slices in z.
pub const CLUSTER_GRID: [u32; 3] = [16, 9, 24];

/// Reverse-Z far-plane depth bits; the initial per-tile minimum.
const DEPTH_TILE_MIN_INIT: u32 = f32::to_bits(1.0);

const CLUSTER_COUNT: u32 = CLUSTER_GRID[0] * CLUSTER_GRID[1] * CLUSTER_GRID[2];
const DEPTH_TILE_COUNT: u32 = CLUSTER_GRID[0] * CLUSTER_GRID[1];

/// Per-frame camera inputs for the cluster passes.
pub struct ClusterFrame {
    pub view: Mat4,
    pub projection: Mat4,
    pub z_near: f32,
    pub z_far: f32,
    /// Camera target size in pixels.
    pub screen: (f32, f32),
    /// Number of packed light records, excluding the terminator.
    pub light_count: u32,
}

/// GPU resources and dispatch logic for clustered light assignment.
pub struct ClusterDriver {
    pipelines: ClusterPipelines,
    params: GrowableBuffer,
    depth_tiles: wgpu::Buffer,
    index_list: wgpu::Buffer,
    cursor: wgpu::Buffer,
    light_tiles: wgpu::Texture,
    light_tiles_view: wgpu::TextureView,
    z_cull_lights: bool,
}

impl ClusterDriver {
    pub fn new(
        device: &wgpu::Device,
        depth_shader: &wgpu::ShaderModule,
        assign_shader: &wgpu::ShaderModule,
        z_cull_lights: bool,
    ) -> Self {
        let depth_tiles = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster-depth-tiles"),
            size: (DEPTH_TILE_COUNT * 2 * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let index_list = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster-index-list"),
            size: (CLUSTER_COUNT * CLUSTER_MAX_LIGHTS_PER_TILE * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let cursor = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster-cursor"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let light_tiles = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("cluster-light-tiles"),
            size: wgpu::Extent3d {
                width: CLUSTER_GRID[0],
                height: CLUSTER_GRID[1],
                depth_or_array_layers: CLUSTER_GRID[2],
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R32Uint,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let light_tiles_view = light_tiles.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            pipelines: ClusterPipelines::new(device, depth_shader, assign_shader),
            params: GrowableBuffer::new(
                device,
                "cluster-params",
                wgpu::BufferUsages::UNIFORM,
                std::mem::size_of::<ClusterParams>() as u64,
            ),
            depth_tiles,
            index_list,
            cursor,
            light_tiles,
            light_tiles_view,
            z_cull_lights,
        }
    }

    /// The per-cluster (offset, count) texture sampled by the lighting
    /// shaders.
    pub fn light_tiles(&self) -> &wgpu::TextureView {
        &self.light_tiles_view
    }

    /// The flat light index list the packed cluster words point into.
    pub fn index_list(&self) -> &wgpu::Buffer {
        &self.index_list
    }

    /// Uploads the frame params and resets the cursor and depth tiles.
    /// Must run before [`encode`](Self::encode) each frame.
    pub fn begin_frame(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, frame: &ClusterFrame) {
        let params = ClusterParams::new(
            frame.view,
            frame.projection,
            CLUSTER_GRID,
            frame.light_count,
            frame.z_near,
            frame.z_far,
            self.z_cull_lights,
            frame.screen,
        );
        self.params
            .write(device, queue, bytemuck::cast_slice(&[params]));

        queue.write_buffer(&self.cursor, 0, bytemuck::cast_slice(&[0u32]));

        let mut tiles = Vec::with_capacity(DEPTH_TILE_COUNT as usize * 2);
        for _ in 0..DEPTH_TILE_COUNT {
            tiles.push(DEPTH_TILE_MIN_INIT);
            tiles.push(0u32);
        }
        queue.write_buffer(&self.depth_tiles, 0, bytemuck::cast_slice(&tiles));
    }

    /// Encodes the depth reduction (when a camera depth view is supplied)
    /// and the cluster assignment dispatch.
    pub fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        lights: &LightBuffers,
        camera_depth: Option<&wgpu::TextureView>,
        depth_size: (u32, u32),
    ) {
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cluster-params-bg"),
            layout: &self.pipelines.params_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: self.params.buffer().as_entire_binding(),
            }],
        });

        if let Some(depth_view) = camera_depth {
            let depth_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("cluster-depth-bg"),
                layout: &self.pipelines.depth_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(depth_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.depth_tiles.as_entire_binding(),
                    },
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cluster-depth-reduce"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.depth_reduce);
            pass.set_bind_group(0, &params_bind_group, &[]);
            pass.set_bind_group(1, &depth_bind_group, &[]);
            let (x, y) = depth_reduce_groups(depth_size.0, depth_size.1);
            pass.dispatch_workgroups(x, y, 1);
        }

        let assign_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cluster-assign-bg"),
            layout: &self.pipelines.assign_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lights.lights.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.index_list.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.cursor.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.light_tiles_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.depth_tiles.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("cluster-assign"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines.assign);
        pass.set_bind_group(0, &params_bind_group, &[]);
        pass.set_bind_group(1, &assign_bind_group, &[]);
        // One workgroup covers a full 16x9 depth slice.
        pass.dispatch_workgroups(1, 1, CLUSTER_GRID[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candela_render::{CLUSTER_ASSIGN_SHADER_SOURCE, CLUSTER_DEPTH_SHADER_SOURCE};
    use glam::Vec3;

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

    fn make_driver(device: &wgpu::Device, z_cull: bool) -> ClusterDriver {
        let depth_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cluster-depth-shader"),
            source: wgpu::ShaderSource::Wgsl(CLUSTER_DEPTH_SHADER_SOURCE.into()),
        });
        let assign_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cluster-assign-shader"),
            source: wgpu::ShaderSource::Wgsl(CLUSTER_ASSIGN_SHADER_SOURCE.into()),
        });
        ClusterDriver::new(device, &depth_shader, &assign_shader, z_cull)
    }

    fn test_frame(light_count: u32) -> ClusterFrame {
        ClusterFrame {
            view: Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y),
            projection: Mat4::perspective_rh(1.0, 16.0 / 9.0, 200.0, 0.1),
            z_near: 0.1,
            z_far: 200.0,
            screen: (1920.0, 1080.0),
            light_count,
        }
    }

    #[test]
    fn test_cluster_grid_matches_workgroup_shape() {
        // The assign kernel's workgroup is one full xy slice.
        assert_eq!(CLUSTER_GRID[0], 16);
        assert_eq!(CLUSTER_GRID[1], 9);
        assert_eq!(CLUSTER_COUNT, 16 * 9 * 24);
    }

    #[test]
    fn test_depth_tile_min_init_is_reverse_z_near() {
        assert_eq!(DEPTH_TILE_MIN_INIT, 0x3F80_0000);
    }

    #[test]
    fn test_driver_buffer_sizes() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let driver = make_driver(&device, true);
        assert_eq!(driver.depth_tiles.size(), (16 * 9 * 2 * 4) as u64);
        assert_eq!(
            driver.index_list.size(),
            (CLUSTER_COUNT * CLUSTER_MAX_LIGHTS_PER_TILE * 4) as u64
        );
        assert_eq!(driver.cursor.size(), 4);
        assert_eq!(driver.light_tiles.dimension(), wgpu::TextureDimension::D3);
    }

    #[test]
    fn test_encode_without_depth_view_skips_reduction() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut driver = make_driver(&device, false);
        let mut lights = LightBuffers::new(&device);
        let empty = crate::packer::pack_frame(&candela_scene::SceneStore::new(), &[], &[], 0);
        lights.upload(&device, &queue, &empty);

        driver.begin_frame(&device, &queue, &test_frame(0));
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        driver.encode(&device, &mut encoder, &lights, None, (1920, 1080));
        queue.submit([encoder.finish()]);
    }

    #[test]
    fn test_encode_with_depth_view_runs_both_passes() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut driver = make_driver(&device, true);
        let mut lights = LightBuffers::new(&device);
        let empty = crate::packer::pack_frame(&candela_scene::SceneStore::new(), &[], &[], 0);
        lights.upload(&device, &queue, &empty);

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("camera-depth"),
            size: wgpu::Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        driver.begin_frame(&device, &queue, &test_frame(0));
        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        driver.encode(&device, &mut encoder, &lights, Some(&depth_view), (64, 64));
        queue.submit([encoder.finish()]);
    }
}
