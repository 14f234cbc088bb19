//! Moment-output render pipeline for shadow map generation.
//!
//! Renders shadow casters from each clip's point of view into a two-channel
//! moment target (distance and squared distance). Positional lights measure
//! radial distance from the light origin; directional cascades measure planar
//! distance along the light axis.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::buffer::VertexPosition;
use crate::targets::{MOMENT_FORMAT, SHADOW_DEPTH_FORMAT};

/// WGSL shader source for shadow moment rendering.
///
/// Model matrices are indexed by the instance index, so casters batched into
/// one instanced draw read consecutive transforms.
pub const SHADOW_SHADER_SOURCE: &str = r#"
struct ClipUniform {
    view_proj: mat4x4<f32>,
    origin: vec4<f32>,
    direction: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> clip: ClipUniform;

@group(1) @binding(0)
var<storage, read> models: array<mat4x4<f32>>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
};

@vertex
fn vs_shadow(
    @location(0) position: vec3<f32>,
    @builtin(instance_index) instance: u32,
) -> VertexOutput {
    let world = models[instance] * vec4<f32>(position, 1.0);
    var out: VertexOutput;
    out.position = clip.view_proj * world;
    out.world_pos = world.xyz;
    return out;
}

@fragment
fn fs_moments(in: VertexOutput) -> @location(0) vec2<f32> {
    let d = min(length(in.world_pos - clip.origin.xyz), clip.origin.w);
    return vec2<f32>(d, d * d);
}

@fragment
fn fs_moments_planar(in: VertexOutput) -> @location(0) vec2<f32> {
    let d = clamp(dot(in.world_pos - clip.origin.xyz, clip.direction.xyz), 0.0, clip.origin.w);
    return vec2<f32>(d, d * d);
}
"#;

/// Per-clip uniform: projection, light origin, and light axis.
///
/// `origin.w` carries the far distance used to clamp moments, matching the
/// clear value of the moment target.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowClipParams {
    pub view_proj: [[f32; 4]; 4],
    pub origin: [f32; 4],
    pub direction: [f32; 4],
}

impl ShadowClipParams {
    /// Build params for one clip.
    pub fn new(view_proj: Mat4, origin: Vec3, max_distance: f32, direction: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            origin: [origin.x, origin.y, origin.z, max_distance],
            direction: [direction.x, direction.y, direction.z, 0.0],
        }
    }
}

/// Moment-output pipelines for rendering shadow maps.
pub struct ShadowPipeline {
    /// Radial distance moments, for point and spot clips.
    pub positional: wgpu::RenderPipeline,
    /// Planar distance moments, for directional cascades.
    pub planar: wgpu::RenderPipeline,
    /// Clip uniform bind group layout (group 0).
    pub clip_bind_group_layout: wgpu::BindGroupLayout,
    /// Model matrix storage bind group layout (group 1).
    pub model_bind_group_layout: wgpu::BindGroupLayout,
}

impl ShadowPipeline {
    /// Create the shadow moment pipelines.
    pub fn new(device: &wgpu::Device, shader: &wgpu::ShaderModule) -> Self {
        let clip_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shadow-clip-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<ShadowClipParams>() as u64
                        ),
                    },
                    count: None,
                }],
            });

        let model_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shadow-model-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(64), // one mat4x4<f32>
                    },
                    count: None,
                }],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&clip_bind_group_layout, &model_bind_group_layout],
            immediate_size: 0,
        });

        let positional = create_moment_pipeline(
            device,
            shader,
            &pipeline_layout,
            "fs_moments",
            "shadow-moments-pipeline",
        );
        let planar = create_moment_pipeline(
            device,
            shader,
            &pipeline_layout,
            "fs_moments_planar",
            "shadow-moments-planar-pipeline",
        );

        Self {
            positional,
            planar,
            clip_bind_group_layout,
            model_bind_group_layout,
        }
    }

    /// Create a bind group for one clip's uniform buffer.
    pub fn clip_bind_group(&self, device: &wgpu::Device, buffer: &wgpu::Buffer) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-clip-bg"),
            layout: &self.clip_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Create a bind group for the per-frame model matrix buffer.
    pub fn model_bind_group(
        &self,
        device: &wgpu::Device,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-model-bg"),
            layout: &self.model_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }
}

fn create_moment_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment_entry: &str,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_shadow"),
            buffers: &[VertexPosition::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Front), // front-face culling reduces acne
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: SHADOW_DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::GreaterEqual, // reverse-Z
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 1.75,
                clamp: 0.0,
            },
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: MOMENT_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
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
    fn test_clip_params_layout() {
        assert_eq!(std::mem::size_of::<ShadowClipParams>(), 96);
    }

    #[test]
    fn test_clip_params_packs_max_distance() {
        let params = ShadowClipParams::new(Mat4::IDENTITY, Vec3::ONE, 50.0, Vec3::NEG_Z);
        assert_eq!(params.origin[3], 50.0);
        assert_eq!(params.direction[2], -1.0);
    }

    #[test]
    fn test_shadow_pipeline_creation() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_SHADER_SOURCE.into()),
        });
        let pipeline = ShadowPipeline::new(&device, &shader);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("clip-uniform"),
            size: std::mem::size_of::<ShadowClipParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let _ = pipeline.clip_bind_group(&device, &buffer);
    }
}
