//! Separable two-pass blur for shadow moment maps.
//!
//! Variance shadows need prefiltered moments, so every rendered clip is
//! blurred horizontally into a scratch atlas layer and then vertically into
//! its final tile. The blur radius is driven per light so hard and soft
//! shadows can coexist in one atlas. Point lights run a cube variant of the
//! horizontal pass that folds their six faces into one octahedral tile.

use bytemuck::{Pod, Zeroable};

use crate::targets::MOMENT_FORMAT;

/// 9-tap Gaussian weights for sigma ≈ 1.5 (normalized, symmetric half).
pub const GAUSSIAN_WEIGHTS: [f32; 5] = [
    0.227_027_03,
    0.194_594_6,
    0.121_621_62,
    0.054_054_055,
    0.016_216_216,
];

/// WGSL shader source for both blur directions.
pub const BLUR_SHADER_SOURCE: &str = r#"
struct BlurParams {
    radius: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: BlurParams;
@group(1) @binding(0) var input_tex: texture_2d<f32>;
@group(1) @binding(1) var input_sampler: sampler;

const WEIGHTS = array<f32, 5>(0.2270270270, 0.1945945946, 0.1216216216, 0.0540540541, 0.0162162162);

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn blur_axis(uv: vec2<f32>, axis: vec2<f32>) -> vec2<f32> {
    let dims = vec2<f32>(textureDimensions(input_tex));
    let texel = (params.radius / dims) * axis;
    var moments = textureSample(input_tex, input_sampler, uv).rg * WEIGHTS[0];
    for (var i = 1; i < 5; i++) {
        let offset = texel * f32(i);
        moments += textureSample(input_tex, input_sampler, uv + offset).rg * WEIGHTS[i];
        moments += textureSample(input_tex, input_sampler, uv - offset).rg * WEIGHTS[i];
    }
    return moments;
}

@fragment
fn fs_blur_h(in: VertexOutput) -> @location(0) vec2<f32> {
    return blur_axis(in.uv, vec2<f32>(1.0, 0.0));
}

@fragment
fn fs_blur_v(in: VertexOutput) -> @location(0) vec2<f32> {
    return blur_axis(in.uv, vec2<f32>(0.0, 1.0));
}
"#;

/// WGSL shader source for the cube-face horizontal blur.
///
/// Reads the six face layers of a point-light scene target and writes one
/// octahedrally mapped 2D tile, applying the horizontal taps in octahedral
/// space. The vertical pass then treats the result like any other tile.
pub const BLUR_CUBE_SHADER_SOURCE: &str = r#"
struct BlurParams {
    radius: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: BlurParams;
@group(1) @binding(0) var input_tex: texture_2d_array<f32>;
@group(1) @binding(1) var input_sampler: sampler;

const WEIGHTS = array<f32, 5>(0.2270270270, 0.1945945946, 0.1216216216, 0.0540540541, 0.0162162162);

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn oct_decode(uv: vec2<f32>) -> vec3<f32> {
    let f = uv * 2.0 - 1.0;
    var n = vec3<f32>(f.x, f.y, 1.0 - abs(f.x) - abs(f.y));
    let t = clamp(-n.z, 0.0, 1.0);
    n.x += select(t, -t, n.x >= 0.0);
    n.y += select(t, -t, n.y >= 0.0);
    return normalize(n);
}

fn sample_cube(dir: vec3<f32>) -> vec2<f32> {
    let ad = abs(dir);
    var layer = 0;
    var sc = 0.0;
    var tc = 0.0;
    var ma = 0.0;
    if (ad.x >= ad.y && ad.x >= ad.z) {
        ma = ad.x;
        if (dir.x > 0.0) {
            layer = 0; sc = -dir.z; tc = -dir.y;
        } else {
            layer = 1; sc = dir.z; tc = -dir.y;
        }
    } else if (ad.y >= ad.z) {
        ma = ad.y;
        if (dir.y > 0.0) {
            layer = 2; sc = dir.x; tc = dir.z;
        } else {
            layer = 3; sc = dir.x; tc = -dir.z;
        }
    } else {
        ma = ad.z;
        if (dir.z > 0.0) {
            layer = 4; sc = dir.x; tc = -dir.y;
        } else {
            layer = 5; sc = -dir.x; tc = -dir.y;
        }
    }
    let face_uv = vec2<f32>(sc, tc) / (2.0 * ma) + 0.5;
    return textureSampleLevel(input_tex, input_sampler, face_uv, layer, 0.0).rg;
}

fn sample_direction(uv: vec2<f32>) -> vec2<f32> {
    return sample_cube(oct_decode(clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0))));
}

@fragment
fn fs_blur_cube(in: VertexOutput) -> @location(0) vec2<f32> {
    let dims = vec2<f32>(textureDimensions(input_tex));
    let texel = params.radius / dims.x;
    var moments = sample_direction(in.uv) * WEIGHTS[0];
    for (var i = 1; i < 5; i++) {
        let offset = vec2<f32>(texel * f32(i), 0.0);
        moments += sample_direction(in.uv + offset) * WEIGHTS[i];
        moments += sample_direction(in.uv - offset) * WEIGHTS[i];
    }
    return moments;
}
"#;

/// GPU uniform for blur shader parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct BlurParams {
    pub radius: f32,
    pub _pad: [f32; 3],
}

/// Per-light blur radius binding, recreated only when the radius changes.
pub struct BlurParamsBinding {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub radius: f32,
}

/// Two-pass separable blur over moment textures.
pub struct BlurPipeline {
    params_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    cube_texture_bgl: wgpu::BindGroupLayout,
    horizontal: wgpu::RenderPipeline,
    vertical: wgpu::RenderPipeline,
    cube: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
}

impl BlurPipeline {
    /// Create the blur pipelines for moment-format targets.
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-blur-shader"),
            source: wgpu::ShaderSource::Wgsl(BLUR_SHADER_SOURCE.into()),
        });

        let params_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur-params-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(16),
                },
                count: None,
            }],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur-texture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let cube_texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur-cube-texture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blur-pipeline-layout"),
            bind_group_layouts: &[&params_bgl, &texture_bgl],
            immediate_size: 0,
        });

        let cube_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blur-cube-pipeline-layout"),
            bind_group_layouts: &[&params_bgl, &cube_texture_bgl],
            immediate_size: 0,
        });

        let cube_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-blur-cube-shader"),
            source: wgpu::ShaderSource::Wgsl(BLUR_CUBE_SHADER_SOURCE.into()),
        });

        let horizontal = create_blur_pipeline(device, &shader, &layout, "fs_blur_h", "blur-h");
        let vertical = create_blur_pipeline(device, &shader, &layout, "fs_blur_v", "blur-v");
        let cube = create_blur_pipeline(
            device,
            &cube_shader,
            &cube_layout,
            "fs_blur_cube",
            "blur-cube",
        );

        // Rg32Float is not filterable without extra features, so taps are
        // fetched with a nearest sampler and weighted in the shader.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blur-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            params_bgl,
            texture_bgl,
            cube_texture_bgl,
            horizontal,
            vertical,
            cube,
            sampler,
        }
    }

    /// Create the radius uniform binding for one light.
    pub fn create_params(&self, device: &wgpu::Device, radius: f32) -> BlurParamsBinding {
        use wgpu::util::DeviceExt;

        let params = BlurParams {
            radius,
            _pad: [0.0; 3],
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("blur-params"),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur-params-bg"),
            layout: &self.params_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        BlurParamsBinding {
            buffer,
            bind_group,
            radius,
        }
    }

    /// Create a texture bind group for one source layer view.
    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur-texture-bg"),
            layout: &self.texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Create a texture bind group for a six-layer cube face array view.
    pub fn cube_bind_group(
        &self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur-cube-texture-bg"),
            layout: &self.cube_texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    /// Encode the cube horizontal pass: six face layers into one
    /// octahedrally mapped `target` scratch layer.
    pub fn encode_cube(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: &BlurParamsBinding,
        source: &wgpu::BindGroup,
        target: &wgpu::TextureView,
    ) {
        self.run_pass(encoder, &self.cube, params, source, target, "blur-cube");
    }

    /// Encode the horizontal pass: `source` layer into `target` scratch layer.
    pub fn encode_horizontal(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: &BlurParamsBinding,
        source: &wgpu::BindGroup,
        target: &wgpu::TextureView,
    ) {
        self.run_pass(encoder, &self.horizontal, params, source, target, "blur-h");
    }

    /// Encode the vertical pass: scratch layer into the final atlas tile.
    pub fn encode_vertical(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        params: &BlurParamsBinding,
        source: &wgpu::BindGroup,
        target: &wgpu::TextureView,
    ) {
        self.run_pass(encoder, &self.vertical, params, source, target, "blur-v");
    }

    fn run_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        params: &BlurParamsBinding,
        source: &wgpu::BindGroup,
        target: &wgpu::TextureView,
        label: &str,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &params.bind_group, &[]);
        pass.set_bind_group(1, source, &[]);
        pass.draw(0..3, 0..1);
    }
}

fn create_blur_pipeline(
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
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
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
    fn test_gaussian_weights_normalize() {
        let sum: f32 = GAUSSIAN_WEIGHTS[0] + 2.0 * GAUSSIAN_WEIGHTS[1..].iter().sum::<f32>();
        assert!((sum - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_gaussian_weights_decrease() {
        for pair in GAUSSIAN_WEIGHTS.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_blur_pipeline_creation() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let blur = BlurPipeline::new(&device);
        let params = blur.create_params(&device, 2.0);
        assert_eq!(params.radius, 2.0);
    }

    #[test]
    fn test_cube_bind_group_accepts_face_array() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let blur = BlurPipeline::new(&device);
        let faces = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("test-cube-faces"),
            size: wgpu::Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MOMENT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = faces.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let _ = blur.cube_bind_group(&device, &view);
    }
}
