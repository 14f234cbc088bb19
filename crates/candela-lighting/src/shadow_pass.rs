//! Batched shadow map rendering and filtering.
//!
//! Granted casters render in batches of up to [`SHADOW_BATCH_SIZE`] lights
//! of one type. Each batch culls shadow casters per clip, sorts the draws
//! into atlas-layer order, renders moments into a small scene target, and
//! blurs the result into the shared atlas. Point lights render six cube
//! faces per light and fold them into one octahedral tile during the
//! horizontal blur; spot lights and directional cascades render one flat
//! layer per clip.

use candela_cull::{visit_cascades, visit_cube_faces, visit_frustum};
use candela_render::{
    BlurParamsBinding, BlurPipeline, GrowableBuffer, MeshRegistry, RenderPassBuilder, ShadowAtlas,
    ShadowBatch, ShadowClipParams, ShadowDraw, ShadowGroup, ShadowPipeline, ShadowTarget,
    cube_face_size, pack_draw_key,
};
use candela_scene::{Aabb, LightType, RENDER_FLAG_SHADOW_CASTER, SceneStore};
use glam::{Mat4, Vec3};

use crate::cascade::CascadeSet;
use crate::classify::{LIGHT_TYPE_COUNT, LightView, SHADOW_BATCH_SIZE, ShadowTypeAllocation};

/// Near plane of point shadow face projections, world units.
const POINT_Z_NEAR: f32 = 0.1;

/// Blur taps per unit of configured shadow blur.
const BLUR_RADIUS_SCALE: f32 = 4.0;

/// Look directions and up vectors for the six cube faces, in cube map
/// layer order +X, -X, +Y, -Y, +Z, -Z.
const CUBE_FACE_BASES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Sorted index of the light rendered into `tile` of a batch.
///
/// Point and spot batches map one tile per light; a directional batch
/// spends all its tiles on its single light's cascades.
pub(crate) fn tile_view_offset(max_batch_size: u32, tile: u32) -> u32 {
    tile * max_batch_size / SHADOW_BATCH_SIZE
}

/// Borrowed per-frame inputs for the shadow pass.
///
/// `matrices` is the packed projection stream; spot culling reads its
/// view-projection from there so the GPU and the CPU cull agree.
/// `cascades` runs parallel to `views`.
pub struct ShadowFrame<'a> {
    pub views: &'a [LightView],
    pub cascades: &'a [Option<CascadeSet>],
    pub allocations: &'a [ShadowTypeAllocation; LIGHT_TYPE_COUNT],
    pub matrices: &'a [Mat4],
}

/// Owns the shadow pipelines, the scene targets, and the atlas, and
/// encodes the full render-and-blur sequence for one frame.
pub struct ShadowmapRenderer {
    pipeline: ShadowPipeline,
    blur: BlurPipeline,
    atlas: ShadowAtlas,
    /// Cube face target, six layers per batch slot.
    point_target: ShadowTarget,
    /// Flat target for spot clips and directional cascades.
    flat_target: ShadowTarget,
    batch: ShadowBatch,
    model_buffer: GrowableBuffer,
    blur_cache: Vec<BlurParamsBinding>,
}

impl ShadowmapRenderer {
    pub fn new(
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
        tile_size: u32,
        tile_count: u32,
    ) -> Self {
        Self {
            pipeline: ShadowPipeline::new(device, shader),
            blur: BlurPipeline::new(device),
            // Scratch layers let the horizontal pass of batch N write past
            // the tiles batch N occupies.
            atlas: ShadowAtlas::new(device, tile_size, tile_count, SHADOW_BATCH_SIZE),
            point_target: ShadowTarget::new(
                device,
                "point-shadow-target",
                cube_face_size(tile_size),
                SHADOW_BATCH_SIZE * 6,
            ),
            flat_target: ShadowTarget::new(
                device,
                "flat-shadow-target",
                tile_size,
                SHADOW_BATCH_SIZE,
            ),
            batch: ShadowBatch::with_capacity(256),
            model_buffer: GrowableBuffer::new(
                device,
                "shadow-models",
                wgpu::BufferUsages::STORAGE,
                4096,
            ),
            blur_cache: Vec::new(),
        }
    }

    /// The filtered tile atlas sampled by the lighting shaders.
    pub fn atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    /// Encodes every shadow batch of the frame onto `encoder`, in atlas
    /// tile order.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        store: &SceneStore,
        meshes: &MeshRegistry,
        frame: &ShadowFrame<'_>,
    ) {
        for light_type in [LightType::Point, LightType::Spot, LightType::Directional] {
            let allocation = frame.allocations[light_type.as_u32() as usize];
            for batch in 0..allocation.batch_count() {
                self.render_batch(
                    device, queue, encoder, store, meshes, frame, light_type, &allocation, batch,
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_batch(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        store: &SceneStore,
        meshes: &MeshRegistry,
        frame: &ShadowFrame<'_>,
        light_type: LightType,
        allocation: &ShadowTypeAllocation,
        batch: u32,
    ) {
        let batch_size = allocation.batch_size(batch);
        let base = allocation.batch_base(batch) as usize;
        let tile_count = allocation.batch_tiles(batch);
        let atlas_index = frame.views[base].shadowmap_index;

        self.batch.clear();
        let mut staging: Vec<Mat4> = Vec::new();

        for slot in 0..batch_size {
            let view = &frame.views[base + slot as usize];
            let draws = &mut self.batch;
            let queue_draw = |handle, clip, depth| {
                draws.push(ShadowDraw {
                    key: pack_draw_key(clip, slot, view.linear_index),
                    depth,
                    mesh_id: store.mesh_id(handle),
                    transform_index: staging.len() as u32,
                });
                staging.push(store.transform(handle).local_to_world());
            };

            match light_type {
                LightType::Point => {
                    let bounds = Aabb::from_center_half_extents(
                        store.transform(view.handle).position,
                        Vec3::splat(view.radius),
                    );
                    visit_cube_faces(store, RENDER_FLAG_SHADOW_CASTER, &bounds, queue_draw);
                }
                LightType::Spot => {
                    let view_projection = &frame.matrices[view.projection_index as usize];
                    visit_frustum(store, RENDER_FLAG_SHADOW_CASTER, view_projection, queue_draw);
                }
                LightType::Directional => {
                    if let Some(set) = frame.cascades[base + slot as usize].as_ref() {
                        visit_cascades(store, RENDER_FLAG_SHADOW_CASTER, &set.matrices, queue_draw);
                    }
                }
            }
        }

        self.batch.sort();

        // Model matrices upload in sorted draw order because the vertex
        // shader indexes them by instance index.
        let mut groups: Vec<(ShadowGroup<'_>, u32)> = Vec::new();
        let mut model_data: Vec<f32> = Vec::with_capacity(self.batch.len() * 16);
        let mut offset = 0u32;
        for group in self.batch.groups() {
            let instance_count = group.draws.len() as u32;
            for draw in group.draws {
                model_data.extend_from_slice(
                    &staging[draw.transform_index as usize].to_cols_array(),
                );
            }
            groups.push((group, offset));
            offset += instance_count;
        }

        let models = if model_data.is_empty() {
            None
        } else {
            self.model_buffer
                .write(device, queue, bytemuck::cast_slice(&model_data));
            Some(
                self.pipeline
                    .model_bind_group(device, self.model_buffer.buffer()),
            )
        };

        let clip_pass = |encoder: &mut wgpu::CommandEncoder,
                         clip: u32,
                         slot: u32,
                         target: &ShadowTarget,
                         layer: u32,
                         params: ShadowClipParams,
                         planar: bool| {
            let group = groups
                .iter()
                .find(|(g, _)| g.clip_index() == clip && g.batch_slot() == slot);
            encode_clip_pass(
                device,
                encoder,
                &self.pipeline,
                meshes,
                target,
                layer,
                params,
                planar,
                group.map(|(g, first)| (g, *first)),
                models.as_ref(),
            );
        };

        match light_type {
            LightType::Point => {
                let max_radius = frame.views[base..base + batch_size as usize]
                    .iter()
                    .map(|v| v.radius)
                    .fold(0.0f32, f32::max);
                for slot in 0..batch_size {
                    let view = &frame.views[base + slot as usize];
                    let position = store.transform(view.handle).position;
                    let projection =
                        Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, view.radius, POINT_Z_NEAR);
                    for face in 0..6u32 {
                        let (forward, up) = CUBE_FACE_BASES[face as usize];
                        let params = ShadowClipParams::new(
                            projection * Mat4::look_to_rh(position, forward, up),
                            position,
                            max_radius,
                            forward,
                        );
                        clip_pass(
                            encoder,
                            face,
                            slot,
                            &self.point_target,
                            slot * 6 + face,
                            params,
                            false,
                        );
                    }
                }
            }
            LightType::Spot => {
                let max_radius = frame.views[base..base + batch_size as usize]
                    .iter()
                    .map(|v| v.radius)
                    .fold(0.0f32, f32::max);
                for slot in 0..batch_size {
                    let view = &frame.views[base + slot as usize];
                    let transform = store.transform(view.handle);
                    let params = ShadowClipParams::new(
                        frame.matrices[view.projection_index as usize],
                        transform.position,
                        max_radius,
                        transform.forward(),
                    );
                    clip_pass(encoder, 0, slot, &self.flat_target, slot, params, false);
                }
            }
            LightType::Directional => {
                let view = &frame.views[base];
                let forward = store.transform(view.handle).forward();
                if let Some(set) = frame.cascades[base].as_ref() {
                    for cascade in 0..SHADOW_BATCH_SIZE {
                        let params = ShadowClipParams::new(
                            set.matrices[cascade as usize],
                            set.origins[cascade as usize],
                            set.range,
                            forward,
                        );
                        clip_pass(encoder, cascade, 0, &self.flat_target, cascade, params, true);
                    }
                }
            }
        }

        self.blur_batch(
            device,
            encoder,
            frame,
            light_type,
            allocation.max_batch_size,
            base,
            tile_count,
            atlas_index,
        );
    }

    /// Blurs each rendered tile of a batch into the atlas: horizontal into
    /// the scratch block, vertical into the final tile.
    #[allow(clippy::too_many_arguments)]
    fn blur_batch(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        frame: &ShadowFrame<'_>,
        light_type: LightType,
        max_batch_size: u32,
        base: usize,
        tile_count: u32,
        atlas_index: u32,
    ) {
        for tile in 0..tile_count {
            let view = &frame.views[base + tile_view_offset(max_batch_size, tile) as usize];
            let radius = view.shadow_blur * BLUR_RADIUS_SCALE;
            let params_index = self.params_for_radius(device, radius);
            let params = &self.blur_cache[params_index];

            let scratch = self.atlas.layer(self.atlas.scratch_base() + tile);
            match light_type {
                LightType::Point => {
                    let faces = self.point_target.color.create_view(&wgpu::TextureViewDescriptor {
                        dimension: Some(wgpu::TextureViewDimension::D2Array),
                        base_array_layer: tile * 6,
                        array_layer_count: Some(6),
                        ..Default::default()
                    });
                    let source = self.blur.cube_bind_group(device, &faces);
                    self.blur.encode_cube(encoder, params, &source, scratch);
                }
                LightType::Spot | LightType::Directional => {
                    let source = self
                        .blur
                        .texture_bind_group(device, self.flat_target.color_layer(tile));
                    self.blur.encode_horizontal(encoder, params, &source, scratch);
                }
            }

            let source = self.blur.texture_bind_group(device, scratch);
            self.blur
                .encode_vertical(encoder, params, &source, self.atlas.layer(atlas_index + tile));
        }
    }

    fn params_for_radius(&mut self, device: &wgpu::Device, radius: f32) -> usize {
        if let Some(index) = self
            .blur_cache
            .iter()
            .position(|p| (p.radius - radius).abs() < 1e-3)
        {
            return index;
        }
        self.blur_cache.push(self.blur.create_params(device, radius));
        self.blur_cache.len() - 1
    }
}

/// Encodes one clip's moment pass. The layer is always cleared so stale
/// moments from earlier frames cannot leak through tiles with no casters.
#[allow(clippy::too_many_arguments)]
fn encode_clip_pass(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &ShadowPipeline,
    meshes: &MeshRegistry,
    target: &ShadowTarget,
    layer: u32,
    params: ShadowClipParams,
    planar: bool,
    group: Option<(&ShadowGroup<'_>, u32)>,
    models: Option<&wgpu::BindGroup>,
) {
    let mut pass = RenderPassBuilder::new()
        .clear_moments(params.origin[3])
        .depth()
        .label("shadow-moments")
        .begin(
            encoder,
            target.color_layer(layer),
            Some(target.depth_layer(layer)),
        );

    let (Some((group, first_instance)), Some(models)) = (group, models) else {
        return;
    };

    use wgpu::util::DeviceExt;
    let clip_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("shadow-clip-uniform"),
        contents: bytemuck::cast_slice(&[params]),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let clip_bind_group = pipeline.clip_bind_group(device, &clip_buffer);

    pass.set_pipeline(if planar {
        &pipeline.planar
    } else {
        &pipeline.positional
    });
    pass.set_bind_group(0, &clip_bind_group, &[]);
    pass.set_bind_group(1, models, &[]);

    let mut instance = first_instance;
    for instanced in group.instanced_groups() {
        let count = instanced.instance_count();
        if let Some(mesh) = meshes.get(instanced.mesh_id) {
            mesh.bind(&mut pass);
            mesh.draw_instanced(&mut pass, instance..instance + count);
        } else {
            log::debug!("mesh {} missing from registry, skipping draw", instanced.mesh_id);
        }
        instance += count;
    }
}
