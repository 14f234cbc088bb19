//! Per-frame orchestration of the lighting pipeline.
//!
//! [`LightScheduler`] owns every GPU resource of the lighting system and
//! runs the frame in three steps: `prepare_frame` does the CPU work
//! (visibility, sort, classification, cascade fitting, packing, uploads),
//! `render_shadows` encodes the shadow batches, and `assign_clusters`
//! encodes the cluster compute passes. The prepared state stays resident
//! between steps so the encode calls borrow instead of recomputing.

use candela_config::Config;
use candela_cull::visible_lights;
use candela_render::{
    CLUSTER_ASSIGN_SHADER_SOURCE, CLUSTER_DEPTH_SHADER_SOURCE, MeshRegistry,
    SHADOW_SHADER_SOURCE, ShaderError, ShaderLibrary, ShadowAtlas,
};
use candela_scene::{LightType, SceneStore};
use glam::Mat4;

use crate::cascade::{CascadeSet, cascade_splits, fit_cascades};
use crate::classify::{
    LIGHT_TYPE_COUNT, LightView, NONE_INDEX, ShadowTypeAllocation, classify, collect_views,
    sort_visible_lights,
};
use crate::cluster::{CLUSTER_GRID, ClusterDriver, ClusterFrame};
use crate::packer::{LightBuffers, pack_frame};
use crate::shadow_pass::{ShadowFrame, ShadowmapRenderer};

/// Camera state for one frame.
pub struct CameraFrame {
    pub view: Mat4,
    pub projection: Mat4,
    pub z_near: f32,
    pub z_far: f32,
    /// Camera target size in pixels.
    pub screen: (f32, f32),
}

impl CameraFrame {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Owns the lighting pipeline state and drives it through one frame.
pub struct LightScheduler {
    shaders: ShaderLibrary,
    shadows: ShadowmapRenderer,
    cluster: ClusterDriver,
    buffers: LightBuffers,
    tile_size: u32,
    tile_count: u32,
    cascade_linearity: f32,
    views: Vec<LightView>,
    cascades: Vec<Option<CascadeSet>>,
    allocations: [ShadowTypeAllocation; LIGHT_TYPE_COUNT],
    matrices: Vec<Mat4>,
}

impl LightScheduler {
    pub fn new(device: &wgpu::Device, config: &Config) -> Result<Self, ShaderError> {
        let mut shaders = ShaderLibrary::new();
        shaders.load_from_source(device, "shadow-moments", SHADOW_SHADER_SOURCE)?;
        shaders.load_from_source(device, "cluster-depth", CLUSTER_DEPTH_SHADER_SOURCE)?;
        shaders.load_from_source(device, "cluster-assign", CLUSTER_ASSIGN_SHADER_SOURCE)?;

        let shadows = ShadowmapRenderer::new(
            device,
            &*shaders.require("shadow-moments")?,
            config.shadow.tile_size,
            config.shadow.tile_count,
        );
        let cluster = ClusterDriver::new(
            device,
            &*shaders.require("cluster-depth")?,
            &*shaders.require("cluster-assign")?,
            config.cluster.z_cull_lights,
        );

        Ok(Self {
            shaders,
            shadows,
            cluster,
            buffers: LightBuffers::new(device),
            tile_size: config.shadow.tile_size,
            tile_count: config.shadow.tile_count,
            cascade_linearity: config.shadow.cascade_linearity,
            views: Vec::new(),
            cascades: Vec::new(),
            allocations: classify(&mut [], 0).0,
            matrices: Vec::new(),
        })
    }

    /// The filtered shadow tile atlas.
    pub fn shadow_atlas(&self) -> &ShadowAtlas {
        self.shadows.atlas()
    }

    /// The packed light record, matrix, and direction buffers.
    pub fn light_buffers(&self) -> &LightBuffers {
        &self.buffers
    }

    /// The per-cluster (offset, count) texture.
    pub fn light_tiles(&self) -> &wgpu::TextureView {
        self.cluster.light_tiles()
    }

    /// The flat light index list referenced by the cluster words.
    pub fn light_index_list(&self) -> &wgpu::Buffer {
        self.cluster.index_list()
    }

    /// The sorted, classified light views of the prepared frame.
    pub fn views(&self) -> &[LightView] {
        &self.views
    }

    /// The shader library, for pipelines built outside the scheduler.
    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    /// Runs the CPU side of the frame and uploads the packed buffers.
    pub fn prepare_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        store: &SceneStore,
        camera: &CameraFrame,
    ) {
        let handles = visible_lights(store, &camera.view_projection());
        self.views = collect_views(store, &handles);
        sort_visible_lights(&mut self.views);
        let (allocations, projection_count) = classify(&mut self.views, self.tile_count);
        self.allocations = allocations;

        let splits = cascade_splits(
            camera.z_near,
            camera.z_far,
            self.cascade_linearity,
            CLUSTER_GRID[2],
        );
        let inverse_view_projection = camera.view_projection().inverse();
        self.cascades = self
            .views
            .iter()
            .map(|view| {
                if view.light_type != LightType::Directional
                    || view.shadowmap_index == NONE_INDEX
                {
                    return None;
                }
                let light_dir = store.transform(view.handle).forward();
                Some(fit_cascades(
                    light_dir,
                    &inverse_view_projection,
                    &splits,
                    camera.z_far,
                    self.tile_size,
                ))
            })
            .collect();

        let packed = pack_frame(store, &self.views, &self.cascades, projection_count);
        self.buffers.upload(device, queue, &packed);
        self.matrices = packed.matrices;

        self.cluster.begin_frame(
            device,
            queue,
            &ClusterFrame {
                view: camera.view,
                projection: camera.projection,
                z_near: camera.z_near,
                z_far: camera.z_far,
                screen: camera.screen,
                light_count: self.views.len() as u32,
            },
        );
    }

    /// Encodes every shadow batch of the prepared frame.
    pub fn render_shadows(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        store: &SceneStore,
        meshes: &MeshRegistry,
    ) {
        let frame = ShadowFrame {
            views: &self.views,
            cascades: &self.cascades,
            allocations: &self.allocations,
            matrices: &self.matrices,
        };
        self.shadows
            .render(device, queue, encoder, store, meshes, &frame);
    }

    /// Encodes the cluster compute passes. `camera_depth` enables the
    /// depth-tile reduction; without it every cluster is considered
    /// occupied.
    pub fn assign_clusters(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        camera_depth: Option<&wgpu::TextureView>,
        depth_size: (u32, u32),
    ) {
        self.cluster
            .encode(device, encoder, &self.buffers, camera_depth, depth_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candela_scene::{Aabb, Light, RENDER_FLAG_RENDERER, RENDER_FLAG_SHADOW_CASTER, Transform};
    use glam::{Vec3, Vec4};

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

    fn test_camera() -> CameraFrame {
        CameraFrame {
            view: Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y),
            projection: Mat4::perspective_rh(
                std::f32::consts::FRAC_PI_4,
                16.0 / 9.0,
                200.0,
                0.1,
            ),
            z_near: 0.1,
            z_far: 200.0,
            screen: (1920.0, 1080.0),
        }
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.shadow.tile_size = 128;
        config.shadow.tile_count = 8;
        config
    }

    #[test]
    fn test_scheduler_creation_loads_shaders() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let scheduler = LightScheduler::new(&device, &small_config()).unwrap();
        assert_eq!(scheduler.shaders().len(), 3);
        assert_eq!(scheduler.shadow_atlas().tile_count(), 8);
    }

    #[test]
    fn test_prepare_frame_classifies_visible_lights() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut scheduler = LightScheduler::new(&device, &small_config()).unwrap();

        let mut store = SceneStore::new();
        store.add_light(
            Light::point(Vec4::ONE, 5.0).with_shadows(0.5),
            Transform::from_position(Vec3::new(0.0, 0.0, -20.0)),
        );
        store.add_light(
            Light::point(Vec4::ONE, 5.0),
            Transform::from_position(Vec3::new(0.0, 0.0, 100.0)),
        );

        scheduler.prepare_frame(&device, &queue, &store, &test_camera());

        // The light behind the camera is culled.
        assert_eq!(scheduler.views().len(), 1);
        assert!(scheduler.views()[0].cast_shadows);
        assert_eq!(scheduler.views()[0].shadowmap_index, 0);
        assert_eq!(scheduler.cascades.len(), 1);
        assert!(scheduler.cascades[0].is_none());
    }

    #[test]
    fn test_prepare_frame_fits_cascades_for_granted_directional() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut scheduler = LightScheduler::new(&device, &small_config()).unwrap();

        let mut store = SceneStore::new();
        store.add_light(
            Light::directional(Vec4::ONE).with_shadows(0.5),
            Transform::from_position(Vec3::new(0.0, 0.0, -20.0)),
        );

        scheduler.prepare_frame(&device, &queue, &store, &test_camera());

        assert_eq!(scheduler.views().len(), 1);
        let set = scheduler.cascades[0].as_ref().expect("cascades fitted");
        assert!(set.range > 0.0);
        // Directional matrices land in the packed projection stream.
        assert!(scheduler.matrices.len() >= crate::cascade::CASCADE_COUNT);
        assert_ne!(scheduler.matrices[0], Mat4::IDENTITY);
    }

    #[test]
    fn test_full_frame_encodes_without_errors() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let queue = std::sync::Arc::new(queue);
        let mut scheduler = LightScheduler::new(&device, &small_config()).unwrap();

        let mut store = SceneStore::new();
        let mut meshes = MeshRegistry::new();
        let allocator = candela_render::BufferAllocator::new(&device);
        let vertices: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let mesh_id = meshes.insert(allocator.create_mesh(
            "tri",
            bytemuck::cast_slice(&vertices),
            candela_render::IndexData::U16(&[0, 1, 2]),
        ));
        store.add_renderable(
            mesh_id,
            Transform::from_position(Vec3::new(0.0, 0.0, -10.0)),
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
            RENDER_FLAG_RENDERER | RENDER_FLAG_SHADOW_CASTER,
        );
        store.add_light(
            Light::point(Vec4::ONE, 15.0).with_shadows(0.5),
            Transform::from_position(Vec3::new(0.0, 2.0, -10.0)),
        );
        store.add_light(
            Light::spot(Vec4::ONE, 25.0, 60.0).with_shadows(0.3),
            Transform::from_position(Vec3::new(0.0, 0.0, -5.0)),
        );
        store.add_light(
            Light::directional(Vec4::ONE).with_shadows(0.5),
            Transform::default(),
        );

        scheduler.prepare_frame(&device, &queue, &store, &test_camera());
        assert_eq!(scheduler.views().len(), 3);

        let mut frame = candela_render::FrameEncoder::new(&device, queue.clone());
        scheduler.render_shadows(&device, &queue, frame.encoder(), &store, &meshes);
        scheduler.assign_clusters(&device, frame.encoder(), None, (1920, 1080));
        frame.submit();
        let _ = device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
    }
}
