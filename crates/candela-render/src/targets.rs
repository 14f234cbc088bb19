//! Shadow render targets and the shared shadow atlas.
//!
//! Shadow casters render moments (distance, distance squared) into a small
//! layered target, one layer per clip in the current batch. The blur pass then
//! filters those layers into the [`ShadowAtlas`], which holds every allocated
//! tile for the frame plus a scratch block for the horizontal blur pass.

/// Two-channel float format storing distance and squared distance per texel.
pub const MOMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Float;

/// 16-bit depth is enough for tile-local shadow ranges.
pub const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth16Unorm;

/// Reverse-Z clear value for shadow depth attachments.
pub const SHADOW_DEPTH_CLEAR: f32 = 0.0;

/// Edge length for one cube face so that six faces together cost the same
/// texel budget as a single square tile of `tile_size`.
pub fn cube_face_size(tile_size: u32) -> u32 {
    (((tile_size * tile_size) as f32) / 6.0).sqrt() as u32
}

/// Clear color for moment targets: distance and squared distance at the far
/// bound, so untouched texels read as fully unoccluded.
pub fn moment_clear(max_distance: f32) -> wgpu::Color {
    wgpu::Color {
        r: max_distance as f64,
        g: (max_distance * max_distance) as f64,
        b: 0.0,
        a: 0.0,
    }
}

/// A layered moment + depth render target for one shadow batch.
///
/// Each layer gets its own attachment views so a batch of up to `layers`
/// clips can be rendered with one pass per layer.
pub struct ShadowTarget {
    pub color: wgpu::Texture,
    pub depth: wgpu::Texture,
    /// Array view over all color layers, for sampling in the blur pass.
    pub color_array_view: wgpu::TextureView,
    color_layer_views: Vec<wgpu::TextureView>,
    depth_layer_views: Vec<wgpu::TextureView>,
    size: u32,
    layers: u32,
}

impl ShadowTarget {
    /// Create a target with square `size` texels and `layers` array layers.
    pub fn new(device: &wgpu::Device, label: &'static str, size: u32, layers: u32) -> Self {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MOMENT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let color_array_view = color.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let color_layer_views = (0..layers).map(|i| layer_view(&color, i)).collect();
        let depth_layer_views = (0..layers).map(|i| layer_view(&depth, i)).collect();

        Self {
            color,
            depth,
            color_array_view,
            color_layer_views,
            depth_layer_views,
            size,
            layers,
        }
    }

    /// Color attachment view for one layer.
    pub fn color_layer(&self, layer: u32) -> &wgpu::TextureView {
        &self.color_layer_views[layer as usize]
    }

    /// Depth attachment view for one layer.
    pub fn depth_layer(&self, layer: u32) -> &wgpu::TextureView {
        &self.depth_layer_views[layer as usize]
    }

    /// Square edge length in texels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of array layers.
    pub fn layers(&self) -> u32 {
        self.layers
    }
}

/// The shared shadow atlas: one array layer per allocated tile, plus a
/// scratch block appended after `tile_count` for the horizontal blur pass.
pub struct ShadowAtlas {
    pub texture: wgpu::Texture,
    /// Array view over all layers, bound by the lighting shaders.
    pub array_view: wgpu::TextureView,
    layer_views: Vec<wgpu::TextureView>,
    tile_size: u32,
    tile_count: u32,
    scratch_layers: u32,
}

impl ShadowAtlas {
    /// Create an atlas with `tile_count` sampled tiles and `scratch_layers`
    /// extra layers for intermediate blur output.
    pub fn new(
        device: &wgpu::Device,
        tile_size: u32,
        tile_count: u32,
        scratch_layers: u32,
    ) -> Self {
        let layers = tile_count + scratch_layers;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-atlas"),
            size: wgpu::Extent3d {
                width: tile_size,
                height: tile_size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MOMENT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            base_array_layer: 0,
            array_layer_count: Some(tile_count),
            ..Default::default()
        });

        let layer_views = (0..layers).map(|i| layer_view(&texture, i)).collect();

        Self {
            texture,
            array_view,
            layer_views,
            tile_size,
            tile_count,
            scratch_layers,
        }
    }

    /// Attachment view for one atlas layer (tile or scratch).
    pub fn layer(&self, layer: u32) -> &wgpu::TextureView {
        &self.layer_views[layer as usize]
    }

    /// First scratch layer index, directly after the sampled tiles.
    pub fn scratch_base(&self) -> u32 {
        self.tile_count
    }

    /// Tile edge length in texels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of sampled tile layers (excludes scratch).
    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    /// Total layer count including scratch.
    pub fn total_layers(&self) -> u32 {
        self.tile_count + self.scratch_layers
    }
}

fn layer_view(texture: &wgpu::Texture, layer: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..Default::default()
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
    fn test_cube_face_size_preserves_texel_budget() {
        let face = cube_face_size(512);
        // Six faces must not exceed the budget of one 512x512 tile.
        assert!(6 * face * face <= 512 * 512);
        assert_eq!(face, 209);
    }

    #[test]
    fn test_cube_face_size_scales_with_tile() {
        assert!(cube_face_size(1024) > cube_face_size(512));
        assert!(cube_face_size(64) > 0);
    }

    #[test]
    fn test_moment_clear_squares_distance() {
        let clear = moment_clear(50.0);
        assert_eq!(clear.r, 50.0);
        assert_eq!(clear.g, 2500.0);
        assert_eq!(clear.b, 0.0);
    }

    #[test]
    fn test_shadow_target_layer_views() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let target = ShadowTarget::new(&device, "test-target", 256, 4);
        assert_eq!(target.size(), 256);
        assert_eq!(target.layers(), 4);
        for layer in 0..4 {
            let _ = target.color_layer(layer);
            let _ = target.depth_layer(layer);
        }
    }

    #[test]
    fn test_atlas_scratch_follows_tiles() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let atlas = ShadowAtlas::new(&device, 128, 8, 4);
        assert_eq!(atlas.scratch_base(), 8);
        assert_eq!(atlas.total_layers(), 12);
        assert_eq!(atlas.tile_size(), 128);
        let _ = atlas.layer(atlas.scratch_base());
        let _ = atlas.layer(atlas.total_layers() - 1);
    }

    #[test]
    fn test_atlas_texture_usage() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let atlas = ShadowAtlas::new(&device, 64, 2, 1);
        let usage = atlas.texture.usage();
        assert!(usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
    }
}
