//! Light, transform, and visibility-flag attributes resolved per entity.

use glam::{Mat4, Quat, Vec3, Vec4};

/// The kind of a light source. The discriminant order is meaningful:
/// visible lights are grouped by ascending type so that each kind forms
/// one contiguous run in the sorted view list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum LightType {
    /// Omnidirectional light rendered into a six-face cube shadow map.
    Point = 0,
    /// Cone light with a single perspective shadow projection.
    Spot = 1,
    /// Infinite light with a cascaded set of orthographic projections.
    Directional = 2,
}

impl LightType {
    /// Stable numeric discriminant, as written into GPU records.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Authored attributes of a light source.
///
/// Spatial placement lives in [`Transform`]; this struct carries only the
/// photometric and shadow parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    /// Kind of the light.
    pub light_type: LightType,
    /// Linear RGB intensity in `xyz`, unused `w`.
    pub color: Vec4,
    /// Influence radius in world units. Ignored for directional lights,
    /// which affect the whole view volume.
    pub radius: f32,
    /// Full cone angle in degrees. Point lights use 90 per cube face,
    /// directional lights do not use this field.
    pub angle: f32,
    /// Whether this light requests shadow-map tiles.
    pub cast_shadows: bool,
    /// Shadow blur amount in [0, 1], packed into the GPU record.
    pub shadow_blur: f32,
    /// Projection cookie texture index, or `u32::MAX` for none.
    pub cookie_index: u32,
}

impl Light {
    /// An omnidirectional light with the given color and influence radius.
    pub fn point(color: Vec4, radius: f32) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            radius,
            angle: 90.0,
            cast_shadows: false,
            shadow_blur: 0.0,
            cookie_index: u32::MAX,
        }
    }

    /// A cone light with the given color, influence radius, and full cone
    /// angle in degrees.
    pub fn spot(color: Vec4, radius: f32, angle: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            angle,
            ..Self::point(color, radius)
        }
    }

    /// An infinite light with the given color.
    pub fn directional(color: Vec4) -> Self {
        Self {
            light_type: LightType::Directional,
            radius: 0.0,
            angle: 0.0,
            ..Self::point(color, 0.0)
        }
    }

    /// Enables shadow casting with the given blur amount.
    pub fn with_shadows(mut self, blur: f32) -> Self {
        self.cast_shadows = true;
        self.shadow_blur = blur;
        self
    }

    /// Assigns a projection cookie texture index.
    pub fn with_cookie(mut self, index: u32) -> Self {
        self.cookie_index = index;
        self
    }
}

/// Position, orientation, and uniform scale of an entity.
///
/// Matrices are derived on demand rather than cached. Non-uniform scale is
/// not supported at this level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// World-space position.
    pub position: Vec3,
    /// Orientation as a unit quaternion.
    pub rotation: Quat,
    /// Uniform scale factor, 1.0 for none.
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl Transform {
    /// Creates a transform from position, rotation, and uniform scale.
    pub fn new(position: Vec3, rotation: Quat, scale: f32) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Creates a transform at the given position with identity rotation
    /// and unit scale.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Local-to-world matrix.
    pub fn local_to_world(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }

    /// World-to-local matrix, the inverse of [`Self::local_to_world`].
    pub fn world_to_local(&self) -> Mat4 {
        self.local_to_world().inverse()
    }

    /// Forward direction (-Z rotated by the orientation). Spot and
    /// directional lights shine along this vector.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// Bitmask describing which renderer subsystems care about an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub struct RenderFlags(pub u32);

/// Entity owns drawable geometry.
pub const RENDER_FLAG_RENDERER: RenderFlags = RenderFlags(1 << 0);
/// Entity's geometry is drawn into shadow maps.
pub const RENDER_FLAG_SHADOW_CASTER: RenderFlags = RenderFlags(1 << 1);
/// Entity is a light source.
pub const RENDER_FLAG_LIGHT: RenderFlags = RenderFlags(1 << 2);

impl RenderFlags {
    /// No flags set.
    pub const NONE: RenderFlags = RenderFlags(0);

    /// True when every bit of `mask` is set on `self`.
    pub fn contains(self, mask: RenderFlags) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// True when at least one bit of `mask` is set on `self`.
    pub fn intersects(self, mask: RenderFlags) -> bool {
        self.0 & mask.0 != 0
    }
}

impl std::ops::BitOr for RenderFlags {
    type Output = RenderFlags;

    fn bitor(self, rhs: RenderFlags) -> RenderFlags {
        RenderFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for RenderFlags {
    fn bitor_assign(&mut self, rhs: RenderFlags) {
        self.0 |= rhs.0;
    }
}
