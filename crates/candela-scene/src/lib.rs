//! Scene store contract: opaque entity handles resolving to light, transform,
//! and bounds attributes.
//!
//! The renderer core never owns scene data. It receives a list of visible
//! light handles each frame and resolves attributes through [`SceneStore`].
//! Invalid handles are programmer errors and panic; there is no recovery
//! path for a dangling handle.

mod aabb;
mod components;
mod store;

pub use aabb::Aabb;
pub use components::{
    Light, LightType, RENDER_FLAG_LIGHT, RENDER_FLAG_RENDERER, RENDER_FLAG_SHADOW_CASTER,
    RenderFlags, Transform,
};
pub use store::{EntityHandle, SceneStore};
