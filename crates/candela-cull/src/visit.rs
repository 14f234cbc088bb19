//! Visibility walks over the scene store with per-item callbacks.
//!
//! Each walk filters entities by a [`RenderFlags`] mask, tests their
//! world-space bounds against one or more clip volumes, and invokes the
//! callback once per visible (entity, clip) pair. The `depth` argument is
//! a front-to-back ordering metric in world units; callers quantize it
//! into draw sort keys.

use candela_scene::{Aabb, EntityHandle, RenderFlags, SceneStore, RENDER_FLAG_LIGHT};
use glam::Mat4;

use crate::frustum::Frustum;

/// Walks entities matching `mask` that intersect a single frustum.
/// The callback receives a clip index of 0 for every item.
pub fn visit_frustum(
    store: &SceneStore,
    mask: RenderFlags,
    view_projection: &Mat4,
    mut visit: impl FnMut(EntityHandle, u32, f32),
) {
    let frustum = Frustum::from_view_projection(view_projection);
    for handle in store.iter_flagged(mask) {
        let bounds = store.world_bounds(handle);
        if frustum.is_visible(&bounds) {
            let depth = frustum.near_distance(bounds.center()).max(0.0);
            visit(handle, 0, depth);
        }
    }
}

/// Walks entities matching `mask` that intersect an omnidirectional
/// light volume, reporting which cube faces each item can affect.
///
/// `bounds` is the light's world-space AABB; its center is the light
/// position and its x half-extent the influence radius. An item is
/// reported for face `f` when its box reaches past the light center
/// along that face's axis direction. Face order matches cube map
/// layer order: +X, -X, +Y, -Y, +Z, -Z.
pub fn visit_cube_faces(
    store: &SceneStore,
    mask: RenderFlags,
    bounds: &Aabb,
    mut visit: impl FnMut(EntityHandle, u32, f32),
) {
    let center = bounds.center();
    for handle in store.iter_flagged(mask) {
        let item = store.world_bounds(handle);
        if !overlaps(&item, bounds) {
            continue;
        }

        let depth = ((item.center() - center).length() - item.extents().length()).max(0.0);
        let faces = [
            item.max.x > center.x,
            item.min.x < center.x,
            item.max.y > center.y,
            item.min.y < center.y,
            item.max.z > center.z,
            item.min.z < center.z,
        ];
        for (face, reaches) in faces.into_iter().enumerate() {
            if reaches {
                visit(handle, face as u32, depth);
            }
        }
    }
}

/// Walks entities matching `mask` against a set of cascade frusta,
/// invoking the callback once per (entity, cascade) intersection.
pub fn visit_cascades(
    store: &SceneStore,
    mask: RenderFlags,
    cascades: &[Mat4],
    mut visit: impl FnMut(EntityHandle, u32, f32),
) {
    let frusta: Vec<Frustum> = cascades.iter().map(Frustum::from_view_projection).collect();
    for handle in store.iter_flagged(mask) {
        let bounds = store.world_bounds(handle);
        for (index, frustum) in frusta.iter().enumerate() {
            if frustum.is_visible(&bounds) {
                let depth = frustum.near_distance(bounds.center()).max(0.0);
                visit(handle, index as u32, depth);
            }
        }
    }
}

/// Collects handles of light entities visible in the camera frustum,
/// in store order. This is the input list for per-frame light
/// classification.
pub fn visible_lights(store: &SceneStore, view_projection: &Mat4) -> Vec<EntityHandle> {
    let mut lights = Vec::new();
    visit_frustum(store, RENDER_FLAG_LIGHT, view_projection, |handle, _, _| {
        lights.push(handle);
    });
    lights
}

fn overlaps(a: &Aabb, b: &Aabb) -> bool {
    a.min.cmple(b.max).all() && a.max.cmpge(b.min).all()
}
