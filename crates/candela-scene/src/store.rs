//! Slot-based entity store resolving handles to scene attributes.

use glam::Vec3;

use crate::aabb::Aabb;
use crate::components::{Light, RenderFlags, Transform, RENDER_FLAG_LIGHT};

/// Opaque handle to an entity in a [`SceneStore`].
///
/// Handles stay valid until the entity is removed. Resolving a removed or
/// out-of-range handle is a programmer error and panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(u32);

impl EntityHandle {
    /// Raw slot index, for use as a stable sort tiebreaker or map key.
    pub fn index(self) -> u32 {
        self.0
    }
}

struct Entry {
    transform: Transform,
    local_bounds: Aabb,
    flags: RenderFlags,
    light: Option<Light>,
    mesh_id: u64,
}

/// Flat entity store owned by the host application.
///
/// The renderer only reads from the store: it receives handles from the
/// culling stage and resolves attributes one lookup at a time.
#[derive(Default)]
pub struct SceneStore {
    entities: Vec<Option<Entry>>,
}

impl SceneStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a drawable entity referencing a mesh by its registry id, with
    /// local-space bounds and visibility flags.
    pub fn add_renderable(
        &mut self,
        mesh_id: u64,
        transform: Transform,
        local_bounds: Aabb,
        flags: RenderFlags,
    ) -> EntityHandle {
        self.push(Entry {
            transform,
            local_bounds,
            flags,
            light: None,
            mesh_id,
        })
    }

    /// Adds a light entity. Bounds are derived from the influence radius
    /// so the light participates in the same culling pass as geometry.
    pub fn add_light(&mut self, light: Light, transform: Transform) -> EntityHandle {
        let half = if light.radius > 0.0 {
            Vec3::splat(light.radius)
        } else {
            // Directional lights have no finite influence volume. A very
            // large box keeps them visible from any camera position.
            Vec3::splat(1.0e8)
        };
        self.push(Entry {
            local_bounds: Aabb::from_center_half_extents(Vec3::ZERO, half),
            transform,
            flags: RENDER_FLAG_LIGHT,
            light: Some(light),
            mesh_id: 0,
        })
    }

    /// Removes an entity. Its handle becomes invalid; the slot is not
    /// reused.
    pub fn remove(&mut self, handle: EntityHandle) {
        let slot = self
            .entities
            .get_mut(handle.0 as usize)
            .unwrap_or_else(|| panic!("entity handle {} out of range", handle.0));
        *slot = None;
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.iter().filter(|e| e.is_some()).count()
    }

    /// True when the store holds no live entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves the transform of an entity.
    pub fn transform(&self, handle: EntityHandle) -> &Transform {
        &self.entry(handle).transform
    }

    /// Resolves the visibility flags of an entity.
    pub fn flags(&self, handle: EntityHandle) -> RenderFlags {
        self.entry(handle).flags
    }

    /// Resolves the mesh registry id of a drawable entity.
    pub fn mesh_id(&self, handle: EntityHandle) -> u64 {
        self.entry(handle).mesh_id
    }

    /// Resolves the light attributes of an entity. Panics if the entity
    /// is not a light.
    pub fn light(&self, handle: EntityHandle) -> &Light {
        self.entry(handle)
            .light
            .as_ref()
            .unwrap_or_else(|| panic!("entity handle {} is not a light", handle.0))
    }

    /// World-space bounds: the local bounds transformed by the entity's
    /// matrix and re-enclosed.
    pub fn world_bounds(&self, handle: EntityHandle) -> Aabb {
        let entry = self.entry(handle);
        entry
            .local_bounds
            .transformed(&entry.transform.local_to_world())
    }

    /// Iterates handles of live entities whose flags contain every bit of
    /// `mask`.
    pub fn iter_flagged(&self, mask: RenderFlags) -> impl Iterator<Item = EntityHandle> + '_ {
        self.entities.iter().enumerate().filter_map(move |(i, e)| {
            e.as_ref()
                .filter(|entry| entry.flags.contains(mask))
                .map(|_| EntityHandle(i as u32))
        })
    }

    fn push(&mut self, entry: Entry) -> EntityHandle {
        let index = self.entities.len() as u32;
        self.entities.push(Some(entry));
        EntityHandle(index)
    }

    fn entry(&self, handle: EntityHandle) -> &Entry {
        self.entities
            .get(handle.0 as usize)
            .unwrap_or_else(|| panic!("entity handle {} out of range", handle.0))
            .as_ref()
            .unwrap_or_else(|| panic!("entity handle {} is stale", handle.0))
    }
}
