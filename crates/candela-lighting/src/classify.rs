//! Per-frame light ordering and shadow atlas allocation.
//!
//! Visible lights are sorted so that shadow casters trail non-casters and
//! each light type forms one contiguous run, then a single forward pass
//! assigns every light its dense `linear_index`, a projection matrix slot,
//! and (for casters that fit the tile budget) a shadow atlas tile block.
//! The sorted ranges drive the per-type batch loops in the shadow pass.

use candela_scene::{EntityHandle, LightType, SceneStore};
use glam::Vec4;

/// Sentinel for "no slot assigned" in index fields.
pub const NONE_INDEX: u32 = u32::MAX;

/// Lights rendered per shadow batch, and the cascade count of a
/// directional light. Atlas addressing assumes the two are equal.
pub const SHADOW_BATCH_SIZE: u32 = 4;

/// Number of [`LightType`] variants.
pub const LIGHT_TYPE_COUNT: usize = 3;

/// Per-frame transient view of one visible light.
///
/// Built from the scene store by [`collect_views`], then ordered and
/// annotated in place by [`sort_visible_lights`] and [`classify`]. The
/// index fields start at [`NONE_INDEX`] and stay there unless assigned.
#[derive(Clone, Copy, Debug)]
pub struct LightView {
    /// Scene entity this view was resolved from.
    pub handle: EntityHandle,
    pub light_type: LightType,
    pub cast_shadows: bool,
    /// Influence radius in world units, 0 for directional lights.
    pub radius: f32,
    /// Full spot cone angle in degrees.
    pub angle: f32,
    pub color: Vec4,
    pub shadow_blur: f32,
    pub cookie_index: u32,
    /// Position in the sorted list, also the GPU record slot.
    pub linear_index: u32,
    /// First atlas tile granted to this light, or [`NONE_INDEX`].
    pub shadowmap_index: u32,
    /// First projection matrix slot, or [`NONE_INDEX`].
    pub projection_index: u32,
}

/// Shadow batching range for one light type after classification.
///
/// `view_first..view_first + view_count` indexes granted casters of this
/// type in the sorted view list. The sort key guarantees the ranges of
/// different types never interleave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowTypeAllocation {
    /// Lowest sorted index of a granted caster, [`NONE_INDEX`] if none.
    pub view_first: u32,
    /// Number of granted casters of this type.
    pub view_count: u32,
    /// Lights rendered per batch: [`SHADOW_BATCH_SIZE`] for point and
    /// spot, 1 for directional (the cascade block is the batch).
    pub max_batch_size: u32,
}

impl ShadowTypeAllocation {
    fn for_type(light_type: LightType) -> Self {
        let max_batch_size = match light_type {
            LightType::Point | LightType::Spot => SHADOW_BATCH_SIZE,
            LightType::Directional => 1,
        };
        Self {
            view_first: NONE_INDEX,
            view_count: 0,
            max_batch_size,
        }
    }

    /// Number of batches needed to render every granted caster.
    pub fn batch_count(&self) -> u32 {
        self.view_count.div_ceil(self.max_batch_size)
    }

    /// Number of lights in `batch`; only the last batch may be short.
    pub fn batch_size(&self, batch: u32) -> u32 {
        (self.view_count - batch * self.max_batch_size).min(self.max_batch_size)
    }

    /// Sorted index of the first light in `batch`.
    pub fn batch_base(&self, batch: u32) -> u32 {
        self.view_first + batch * self.max_batch_size
    }

    /// Atlas tiles consumed by `batch`. Matches the allocator exactly:
    /// one tile per point or spot light, the full cascade block per
    /// directional light.
    pub fn batch_tiles(&self, batch: u32) -> u32 {
        self.batch_size(batch) * SHADOW_BATCH_SIZE / self.max_batch_size
    }
}

/// Resolves the handles of visible lights into transient views, in the
/// given order. Index fields are left unassigned.
///
/// Panics if a handle does not resolve to a light entity.
pub fn collect_views(store: &SceneStore, lights: &[EntityHandle]) -> Vec<LightView> {
    lights
        .iter()
        .map(|&handle| {
            let light = store.light(handle);
            LightView {
                handle,
                light_type: light.light_type,
                cast_shadows: light.cast_shadows,
                radius: light.radius,
                angle: light.angle,
                color: light.color,
                shadow_blur: light.shadow_blur,
                cookie_index: light.cookie_index,
                linear_index: NONE_INDEX,
                shadowmap_index: NONE_INDEX,
                projection_index: NONE_INDEX,
            }
        })
        .collect()
}

fn precedes(a: &LightView, b: &LightView) -> bool {
    (a.cast_shadows, a.light_type) < (b.cast_shadows, b.light_type)
}

fn quicksort(views: &mut [LightView], low: isize, high: isize) {
    // The pivot is copied out because the slot it lives in may be swapped
    // while the partition runs.
    let pivot = views[((low + high) / 2) as usize];
    let mut i = low;
    let mut j = high;
    while i <= j {
        while precedes(&views[i as usize], &pivot) {
            i += 1;
        }
        while precedes(&pivot, &views[j as usize]) {
            j -= 1;
        }
        if i <= j {
            views.swap(i as usize, j as usize);
            i += 1;
            j -= 1;
        }
    }
    if low < j {
        quicksort(views, low, j);
    }
    if i < high {
        quicksort(views, i, high);
    }
}

/// Orders views by `(cast_shadows, light_type)` ascending so non-casters
/// come first and every light type forms one contiguous caster run. Not
/// stable; lists of 0 or 1 lights are left untouched.
pub fn sort_visible_lights(views: &mut [LightView]) {
    if views.len() > 1 {
        quicksort(views, 0, views.len() as isize - 1);
    }
}

/// Assigns linear, projection, and shadow-map indices in one forward pass
/// over the sorted views.
///
/// Every view gets `linear_index = sorted position`. Projection slots are
/// handed out per type: spots consume one, directionals consume a
/// [`SHADOW_BATCH_SIZE`] cascade block, points store 0 and reconstruct
/// their face projections at draw time. Shadow tiles come out of
/// `tile_budget`: point and spot casters need one tile, directional
/// casters the whole cascade block or nothing. Over-budget casters keep
/// [`NONE_INDEX`] and render unshadowed.
///
/// Returns the per-type batching ranges and the total projection slot
/// count. Running it twice over identical input yields identical output.
pub fn classify(
    views: &mut [LightView],
    tile_budget: u32,
) -> ([ShadowTypeAllocation; LIGHT_TYPE_COUNT], u32) {
    let mut allocations = [
        ShadowTypeAllocation::for_type(LightType::Point),
        ShadowTypeAllocation::for_type(LightType::Spot),
        ShadowTypeAllocation::for_type(LightType::Directional),
    ];
    let mut shadow_map_count = 0u32;
    let mut projection_count = 0u32;

    for (index, view) in views.iter_mut().enumerate() {
        let index = index as u32;
        view.linear_index = index;
        view.shadowmap_index = NONE_INDEX;
        view.projection_index = match view.light_type {
            LightType::Point => 0,
            LightType::Spot => {
                projection_count += 1;
                projection_count - 1
            }
            LightType::Directional => {
                projection_count += SHADOW_BATCH_SIZE;
                projection_count - SHADOW_BATCH_SIZE
            }
        };

        if !view.cast_shadows {
            continue;
        }
        let tiles = match view.light_type {
            LightType::Point | LightType::Spot => 1,
            LightType::Directional => SHADOW_BATCH_SIZE,
        };
        if shadow_map_count + tiles > tile_budget {
            log::debug!(
                "shadow tile budget {} exhausted, light {} renders unshadowed",
                tile_budget,
                index
            );
            continue;
        }
        view.shadowmap_index = shadow_map_count;
        shadow_map_count += tiles;

        let allocation = &mut allocations[view.light_type.as_u32() as usize];
        allocation.view_first = allocation.view_first.min(index);
        allocation.view_count += 1;
    }

    (allocations, projection_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candela_scene::{Light, SceneStore, Transform};

    fn make_views(specs: &[(LightType, bool)]) -> Vec<LightView> {
        let mut store = SceneStore::new();
        let handles: Vec<_> = specs
            .iter()
            .map(|&(light_type, cast)| {
                let mut light = match light_type {
                    LightType::Point => Light::point(Vec4::ONE, 5.0),
                    LightType::Spot => Light::spot(Vec4::ONE, 10.0, 45.0),
                    LightType::Directional => Light::directional(Vec4::ONE),
                };
                if cast {
                    light = light.with_shadows(0.5);
                }
                store.add_light(light, Transform::default())
            })
            .collect();
        collect_views(&store, &handles)
    }

    fn sort_key(view: &LightView) -> (bool, LightType) {
        (view.cast_shadows, view.light_type)
    }

    #[test]
    fn test_sort_groups_casters_after_non_casters() {
        let mut views = make_views(&[
            (LightType::Directional, true),
            (LightType::Point, false),
            (LightType::Spot, true),
            (LightType::Point, true),
            (LightType::Directional, false),
        ]);
        sort_visible_lights(&mut views);
        for pair in views.windows(2) {
            assert!(sort_key(&pair[0]) <= sort_key(&pair[1]));
        }
        assert!(!views[0].cast_shadows);
        assert!(!views[1].cast_shadows);
        assert!(views[2..].iter().all(|v| v.cast_shadows));
    }

    #[test]
    fn test_sort_skips_single_light() {
        let mut views = make_views(&[(LightType::Spot, true)]);
        let handle = views[0].handle;
        sort_visible_lights(&mut views);
        assert_eq!(views[0].handle, handle);
        sort_visible_lights(&mut []);
    }

    #[test]
    fn test_linear_index_is_dense_permutation() {
        let mut views = make_views(&[
            (LightType::Spot, true),
            (LightType::Point, false),
            (LightType::Point, true),
            (LightType::Directional, true),
        ]);
        sort_visible_lights(&mut views);
        let (_, _) = classify(&mut views, 32);
        let mut indices: Vec<_> = views.iter().map(|v| v.linear_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_caster_ranges_contiguous_and_disjoint() {
        let mut views = make_views(&[
            (LightType::Directional, true),
            (LightType::Spot, true),
            (LightType::Point, true),
            (LightType::Spot, true),
            (LightType::Point, false),
            (LightType::Point, true),
        ]);
        sort_visible_lights(&mut views);
        let (allocations, _) = classify(&mut views, 32);

        let mut covered = Vec::new();
        for allocation in &allocations {
            if allocation.view_count == 0 {
                assert_eq!(allocation.view_first, NONE_INDEX);
                continue;
            }
            let range = allocation.view_first..allocation.view_first + allocation.view_count;
            assert!(range.end as usize <= views.len());
            for index in range {
                assert!(!covered.contains(&index));
                covered.push(index);
            }
        }
        // Points, spots, directional: 2 + 2 + 1 granted casters.
        assert_eq!(covered.len(), 5);
        assert_eq!(allocations[LightType::Point.as_u32() as usize].view_count, 2);
        assert_eq!(allocations[LightType::Spot.as_u32() as usize].view_count, 2);
        assert_eq!(
            allocations[LightType::Directional.as_u32() as usize].view_count,
            1
        );
    }

    #[test]
    fn test_granted_tiles_stay_within_budget() {
        let mut views = make_views(&[
            (LightType::Point, true),
            (LightType::Point, true),
            (LightType::Point, true),
        ]);
        sort_visible_lights(&mut views);
        let (_, _) = classify(&mut views, 2);
        let granted: Vec<_> = views
            .iter()
            .filter(|v| v.shadowmap_index != NONE_INDEX)
            .collect();
        assert_eq!(granted.len(), 2);
        assert!(granted.iter().all(|v| v.shadowmap_index < 2));
    }

    #[test]
    fn test_directional_needs_full_cascade_block() {
        let mut views = make_views(&[
            (LightType::Point, true),
            (LightType::Point, true),
            (LightType::Directional, true),
        ]);
        sort_visible_lights(&mut views);
        let (allocations, _) = classify(&mut views, 4);

        // Two tiles remain after the points, not enough for four cascades.
        let directional = views
            .iter()
            .find(|v| v.light_type == LightType::Directional)
            .unwrap();
        assert_eq!(directional.shadowmap_index, NONE_INDEX);
        assert_eq!(
            allocations[LightType::Directional.as_u32() as usize].view_count,
            0
        );
        let points: Vec<_> = views
            .iter()
            .filter(|v| v.light_type == LightType::Point)
            .collect();
        assert!(points.iter().all(|v| v.shadowmap_index != NONE_INDEX));
    }

    #[test]
    fn test_projection_slots_per_type() {
        let mut views = make_views(&[
            (LightType::Point, false),
            (LightType::Spot, false),
            (LightType::Spot, false),
            (LightType::Directional, false),
        ]);
        sort_visible_lights(&mut views);
        let (_, projection_count) = classify(&mut views, 32);

        assert_eq!(views[0].projection_index, 0);
        assert_eq!(views[1].projection_index, 0);
        assert_eq!(views[2].projection_index, 1);
        assert_eq!(views[3].projection_index, 2);
        // Two spot slots plus one cascade block.
        assert_eq!(projection_count, 2 + SHADOW_BATCH_SIZE);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let mut views = make_views(&[
            (LightType::Spot, true),
            (LightType::Point, true),
            (LightType::Directional, true),
            (LightType::Point, false),
        ]);
        sort_visible_lights(&mut views);
        let (first_allocations, first_projections) = classify(&mut views, 8);
        let snapshot: Vec<_> = views
            .iter()
            .map(|v| (v.linear_index, v.shadowmap_index, v.projection_index))
            .collect();

        let (second_allocations, second_projections) = classify(&mut views, 8);
        let repeat: Vec<_> = views
            .iter()
            .map(|v| (v.linear_index, v.shadowmap_index, v.projection_index))
            .collect();
        assert_eq!(snapshot, repeat);
        assert_eq!(first_allocations, second_allocations);
        assert_eq!(first_projections, second_projections);
    }

    #[test]
    fn test_ten_spot_casters_batch_as_four_four_two() {
        let specs = vec![(LightType::Spot, true); 10];
        let mut views = make_views(&specs);
        sort_visible_lights(&mut views);
        let (allocations, _) = classify(&mut views, 16);

        let spots = &allocations[LightType::Spot.as_u32() as usize];
        assert_eq!(spots.view_first, 0);
        assert_eq!(spots.view_count, 10);
        assert_eq!(spots.batch_count(), 3);
        assert_eq!(spots.batch_size(0), 4);
        assert_eq!(spots.batch_size(1), 4);
        assert_eq!(spots.batch_size(2), 2);
        assert_eq!(spots.batch_base(1), 4);
        assert_eq!(spots.batch_tiles(2), 2);
    }

    #[test]
    fn test_directional_batch_is_the_cascade_block() {
        let mut views = make_views(&[(LightType::Directional, true)]);
        let (allocations, _) = classify(&mut views, 4);
        let directional = &allocations[LightType::Directional.as_u32() as usize];
        assert_eq!(directional.view_count, 1);
        assert_eq!(directional.batch_count(), 1);
        assert_eq!(directional.batch_size(0), 1);
        assert_eq!(directional.batch_tiles(0), SHADOW_BATCH_SIZE);
    }

    #[test]
    fn test_empty_views_classify_to_empty_allocations() {
        let (allocations, projection_count) = classify(&mut [], 32);
        assert_eq!(projection_count, 0);
        for allocation in &allocations {
            assert_eq!(allocation.view_first, NONE_INDEX);
            assert_eq!(allocation.view_count, 0);
            assert_eq!(allocation.batch_count(), 0);
        }
    }
}
