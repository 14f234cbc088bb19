//! Light classification, shadow atlas scheduling, and clustered light
//! assignment. The per-frame flow runs sort/classify, cascade fitting,
//! GPU packing, batched shadow rendering, and the cluster compute passes.

pub mod cascade;
pub mod classify;
pub mod cluster;
pub mod packer;
pub mod scheduler;
pub mod shadow_pass;

pub use cascade::{CASCADE_COUNT, CascadeSet, cascade_splits, fit_cascades};
pub use classify::{
    LIGHT_TYPE_COUNT, LightView, NONE_INDEX, SHADOW_BATCH_SIZE, ShadowTypeAllocation, classify,
    collect_views, sort_visible_lights,
};
pub use cluster::{CLUSTER_GRID, ClusterDriver, ClusterFrame};
pub use packer::{GpuLight, LightBuffers, PackedFrame, SPOT_Z_NEAR, pack_frame};
pub use scheduler::{CameraFrame, LightScheduler};
pub use shadow_pass::{ShadowFrame, ShadowmapRenderer};
