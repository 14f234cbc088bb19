//! wgpu rendering backbone: headless device setup, buffer and target
//! management, draw batching, and the shadow, blur, and cluster pipelines.

pub mod batching;
pub mod blur;
pub mod buffer;
pub mod cluster_pipeline;
pub mod gpu;
pub mod growable;
pub mod pass;
pub mod shader;
pub mod shadow_pipeline;
pub mod targets;

pub use batching::{
    InstancedShadowDraw, ShadowBatch, ShadowDraw, ShadowGroup, batch_slot, clip_index,
    linear_index, pack_draw_key,
};
pub use blur::{
    BLUR_CUBE_SHADER_SOURCE, BLUR_SHADER_SOURCE, BlurParamsBinding, BlurPipeline, GAUSSIAN_WEIGHTS,
};
pub use buffer::{BufferAllocator, IndexData, MeshBuffer, MeshRegistry, VertexPosition};
pub use cluster_pipeline::{
    CLUSTER_ASSIGN_SHADER_SOURCE, CLUSTER_DEPTH_SHADER_SOURCE, CLUSTER_MAX_LIGHTS_PER_TILE,
    ClusterParams, ClusterPipelines, DEPTH_TILE_GROUP_SIZE, depth_reduce_groups, pack_tile_entry,
    tile_entry_count, tile_entry_offset,
};
pub use gpu::{RenderContext, RenderContextError, init_render_context_blocking};
pub use growable::GrowableBuffer;
pub use pass::{FrameEncoder, RenderPassBuilder};
pub use shader::{ShaderError, ShaderLibrary};
pub use shadow_pipeline::{SHADOW_SHADER_SOURCE, ShadowClipParams, ShadowPipeline};
pub use targets::{
    MOMENT_FORMAT, SHADOW_DEPTH_CLEAR, SHADOW_DEPTH_FORMAT, ShadowAtlas, ShadowTarget,
    cube_face_size, moment_clear,
};
