//! GPU device initialization for offscreen rendering.
//!
//! Provides [`RenderContext`] which owns all wgpu GPU state, and
//! [`RenderContextError`] for clear diagnostics when initialization fails.
//! All shadow and cluster work renders offscreen, so no surface is created.

/// Error type for render context initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Owns all GPU state: instance, adapter, device, and queue.
pub struct RenderContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl RenderContext {
    /// Initialize the GPU asynchronously.
    pub async fn new() -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(RenderContextError::NoAdapter),
        };

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("candela-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: Default::default(),
                ..Default::default()
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// Blocking wrapper around [`RenderContext::new`] for synchronous startup.
pub fn init_render_context_blocking() -> Result<RenderContext, RenderContextError> {
    pollster::block_on(RenderContext::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_init_or_no_adapter() {
        // Headless CI machines may have no GPU; both outcomes are valid.
        match init_render_context_blocking() {
            Ok(ctx) => {
                assert!(ctx.device.limits().max_texture_dimension_2d >= 2048);
            }
            Err(RenderContextError::NoAdapter) => {}
            Err(other) => panic!("unexpected init failure: {other}"),
        }
    }
}
