//! Render pass abstraction for reducing wgpu boilerplate.
//!
//! Provides [`RenderPassBuilder`] for declarative render pass configuration
//! and [`FrameEncoder`] for managing per-frame command encoding lifecycle.
//! All passes target offscreen texture views; there is no surface involved.

use std::sync::Arc;

use crate::targets::{SHADOW_DEPTH_CLEAR, moment_clear};

/// Builder for configuring render pass descriptors with a fluent API.
#[derive(Debug)]
pub struct RenderPassBuilder {
    clear_color: wgpu::Color,
    load_color: bool,
    depth_clear: Option<f32>,
    label: Option<&'static str>,
}

impl Default for RenderPassBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPassBuilder {
    /// Create a new render pass builder clearing color to transparent black.
    pub fn new() -> Self {
        Self {
            clear_color: wgpu::Color::TRANSPARENT,
            load_color: false,
            depth_clear: None,
            label: None,
        }
    }

    /// Set the clear color for the color attachment.
    pub fn clear_color(mut self, color: wgpu::Color) -> Self {
        self.clear_color = color;
        self.load_color = false;
        self
    }

    /// Clear to unoccluded moments for the given far distance.
    pub fn clear_moments(self, max_distance: f32) -> Self {
        self.clear_color(moment_clear(max_distance))
    }

    /// Load the existing color contents instead of clearing.
    pub fn load_color(mut self) -> Self {
        self.load_color = true;
        self
    }

    /// Attach a depth view cleared to the reverse-Z far value.
    pub fn depth(mut self) -> Self {
        self.depth_clear = Some(SHADOW_DEPTH_CLEAR);
        self
    }

    /// Attach a depth view with a custom clear value.
    pub fn depth_with_clear(mut self, clear_value: f32) -> Self {
        self.depth_clear = Some(clear_value);
        self
    }

    /// Set debug label for the render pass.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Begin a render pass targeting `color_view`, with `depth_view` attached
    /// when a depth clear was configured.
    pub fn begin<'encoder>(
        &self,
        encoder: &'encoder mut wgpu::CommandEncoder,
        color_view: &'encoder wgpu::TextureView,
        depth_view: Option<&'encoder wgpu::TextureView>,
    ) -> wgpu::RenderPass<'encoder> {
        let color_attachment = wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: if self.load_color {
                    wgpu::LoadOp::Load
                } else {
                    wgpu::LoadOp::Clear(self.clear_color)
                },
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        };

        let depth_stencil_attachment = match (self.depth_clear, depth_view) {
            (Some(clear_value), Some(view)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_value),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            _ => None,
        };

        let descriptor = wgpu::RenderPassDescriptor {
            label: self.label,
            color_attachments: &[Some(color_attachment)],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        };

        encoder.begin_render_pass(&descriptor)
    }
}

/// Manages per-frame command encoding lifecycle with automatic submission.
pub struct FrameEncoder {
    encoder: Option<wgpu::CommandEncoder>,
    queue: Arc<wgpu::Queue>,
    submitted: bool,
}

impl FrameEncoder {
    /// Create a new frame encoder for the given device and queue.
    pub fn new(device: &wgpu::Device, queue: Arc<wgpu::Queue>) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });

        Self {
            encoder: Some(encoder),
            queue,
            submitted: false,
        }
    }

    /// The underlying command encoder for pass recording.
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder
            .as_mut()
            .expect("FrameEncoder already submitted")
    }

    /// Begin a compute pass with the given label.
    pub fn begin_compute_pass(&mut self, label: &'static str) -> wgpu::ComputePass<'_> {
        self.encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            })
    }

    /// Returns a reference to the queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Submit the command buffer to the queue.
    /// Consumes self to prevent double-submission.
    pub fn submit(mut self) {
        if self.submitted {
            return;
        }

        if let Some(encoder) = self.encoder.take() {
            let command_buffer = encoder.finish();
            self.queue.submit([command_buffer]);
            self.submitted = true;
        }
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        if !self.submitted
            && let Some(encoder) = self.encoder.take()
        {
            log::warn!("FrameEncoder dropped without explicit submit() - auto-submitting");
            let command_buffer = encoder.finish();
            self.queue.submit([command_buffer]);
            self.submitted = true;
        }
    }
}
