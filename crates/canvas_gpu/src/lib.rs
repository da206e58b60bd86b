//! # Canvas GPU
//!
//! GPU-resident texture management and frame-pipelined draw submission for
//! 2D canvas/UI rendering on Vulkan.
//!
//! ## Features
//!
//! - **Texture Registry**: Owns GPU images behind opaque, never-reused handles
//! - **Batched Uploads**: One command list and one fence wait per tick
//! - **Frames In Flight**: N rotating frame slots, each guarded by its own fence
//! - **Binding Tables**: Per-slot descriptor pools with a two-tier growth path
//! - **Headless Backend**: A CPU-memory device for tests and offscreen tooling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use canvas_gpu::prelude::*;
//! use std::sync::Arc;
//!
//! let device = Arc::new(HeadlessDevice::new(CompletionMode::Immediate));
//! let config = RendererConfig::default();
//! let ctx = DeviceContext::new(device, config.fence_timeout());
//! let mut renderer = CanvasRenderer::new(ctx, config);
//!
//! let pixels = [255u8, 0, 0];
//! let handle = renderer.add_texture(PixelView::new(&pixels, 1, 1, PixelFormat::Rgb888), false);
//! renderer.tick();
//! renderer.remove_texture(handle);
//! renderer.collect_garbage();
//! ```

pub mod gpu;
pub mod texture;
pub mod binding;
pub mod frame;
pub mod draw;
pub mod config;
pub mod foundation;

mod renderer;

pub use renderer::CanvasRenderer;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        CanvasRenderer,
        config::{Config, ConfigError, RendererConfig},
        draw::{CanvasPipeline, ClipRect, DrawCommand, FrameTarget, Vertex2d},
        frame::FrameStats,
        gpu::{
            DeviceContext, GpuDevice, GpuError, GpuResult,
            headless::{CompletionMode, HeadlessDevice},
            vulkan::VulkanDevice,
        },
        texture::{PixelFormat, PixelView, TextureHandle},
    };
}
