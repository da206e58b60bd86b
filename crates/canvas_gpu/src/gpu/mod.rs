//! GPU abstraction layer
//!
//! The native graphics API is reached only through the [`GpuDevice`] trait.
//! Handles are ash `vk::*` handle types so the Vulkan backend passes them
//! straight through, while the headless backend mints its own.

/// Error taxonomy and the fatal-check macro
pub mod error;
/// Device trait and the shared device context
pub mod device;
/// Recorded command lists
pub mod commands;
/// Binding kinds written into binding tables
pub mod binding;
/// ash-backed Vulkan implementation
pub mod vulkan;
/// CPU-memory implementation for tests and offscreen runs
pub mod headless;

pub use error::{GpuError, GpuResult};
pub use device::{DeviceContext, GpuDevice, SamplerDesc, SubmitSync};
pub use commands::{Command, CommandList, ImageBarrier};
pub use binding::{BindingSlot, DescriptorBinding};
