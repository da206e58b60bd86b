//! Native primitive seam
//!
//! [`GpuDevice`] lists every primitive the texture manager and the frame
//! submitter need from the graphics API. Components never reach a device
//! through globals: each one is handed a [`DeviceContext`] at construction.

use ash::vk;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::binding::{BindingSlot, DescriptorBinding};
use super::commands::CommandList;
use super::error::GpuResult;

/// Sampler creation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Magnification and minification filter
    pub filter: vk::Filter,
    /// Address mode for u, v and w
    pub address_mode: vk::SamplerAddressMode,
    /// Maximum anisotropy; anisotropic filtering is disabled at 1.0
    pub max_anisotropy: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 1.0,
        }
    }
}

/// Synchronization attached to a queue submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitSync {
    /// Semaphore waited on at color attachment output, if any
    pub wait_semaphore: Option<vk::Semaphore>,
    /// Semaphore signaled when the work completes, if any
    pub signal_semaphore: Option<vk::Semaphore>,
    /// Fence signaled when the work completes
    pub fence: vk::Fence,
}

impl SubmitSync {
    /// Fence-only submission, as used by uploads
    pub fn fence_only(fence: vk::Fence) -> Self {
        Self { fence, ..Self::default() }
    }
}

/// Primitive operations of the native graphics layer.
///
/// Buffers are host-visible and coherent; images are device-local. All
/// methods take `&self`: a backend serializes its own bookkeeping, callers are
/// expected to drive it from a single render thread.
pub trait GpuDevice: Send + Sync {
    /// Create a host-visible buffer of `size` bytes
    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> GpuResult<vk::Buffer>;

    /// Map the whole buffer, hand it to `write`, then unmap
    fn map_buffer(&self, buffer: vk::Buffer, write: &mut dyn FnMut(&mut [u8])) -> GpuResult<()>;

    /// Destroy a buffer and release its memory
    fn destroy_buffer(&self, buffer: vk::Buffer);

    /// Create a device-local 2D image with one mip level and one layer
    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> GpuResult<vk::Image>;

    /// Create a color view over the whole image
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> GpuResult<vk::ImageView>;

    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Destroy an image and release its memory
    fn destroy_image(&self, image: vk::Image);

    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<vk::Sampler>;

    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    /// Create a binding table layout
    fn create_binding_layout(&self, slots: &[BindingSlot]) -> GpuResult<vk::DescriptorSetLayout>;

    /// Destroy a binding table layout
    fn destroy_binding_layout(&self, layout: vk::DescriptorSetLayout);

    /// Create a pool able to hold `max_tables` tables of `slots_per_table` image bindings each
    fn create_binding_pool(&self, max_tables: u32, slots_per_table: u32) -> GpuResult<vk::DescriptorPool>;

    /// Destroy a pool; every table allocated from it becomes invalid
    fn destroy_binding_pool(&self, pool: vk::DescriptorPool);

    /// Allocate `count` tables with `layout` from `pool`
    fn allocate_binding_tables(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> GpuResult<Vec<vk::DescriptorSet>>;

    /// Write one binding into a table
    fn write_binding_table(&self, table: vk::DescriptorSet, binding: u32, resource: &DescriptorBinding);

    /// Allocate a primary command buffer
    fn create_command_buffer(&self) -> GpuResult<vk::CommandBuffer>;

    /// Free a command buffer
    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer);

    /// Reset `command_buffer` and record `commands` into it
    fn record_commands(&self, command_buffer: vk::CommandBuffer, commands: &CommandList) -> GpuResult<()>;

    /// Submit a recorded command buffer to the queue
    fn submit(&self, command_buffer: vk::CommandBuffer, sync: &SubmitSync) -> GpuResult<()>;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> GpuResult<vk::Fence>;

    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> GpuResult<()>;

    /// Block until `fence` signals or `timeout` elapses
    fn wait_fence(&self, fence: vk::Fence, timeout: Duration) -> GpuResult<()>;

    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);

    /// Create a binary semaphore
    fn create_semaphore(&self) -> GpuResult<vk::Semaphore>;

    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Block until the queue has finished all submitted work or `timeout` elapses
    fn queue_wait_idle(&self, timeout: Duration) -> GpuResult<()>;
}

/// Immutable device bundle shared by every component
#[derive(Clone)]
pub struct DeviceContext {
    device: Arc<dyn GpuDevice>,
    fence_timeout: Duration,
}

impl DeviceContext {
    /// Wrap a device with the timeout applied to every fence wait
    pub fn new(device: Arc<dyn GpuDevice>, fence_timeout: Duration) -> Self {
        Self { device, fence_timeout }
    }

    /// The underlying device
    pub fn device(&self) -> &dyn GpuDevice {
        self.device.as_ref()
    }

    /// Bound for fence waits
    pub const fn fence_timeout(&self) -> Duration {
        self.fence_timeout
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("fence_timeout", &self.fence_timeout)
            .finish_non_exhaustive()
    }
}
