//! Frame slots

use ash::vk;
use std::time::{Duration, Instant};

use super::buffer::HostBuffer;
use crate::gpu::{CommandList, DeviceContext, GpuResult, SubmitSync};

/// Where a slot is in its CPU/GPU hand-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Free for the CPU once its fence has signaled
    Idle,
    /// Owned by the CPU, being filled
    Recording,
    /// Owned by the GPU until its fence signals
    Submitted,
}

/// One rotating set of per-frame resources
pub struct FrameSlot {
    ctx: DeviceContext,
    index: usize,
    pub(crate) vertex_buffer: HostBuffer,
    pub(crate) index_buffer: HostBuffer,
    pub(crate) commands: CommandList,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    state: SlotState,
}

impl FrameSlot {
    /// Slot whose fence starts signaled, so the first acquire does not block
    pub fn new(ctx: DeviceContext, index: usize) -> GpuResult<Self> {
        let device = ctx.device();
        let command_buffer = device.create_command_buffer()?;
        let fence = device.create_fence(true)?;

        Ok(Self {
            vertex_buffer: HostBuffer::new(ctx.clone(), vk::BufferUsageFlags::VERTEX_BUFFER),
            index_buffer: HostBuffer::new(ctx.clone(), vk::BufferUsageFlags::INDEX_BUFFER),
            ctx,
            index,
            commands: CommandList::new(),
            command_buffer,
            fence,
            state: SlotState::Idle,
        })
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn state(&self) -> SlotState {
        self.state
    }

    /// Fence armed by this slot's last submission
    pub const fn fence(&self) -> vk::Fence {
        self.fence
    }

    pub const fn vertex_buffer(&self) -> &HostBuffer {
        &self.vertex_buffer
    }

    pub const fn index_buffer(&self) -> &HostBuffer {
        &self.index_buffer
    }

    /// Block until the GPU is done with this slot, then take it for recording.
    ///
    /// Returns how long the wait took.
    pub fn begin(&mut self) -> GpuResult<Duration> {
        let started = Instant::now();
        let device = self.ctx.device();
        device.wait_fence(self.fence, self.ctx.fence_timeout())?;
        let waited = started.elapsed();

        device.reset_fence(self.fence)?;
        self.state = SlotState::Recording;
        self.commands.clear();
        Ok(waited)
    }

    /// Record the slot's command list and hand it to the GPU
    pub fn submit(&mut self, wait: Option<vk::Semaphore>, signal: Option<vk::Semaphore>) -> GpuResult<()> {
        debug_assert_eq!(self.state, SlotState::Recording, "slot {} submitted without begin", self.index);

        let device = self.ctx.device();
        device.record_commands(self.command_buffer, &self.commands)?;
        device.submit(
            self.command_buffer,
            &SubmitSync {
                wait_semaphore: wait,
                signal_semaphore: signal,
                fence: self.fence,
            },
        )?;
        self.state = SlotState::Submitted;
        Ok(())
    }

    /// Release every native object; the slot's fence must have signaled
    pub(crate) fn destroy(&mut self) {
        let device = self.ctx.device();
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        if self.command_buffer != vk::CommandBuffer::null() {
            device.free_command_buffer(self.command_buffer);
            self.command_buffer = vk::CommandBuffer::null();
        }
        if self.fence != vk::Fence::null() {
            device.destroy_fence(self.fence);
            self.fence = vk::Fence::null();
        }
        self.state = SlotState::Idle;
    }
}
