//! Growable host-visible buffer

use ash::vk;

use crate::gpu::{DeviceContext, GpuResult};

/// Host-writable, GPU-readable buffer that is rewritten every frame.
///
/// The native buffer is only replaced when new data does not fit. Callers
/// must not write while the GPU may still read the buffer.
pub struct HostBuffer {
    ctx: DeviceContext,
    usage: vk::BufferUsageFlags,
    buffer: vk::Buffer,
    capacity: u64,
    len: u64,
}

impl HostBuffer {
    /// Empty buffer; nothing is allocated until the first write
    pub fn new(ctx: DeviceContext, usage: vk::BufferUsageFlags) -> Self {
        Self {
            ctx,
            usage,
            buffer: vk::Buffer::null(),
            capacity: 0,
            len: 0,
        }
    }

    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes written by the last non-empty write
    pub const fn len(&self) -> u64 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `bytes` to the start of the buffer, growing it first if needed.
    ///
    /// Empty input leaves the buffer untouched. Returns whether the native
    /// buffer was replaced.
    pub fn write(&mut self, bytes: &[u8]) -> GpuResult<bool> {
        if bytes.is_empty() {
            return Ok(false);
        }

        let len = bytes.len() as u64;
        let grew = len > self.capacity;
        if grew {
            self.grow(len)?;
        }

        self.ctx.device().map_buffer(self.buffer, &mut |mapped: &mut [u8]| {
            mapped[..bytes.len()].copy_from_slice(bytes);
        })?;
        self.len = len;
        Ok(grew)
    }

    fn grow(&mut self, required: u64) -> GpuResult<()> {
        let capacity = required.max(self.capacity * 2).next_power_of_two();
        let device = self.ctx.device();

        let buffer = device.create_buffer(capacity, self.usage)?;
        if self.buffer != vk::Buffer::null() {
            device.destroy_buffer(self.buffer);
        }
        log::debug!("Host buffer grew from {} to {} bytes", self.capacity, capacity);

        self.buffer = buffer;
        self.capacity = capacity;
        Ok(())
    }

    pub(crate) fn destroy(&mut self) {
        if self.buffer != vk::Buffer::null() {
            self.ctx.device().destroy_buffer(self.buffer);
            self.buffer = vk::Buffer::null();
        }
        self.capacity = 0;
        self.len = 0;
    }
}
