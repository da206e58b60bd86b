//! Batched texture uploads and the deletion sweep

use ash::vk;

use super::registry::{TextureHandle, TextureRegistry};
use crate::gpu::{Command, CommandList, DeviceContext, GpuResult, ImageBarrier, SubmitSync};

/// Moves staged pixels to the GPU once per tick
pub struct UploadScheduler {
    ctx: DeviceContext,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    commands: CommandList,
}

impl UploadScheduler {
    pub fn new(ctx: DeviceContext) -> GpuResult<Self> {
        let command_buffer = ctx.device().create_command_buffer()?;
        let fence = ctx.device().create_fence(false)?;
        Ok(Self {
            ctx,
            command_buffer,
            fence,
            commands: CommandList::new(),
        })
    }

    /// Upload every texture flagged `needs_upload` in one submission.
    ///
    /// Blocks until the GPU has finished the copies. Returns the number of
    /// textures uploaded; zero means nothing was recorded or submitted.
    pub fn flush(&mut self, registry: &mut TextureRegistry) -> GpuResult<usize> {
        self.commands.clear();
        let mut uploaded = Vec::new();

        for resource in registry.pending_uploads() {
            let Some(staging) = resource.staging_buffer() else {
                panic!("{} flagged for upload without staging data", resource.handle());
            };
            let image = resource.image();

            self.commands.push(Command::ImageBarrier(ImageBarrier::to_transfer_dst(
                image,
                resource.current_layout(),
            )));
            self.commands.push(Command::CopyBufferToImage {
                buffer: staging,
                image,
                extent: resource.extent(),
            });
            self.commands.push(Command::ImageBarrier(ImageBarrier::transfer_dst_to(
                image,
                resource.target_layout(),
            )));
            uploaded.push(resource.handle());
        }

        if uploaded.is_empty() {
            return Ok(0);
        }

        let device = self.ctx.device();
        device.record_commands(self.command_buffer, &self.commands)?;
        device.submit(self.command_buffer, &SubmitSync::fence_only(self.fence))?;
        device.wait_fence(self.fence, self.ctx.fence_timeout())?;
        device.reset_fence(self.fence)?;

        for handle in &uploaded {
            registry.finish_upload(*handle);
        }
        log::debug!("Uploaded {} textures", uploaded.len());
        Ok(uploaded.len())
    }

    /// Free every texture flagged for deletion.
    ///
    /// Waits once for the whole queue to go idle before the first free, since
    /// any frame slot may still sample a removed texture. Returns the freed
    /// handles so their binding-table entries can be dropped.
    pub fn collect_garbage(&mut self, registry: &mut TextureRegistry) -> GpuResult<Vec<TextureHandle>> {
        if !registry.has_pending_deletes() {
            return Ok(Vec::new());
        }

        self.ctx.device().queue_wait_idle(self.ctx.fence_timeout())?;
        let freed = registry.sweep_deleted();
        log::info!("Deletion sweep freed {} textures", freed.len());
        Ok(freed)
    }

    /// Release the command buffer and fence
    pub(crate) fn destroy(&mut self) {
        let device = self.ctx.device();
        if self.fence != vk::Fence::null() {
            device.destroy_fence(self.fence);
            self.fence = vk::Fence::null();
        }
        if self.command_buffer != vk::CommandBuffer::null() {
            device.free_command_buffer(self.command_buffer);
            self.command_buffer = vk::CommandBuffer::null();
        }
    }
}
