//! Command list recording
//!
//! Commands are recorded as plain data and handed to
//! [`GpuDevice::record_commands`](super::GpuDevice::record_commands), which
//! replays them into a native command buffer. Recording stays independent of
//! the backend, so the exact command stream of an upload or a frame can be
//! inspected.

use ash::vk;

/// Whole-image color subresource range, the only range canvas textures use
pub const COLOR_SUBRESOURCE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Layout hazard transition for a whole color image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image being transitioned
    pub image: vk::Image,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Accesses that must complete first
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the barrier
    pub dst_access: vk::AccessFlags,
    /// Stage the barrier waits on
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits on the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

impl ImageBarrier {
    /// Transition from `old_layout` into transfer destination before a copy
    pub const fn to_transfer_dst(image: vk::Image, old_layout: vk::ImageLayout) -> Self {
        Self {
            image,
            old_layout,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }
    }

    /// Transition from transfer destination into `new_layout` for fragment reads
    pub const fn transfer_dst_to(image: vk::Image, new_layout: vk::ImageLayout) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }
    }

    /// Native barrier structure
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(COLOR_SUBRESOURCE)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .build()
    }
}

/// A single recorded GPU command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Image layout transition
    ImageBarrier(ImageBarrier),
    /// Copy a tightly packed staging buffer into the whole image
    CopyBufferToImage {
        /// Source staging buffer
        buffer: vk::Buffer,
        /// Destination image, in TRANSFER_DST_OPTIMAL
        image: vk::Image,
        /// Image extent
        extent: vk::Extent2D,
    },
    /// Begin a render pass over the whole target
    BeginRenderPass {
        /// Render pass object
        render_pass: vk::RenderPass,
        /// Framebuffer of the acquired surface image
        framebuffer: vk::Framebuffer,
        /// Render area extent
        extent: vk::Extent2D,
        /// Clear color for the color attachment
        clear_color: [f32; 4],
    },
    /// End the current render pass
    EndRenderPass,
    /// Bind a graphics pipeline
    BindPipeline(vk::Pipeline),
    /// Bind the frame's vertex buffer at binding 0
    BindVertexBuffer(vk::Buffer),
    /// Bind the frame's 32-bit index buffer
    BindIndexBuffer(vk::Buffer),
    /// Set viewport 0 to a top-left anchored `width` x `height` area, depth 0..1
    SetViewport {
        /// Viewport width in pixels
        width: f32,
        /// Viewport height in pixels
        height: f32,
    },
    /// Set scissor 0
    SetScissor {
        /// Left edge, never negative
        x: i32,
        /// Top edge, never negative
        y: i32,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Inline constant block
    PushConstants {
        /// Pipeline layout declaring the range
        layout: vk::PipelineLayout,
        /// Stages that read the constants
        stages: vk::ShaderStageFlags,
        /// Constant bytes, written at offset 0
        bytes: Vec<u8>,
    },
    /// Bind binding tables starting at `first_set`
    BindBindingTables {
        /// Pipeline layout the tables are compatible with
        layout: vk::PipelineLayout,
        /// First set index
        first_set: u32,
        /// Tables to bind
        tables: Vec<vk::DescriptorSet>,
    },
    /// Indexed draw of a single instance
    DrawIndexed {
        /// Number of indices
        index_count: u32,
        /// First index in the bound index buffer
        first_index: u32,
        /// Value added to each index before fetching vertices
        vertex_offset: i32,
    },
}

/// Ordered list of commands awaiting replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<Command>,
}

impl CommandList {
    /// Create an empty command list
    pub const fn new() -> Self {
        Self { commands: Vec::new() }
    }

    /// Append a command
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Drop every recorded command, keeping the allocation
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Recorded commands in submission order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of indexed draws in the list
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, Command::DrawIndexed { .. }))
            .count()
    }
}
