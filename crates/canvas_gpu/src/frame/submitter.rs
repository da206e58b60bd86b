//! Per-frame draw submission

use ash::vk;
use std::time::Duration;

use super::pipeline::FramePipeline;
use crate::binding::{BindingTableAllocator, PoolGrowth};
use crate::draw::{DrawCommand, FrameTarget, Vertex2d};
use crate::gpu::{Command, GpuResult};
use crate::texture::TextureRegistry;

/// What one `submit_frame` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Slot the frame was recorded into
    pub slot: usize,
    /// Indexed draws recorded
    pub draw_calls: usize,
    /// Vertex bytes written
    pub vertex_bytes: usize,
    /// Index bytes written
    pub index_bytes: usize,
    /// Time spent waiting for the slot's previous frame
    pub gpu_sync_time: Duration,
    /// How the slot's binding pool changed
    pub pool_growth: PoolGrowth,
}

/// Records and submits one frame into a slot
pub struct DrawSubmitter {
    clear_color: [f32; 4],
    last_stats: Option<FrameStats>,
}

impl DrawSubmitter {
    pub const fn new(clear_color: [f32; 4]) -> Self {
        Self {
            clear_color,
            last_stats: None,
        }
    }

    /// Stats of the most recent frame, if any
    pub const fn last_frame_stats(&self) -> Option<FrameStats> {
        self.last_stats
    }

    /// Record `draws` into slot `slot_index` and submit them.
    ///
    /// Blocks until the slot's previous frame has left the GPU. Draws are
    /// recorded in the given order, which is also their layering order.
    pub fn submit_frame(
        &mut self,
        pipeline: &mut FramePipeline,
        allocator: &mut BindingTableAllocator,
        registry: &TextureRegistry,
        slot_index: usize,
        draws: &[DrawCommand],
        vertices: &[Vertex2d],
        indices: &[u32],
        target: &FrameTarget,
    ) -> GpuResult<FrameStats> {
        let mut vertex_offsets = Vec::with_capacity(draws.len());
        for (i, draw) in draws.iter().enumerate() {
            let Ok(vertex_offset) = i32::try_from(draw.vertex_range.start) else {
                panic!("draw {i} vertex offset {} does not fit a signed 32-bit offset", draw.vertex_range.start);
            };
            vertex_offsets.push(vertex_offset);
            assert!(
                draw.index_range.start <= draw.index_range.end && draw.index_range.end as usize <= indices.len(),
                "draw {i} index range {:?} exceeds {} indices",
                draw.index_range,
                indices.len()
            );
            assert!(
                draw.vertex_range.start <= draw.vertex_range.end && draw.vertex_range.end as usize <= vertices.len(),
                "draw {i} vertex range {:?} exceeds {} vertices",
                draw.vertex_range,
                vertices.len()
            );
        }

        let slot = pipeline.slot_mut(slot_index);
        let gpu_sync_time = slot.begin()?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        slot.vertex_buffer.write(vertex_bytes)?;
        slot.index_buffer.write(index_bytes)?;

        let pool_growth = allocator.bind_draws(slot_index, draws, registry)?;

        let commands = &mut slot.commands;
        commands.push(Command::BeginRenderPass {
            render_pass: target.render_pass,
            framebuffer: target.framebuffer,
            extent: target.extent,
            clear_color: self.clear_color,
        });

        let has_geometry = !vertices.is_empty() && !indices.is_empty();
        if has_geometry && !draws.is_empty() {
            commands.push(Command::BindPipeline(target.pipeline.pipeline));
            commands.push(Command::BindVertexBuffer(slot.vertex_buffer.handle()));
            commands.push(Command::BindIndexBuffer(slot.index_buffer.handle()));
            #[allow(clippy::cast_precision_loss)]
            let (width, height) = (target.extent.width as f32, target.extent.height as f32);
            commands.push(Command::SetViewport { width, height });

            let mut scissor = None;
            for (i, draw) in draws.iter().enumerate() {
                let rect = draw.clip_rect.to_scissor(target.extent);
                if scissor != Some(rect) {
                    let (x, y, width, height) = rect;
                    commands.push(Command::SetScissor { x, y, width, height });
                    scissor = Some(rect);
                }

                commands.push(Command::PushConstants {
                    layout: target.pipeline.layout,
                    stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    bytes: draw.transform_bytes(),
                });
                commands.push(Command::BindBindingTables {
                    layout: target.pipeline.layout,
                    first_set: 0,
                    tables: allocator.tables_for_draw(slot_index, i).to_vec(),
                });
                commands.push(Command::DrawIndexed {
                    index_count: draw.index_range.end - draw.index_range.start,
                    first_index: draw.index_range.start,
                    vertex_offset: vertex_offsets[i],
                });
            }
        }
        commands.push(Command::EndRenderPass);

        let draw_calls = commands.draw_count();
        let wait = Some(target.image_available).filter(|s| *s != vk::Semaphore::null());
        let signal = Some(target.render_finished).filter(|s| *s != vk::Semaphore::null());
        slot.submit(wait, signal)?;

        let stats = FrameStats {
            slot: slot_index,
            draw_calls,
            vertex_bytes: vertex_bytes.len(),
            index_bytes: index_bytes.len(),
            gpu_sync_time,
            pool_growth,
        };
        log::debug!(
            "Frame slot {}: {} draws, {} vertex bytes, {} index bytes, waited {:?}",
            slot_index,
            draw_calls,
            stats.vertex_bytes,
            stats.index_bytes,
            gpu_sync_time
        );
        self.last_stats = Some(stats);
        Ok(stats)
    }
}
