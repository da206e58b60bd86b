//! Replays a [`CommandList`] into a native command buffer

use ash::{vk, Device};

use crate::gpu::commands::{Command, CommandList, COLOR_SUBRESOURCE};
use crate::gpu::error::GpuResult;

/// Reset `command_buffer`, then record every command of `commands` into it
pub fn record(device: &Device, command_buffer: vk::CommandBuffer, commands: &CommandList) -> GpuResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(command_buffer, &begin_info)?;
    }

    for command in commands.commands() {
        replay(device, command_buffer, command);
    }

    unsafe { device.end_command_buffer(command_buffer)? };
    Ok(())
}

fn replay(device: &Device, cmd: vk::CommandBuffer, command: &Command) {
    match command {
        Command::ImageBarrier(barrier) => unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.to_vk()],
            );
        },
        Command::CopyBufferToImage { buffer, image, extent } => {
            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: COLOR_SUBRESOURCE.aspect_mask,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .build();

            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    *buffer,
                    *image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
        }
        Command::BeginRenderPass {
            render_pass,
            framebuffer,
            extent,
            clear_color,
        } => {
            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue { float32: *clear_color },
            }];
            let begin_info = vk::RenderPassBeginInfo::builder()
                .render_pass(*render_pass)
                .framebuffer(*framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: *extent,
                })
                .clear_values(&clear_values);

            unsafe { device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) };
        }
        Command::EndRenderPass => unsafe { device.cmd_end_render_pass(cmd) },
        Command::BindPipeline(pipeline) => unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, *pipeline);
        },
        Command::BindVertexBuffer(buffer) => unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[*buffer], &[0]);
        },
        Command::BindIndexBuffer(buffer) => unsafe {
            device.cmd_bind_index_buffer(cmd, *buffer, 0, vk::IndexType::UINT32);
        },
        Command::SetViewport { width, height } => {
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: *width,
                height: *height,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            unsafe { device.cmd_set_viewport(cmd, 0, &[viewport]) };
        }
        Command::SetScissor { x, y, width, height } => {
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: *x, y: *y },
                extent: vk::Extent2D {
                    width: *width,
                    height: *height,
                },
            };
            unsafe { device.cmd_set_scissor(cmd, 0, &[scissor]) };
        }
        Command::PushConstants { layout, stages, bytes } => unsafe {
            device.cmd_push_constants(cmd, *layout, *stages, 0, bytes);
        },
        Command::BindBindingTables {
            layout,
            first_set,
            tables,
        } => unsafe {
            device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, *layout, *first_set, tables, &[]);
        },
        Command::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
        } => unsafe {
            device.cmd_draw_indexed(cmd, *index_count, 1, *first_index, *vertex_offset, 0);
        },
    }
}
