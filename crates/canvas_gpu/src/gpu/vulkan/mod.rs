//! Vulkan backend
//!
//! [`VulkanDevice`] drives an externally created `ash::Device` and graphics
//! queue. Instance, surface and swapchain stay with the caller; this backend
//! only owns a command pool and the memory it allocates for buffers and images.

mod memory;
mod record;

pub use memory::find_memory_type;

use ash::vk::{self, Handle};
use ash::{Device, Instance};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::binding::{BindingSlot, DescriptorBinding};
use super::commands::{CommandList, COLOR_SUBRESOURCE};
use super::device::{GpuDevice, SamplerDesc, SubmitSync};
use super::error::{GpuError, GpuResult};

struct Allocation {
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

/// Objects that Vulkan requires to be externally synchronized
struct Shared {
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    buffer_memory: HashMap<u64, Allocation>,
    image_memory: HashMap<u64, vk::DeviceMemory>,
}

/// [`GpuDevice`] over a live Vulkan device
pub struct VulkanDevice {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    shared: Mutex<Shared>,
}

impl VulkanDevice {
    /// Wrap an existing logical device and its graphics queue
    pub fn new(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        device: Device,
        queue: vk::Queue,
        queue_family_index: u32,
    ) -> GpuResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        log::debug!("Vulkan device wrapped, queue family {}", queue_family_index);

        Ok(Self {
            device,
            memory_properties,
            shared: Mutex::new(Shared {
                queue,
                command_pool,
                buffer_memory: HashMap::new(),
                image_memory: HashMap::new(),
            }),
        })
    }

    /// The wrapped logical device
    pub const fn device(&self) -> &Device {
        &self.device
    }

    fn wait_bounded(&self, fence: vk::Fence, timeout: Duration, operation: &'static str) -> GpuResult<()> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { self.device.wait_for_fences(&[fence], true, nanos) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GpuError::Timeout { operation, timeout }),
            Err(error) => Err(error.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> GpuResult<vk::DeviceMemory> {
        let memory_type_index =
            find_memory_type(&self.memory_properties, requirements.memory_type_bits, properties)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        Ok(unsafe { self.device.allocate_memory(&alloc_info, None)? })
    }
}

impl GpuDevice for VulkanDevice {
    fn create_buffer(&self, size: u64, usage: vk::BufferUsageFlags) -> GpuResult<vk::Buffer> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = match self.allocate(
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(memory) => memory,
            Err(error) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(error);
            }
        };

        if let Err(error) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(error.into());
        }

        self.lock().buffer_memory.insert(buffer.as_raw(), Allocation { memory, size });
        Ok(buffer)
    }

    fn map_buffer(&self, buffer: vk::Buffer, write: &mut dyn FnMut(&mut [u8])) -> GpuResult<()> {
        let (memory, size) = self
            .lock()
            .buffer_memory
            .get(&buffer.as_raw())
            .map(|a| (a.memory, a.size))
            .ok_or(GpuError::UnknownObject {
                kind: "buffer",
                raw: buffer.as_raw(),
            })?;
        let len = usize::try_from(size).map_err(|_| GpuError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED))?;

        unsafe {
            let ptr = self.device.map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?;
            write(std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len));
            self.device.unmap_memory(memory);
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let allocation = self.lock().buffer_memory.remove(&buffer.as_raw());
        unsafe {
            self.device.destroy_buffer(buffer, None);
            if let Some(allocation) = allocation {
                self.device.free_memory(allocation.memory, None);
            }
        }
    }

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> GpuResult<vk::Image> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let image = unsafe { self.device.create_image(&image_info, None)? };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory = match self.allocate(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(memory) => memory,
            Err(error) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(error);
            }
        };

        if let Err(error) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
            return Err(error.into());
        }

        self.lock().image_memory.insert(image.as_raw(), memory);
        Ok(image)
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> GpuResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(COLOR_SUBRESOURCE);

        Ok(unsafe { self.device.create_image_view(&view_info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn destroy_image(&self, image: vk::Image) {
        let memory = self.lock().image_memory.remove(&image.as_raw());
        unsafe {
            self.device.destroy_image(image, None);
            if let Some(memory) = memory {
                self.device.free_memory(memory, None);
            }
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<vk::Sampler> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(desc.max_anisotropy > 1.0)
            .max_anisotropy(desc.max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        Ok(unsafe { self.device.create_sampler(&sampler_info, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_binding_layout(&self, slots: &[BindingSlot]) -> GpuResult<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = slots
            .iter()
            .map(|slot| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(slot.binding)
                    .descriptor_type(slot.descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(slot.stages)
                    .build()
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        Ok(unsafe { self.device.create_descriptor_set_layout(&layout_info, None)? })
    }

    fn destroy_binding_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_binding_pool(&self, max_tables: u32, slots_per_table: u32) -> GpuResult<vk::DescriptorPool> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: max_tables.saturating_mul(slots_per_table).max(1),
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(max_tables.max(1));

        Ok(unsafe { self.device.create_descriptor_pool(&pool_info, None)? })
    }

    fn destroy_binding_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_binding_tables(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> GpuResult<Vec<vk::DescriptorSet>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let layouts = vec![layout; count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        Ok(unsafe { self.device.allocate_descriptor_sets(&alloc_info)? })
    }

    fn write_binding_table(&self, table: vk::DescriptorSet, binding: u32, resource: &DescriptorBinding) {
        let image_info = [resource.image_info()];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(table)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(resource.descriptor_type())
            .image_info(&image_info)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn create_command_buffer(&self) -> GpuResult<vk::CommandBuffer> {
        let shared = self.lock();
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(shared.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };

        buffers
            .into_iter()
            .next()
            .ok_or(GpuError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        let shared = self.lock();
        unsafe { self.device.free_command_buffers(shared.command_pool, &[command_buffer]) };
    }

    fn record_commands(&self, command_buffer: vk::CommandBuffer, commands: &CommandList) -> GpuResult<()> {
        let _pool = self.lock();
        record::record(&self.device, command_buffer, commands)
    }

    fn submit(&self, command_buffer: vk::CommandBuffer, sync: &SubmitSync) -> GpuResult<()> {
        let wait_semaphores: Vec<vk::Semaphore> = sync.wait_semaphore.into_iter().collect();
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semaphores.len()];
        let signal_semaphores: Vec<vk::Semaphore> = sync.signal_semaphore.into_iter().collect();
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        let shared = self.lock();
        unsafe { self.device.queue_submit(shared.queue, &[submit_info], sync.fence)? };
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> GpuResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);

        Ok(unsafe { self.device.create_fence(&fence_info, None)? })
    }

    fn reset_fence(&self, fence: vk::Fence) -> GpuResult<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        Ok(())
    }

    fn wait_fence(&self, fence: vk::Fence, timeout: Duration) -> GpuResult<()> {
        self.wait_bounded(fence, timeout, "fence")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn create_semaphore(&self) -> GpuResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        Ok(unsafe { self.device.create_semaphore(&semaphore_info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn queue_wait_idle(&self, timeout: Duration) -> GpuResult<()> {
        // An empty batch signals its fence once all earlier work on the queue is done
        let fence = self.create_fence(false)?;
        let submitted = {
            let shared = self.lock();
            unsafe { self.device.queue_submit(shared.queue, &[], fence) }
        };
        let result = match submitted {
            Ok(()) => self.wait_bounded(fence, timeout, "queue idle"),
            Err(error) => Err(error.into()),
        };
        self.destroy_fence(fence);
        result
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            let _ = self.device.queue_wait_idle(shared.queue);
            self.device.destroy_command_pool(shared.command_pool, None);
        }

        if !shared.buffer_memory.is_empty() || !shared.image_memory.is_empty() {
            log::warn!(
                "Vulkan device dropped with {} buffers and {} images still allocated",
                shared.buffer_memory.len(),
                shared.image_memory.len()
            );
        }
    }
}
