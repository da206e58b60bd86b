//! Device memory helpers

use ash::vk;

use crate::gpu::error::{GpuError, GpuResult};

/// Find a memory type allowed by `type_filter` that has every flag in `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> GpuResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(GpuError::NoSuitableMemoryType)
}
