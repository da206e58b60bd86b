//! Resource bindings written into binding tables
//!
//! A binding table is a descriptor set; each entry in it is one of the
//! [`DescriptorBinding`] kinds below.

use ash::vk;

/// One resource bound at a binding index of a binding table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorBinding {
    /// Sampled image and sampler in a single descriptor
    CombinedImageSampler {
        /// View of the sampled image
        view: vk::ImageView,
        /// Sampler used to read it
        sampler: vk::Sampler,
        /// Layout the image is in while sampled
        layout: vk::ImageLayout,
    },
    /// Sampled image without a sampler
    SampledImage {
        /// View of the sampled image
        view: vk::ImageView,
        /// Layout the image is in while sampled
        layout: vk::ImageLayout,
    },
    /// Standalone sampler
    Sampler(vk::Sampler),
}

impl DescriptorBinding {
    /// Shader-readable texture binding, the only kind the canvas draws need
    pub const fn texture(view: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self::CombinedImageSampler {
            view,
            sampler,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Vulkan descriptor type of this binding
    pub const fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::SampledImage { .. } => vk::DescriptorType::SAMPLED_IMAGE,
            Self::Sampler(_) => vk::DescriptorType::SAMPLER,
        }
    }

    /// Image info for the descriptor write
    pub fn image_info(&self) -> vk::DescriptorImageInfo {
        match *self {
            Self::CombinedImageSampler { view, sampler, layout } => vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            },
            Self::SampledImage { view, layout } => vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: layout,
            },
            Self::Sampler(sampler) => vk::DescriptorImageInfo {
                sampler,
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::UNDEFINED,
            },
        }
    }
}

/// Layout entry of a binding table: what kind of resource sits at `binding`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    /// Binding index inside the table
    pub binding: u32,
    /// Descriptor type expected at that index
    pub descriptor_type: vk::DescriptorType,
    /// Shader stages that read it
    pub stages: vk::ShaderStageFlags,
}

impl BindingSlot {
    /// Combined image sampler visible to vertex and fragment stages
    pub const fn texture(binding: u32) -> Self {
        Self {
            binding,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stages: vk::ShaderStageFlags::from_raw(
                vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_texture_binding_is_shader_read() {
        let view = vk::ImageView::from_raw(3);
        let sampler = vk::Sampler::from_raw(4);
        let binding = DescriptorBinding::texture(view, sampler);

        assert_eq!(binding.descriptor_type(), vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        let info = binding.image_info();
        assert_eq!(info.image_view, view);
        assert_eq!(info.sampler, sampler);
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_sampler_binding_has_no_view() {
        let binding = DescriptorBinding::Sampler(vk::Sampler::from_raw(9));
        assert_eq!(binding.descriptor_type(), vk::DescriptorType::SAMPLER);
        assert_eq!(binding.image_info().image_view, vk::ImageView::null());
    }

    #[test]
    fn test_texture_slot_stages() {
        let slot = BindingSlot::texture(0);
        assert!(slot.stages.contains(vk::ShaderStageFlags::VERTEX));
        assert!(slot.stages.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
