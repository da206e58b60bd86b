//! Texture registry
//!
//! Sole owner of every GPU-resident texture. Callers hold [`TextureHandle`]s,
//! which are plain ids: a handle is never reused, so a stale handle can only
//! miss, never alias a newer texture.

use ash::vk;
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::fmt;

use super::format::{PixelFormat, PixelView};
use crate::gpu::{DescriptorBinding, DeviceContext, GpuResult, SamplerDesc};

/// Opaque id of a texture owned by a [`TextureRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(u64);

impl TextureHandle {
    /// Raw id value
    pub const fn id(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_id(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

bitflags! {
    /// Per-texture state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u8 {
        /// Staged pixels wait for the next upload flush
        const NEEDS_UPLOAD = 1 << 0;
        /// Removed by the caller, freed by the next deletion sweep
        const NEEDS_DELETE = 1 << 1;
        /// Keeps its staging buffer between uploads
        const REAL_TIME = 1 << 2;
    }
}

/// One GPU-resident 2D image and its staging state
#[derive(Debug)]
pub struct TextureResource {
    handle: TextureHandle,
    source_format: PixelFormat,
    gpu_format: vk::Format,
    extent: vk::Extent2D,
    current_layout: vk::ImageLayout,
    target_layout: vk::ImageLayout,
    image: vk::Image,
    view: vk::ImageView,
    staging_buffer: Option<vk::Buffer>,
    flags: TextureFlags,
}

impl TextureResource {
    pub const fn handle(&self) -> TextureHandle {
        self.handle
    }

    /// Format the caller supplied
    pub const fn source_format(&self) -> PixelFormat {
        self.source_format
    }

    /// Normalized format stored on the GPU
    pub const fn gpu_format(&self) -> vk::Format {
        self.gpu_format
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Layout before the next upload
    pub const fn current_layout(&self) -> vk::ImageLayout {
        self.current_layout
    }

    /// Layout after the next upload
    pub const fn target_layout(&self) -> vk::ImageLayout {
        self.target_layout
    }

    pub const fn image(&self) -> vk::Image {
        self.image
    }

    /// Sampled view used in binding tables
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    pub const fn staging_buffer(&self) -> Option<vk::Buffer> {
        self.staging_buffer
    }

    pub const fn flags(&self) -> TextureFlags {
        self.flags
    }

    pub const fn needs_upload(&self) -> bool {
        self.flags.contains(TextureFlags::NEEDS_UPLOAD)
    }

    pub const fn needs_delete(&self) -> bool {
        self.flags.contains(TextureFlags::NEEDS_DELETE)
    }

    pub const fn is_real_time(&self) -> bool {
        self.flags.contains(TextureFlags::REAL_TIME)
    }
}

/// Owns textures keyed by monotonically assigned handles
pub struct TextureRegistry {
    ctx: DeviceContext,
    resources: BTreeMap<TextureHandle, TextureResource>,
    next_handle: u64,
    sampler: vk::Sampler,
}

impl TextureRegistry {
    /// Create an empty registry and its shared sampler
    pub fn new(ctx: DeviceContext) -> GpuResult<Self> {
        let sampler = ctx.device().create_sampler(&SamplerDesc::default())?;
        Ok(Self {
            ctx,
            resources: BTreeMap::new(),
            next_handle: 0,
            sampler,
        })
    }

    /// Create a texture from `pixels` and stage it for the next upload
    pub fn add_texture(&mut self, pixels: PixelView<'_>, is_real_time: bool) -> GpuResult<TextureHandle> {
        assert!(
            pixels.width() > 0 && pixels.height() > 0,
            "texture extent must be non-zero, got {}x{}",
            pixels.width(),
            pixels.height()
        );

        let device = self.ctx.device();
        let format = pixels.format();
        let gpu_format = format.gpu_format();
        let image = device.create_image(
            pixels.extent(),
            gpu_format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )?;
        let view = device.create_image_view(image, gpu_format)?;
        let staging = self.stage(&pixels)?;

        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;

        let mut flags = TextureFlags::NEEDS_UPLOAD;
        flags.set(TextureFlags::REAL_TIME, is_real_time);

        self.resources.insert(
            handle,
            TextureResource {
                handle,
                source_format: format,
                gpu_format,
                extent: pixels.extent(),
                current_layout: vk::ImageLayout::UNDEFINED,
                target_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                image,
                view,
                staging_buffer: Some(staging),
                flags,
            },
        );

        log::info!(
            "Added {} ({}x{} {:?}, real-time: {})",
            handle,
            pixels.width(),
            pixels.height(),
            format,
            is_real_time
        );
        Ok(handle)
    }

    /// Replace the pixels of an existing texture
    pub fn update_texture(&mut self, handle: TextureHandle, pixels: PixelView<'_>) -> GpuResult<()> {
        let Some(resource) = self.resources.get(&handle) else {
            panic!("update of unknown {handle}");
        };

        assert!(!resource.needs_delete(), "update of {handle}, which is pending deletion");
        assert!(
            pixels.format() == resource.source_format && pixels.extent() == resource.extent,
            "update of {handle} with {}x{} {:?} does not match its {}x{} {:?}",
            pixels.width(),
            pixels.height(),
            pixels.format(),
            resource.extent.width,
            resource.extent.height,
            resource.source_format
        );

        let reusable = match resource.staging_buffer {
            Some(buffer) if resource.is_real_time() || resource.needs_upload() => Some(buffer),
            _ => None,
        };

        let staging = match reusable {
            Some(buffer) => {
                self.ctx
                    .device()
                    .map_buffer(buffer, &mut |bytes: &mut [u8]| pixels.write_normalized(bytes))?;
                buffer
            }
            None => self.stage(&pixels)?,
        };

        if let Some(resource) = self.resources.get_mut(&handle) {
            resource.staging_buffer = Some(staging);
            resource.flags.insert(TextureFlags::NEEDS_UPLOAD);
        }
        log::debug!("Staged update for {}", handle);
        Ok(())
    }

    /// Flag a texture for the next deletion sweep
    pub fn remove_texture(&mut self, handle: TextureHandle) {
        let Some(resource) = self.resources.get_mut(&handle) else {
            panic!("removal of unknown {handle}");
        };
        resource.flags.insert(TextureFlags::NEEDS_DELETE);
        log::info!("Flagged {} for deletion", handle);
    }

    /// Add a glyph atlas; atlases are rebuilt rather than streamed
    pub fn upload_font_atlas(&mut self, atlas: PixelView<'_>) -> GpuResult<TextureHandle> {
        let handle = self.add_texture(atlas, false)?;
        log::info!("Font atlas staged as {} ({}x{})", handle, atlas.width(), atlas.height());
        Ok(handle)
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&TextureResource> {
        self.resources.get(&handle)
    }

    /// Live textures, including those pending deletion
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Handles in ascending order
    pub fn handles(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.resources.keys().copied()
    }

    /// The sampler shared by every texture binding
    pub const fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Binding that samples `handle` in a fragment shader
    pub fn binding_for(&self, handle: TextureHandle) -> DescriptorBinding {
        let Some(resource) = self.resources.get(&handle) else {
            panic!("draw references unknown {handle}");
        };
        DescriptorBinding::texture(resource.view, self.sampler)
    }

    pub(crate) fn pending_uploads(&self) -> impl Iterator<Item = &TextureResource> {
        self.resources.values().filter(|r| r.needs_upload())
    }

    pub(crate) fn has_pending_deletes(&self) -> bool {
        self.resources.values().any(TextureResource::needs_delete)
    }

    /// Mark an upload as complete on the GPU
    pub(crate) fn finish_upload(&mut self, handle: TextureHandle) {
        let Some(resource) = self.resources.get_mut(&handle) else { return };

        resource.flags.remove(TextureFlags::NEEDS_UPLOAD);
        resource.current_layout = resource.target_layout;
        if !resource.is_real_time() {
            if let Some(buffer) = resource.staging_buffer.take() {
                self.ctx.device().destroy_buffer(buffer);
            }
        }
    }

    /// Destroy every texture flagged for deletion; the queue must be idle
    pub(crate) fn sweep_deleted(&mut self) -> Vec<TextureHandle> {
        let doomed: Vec<TextureHandle> = self
            .resources
            .values()
            .filter(|r| r.needs_delete())
            .map(TextureResource::handle)
            .collect();

        for handle in &doomed {
            if let Some(resource) = self.resources.remove(handle) {
                self.release(resource);
            }
        }
        doomed
    }

    /// Destroy every texture and the sampler; the queue must be idle
    pub(crate) fn destroy_all(&mut self) {
        for (_, resource) in std::mem::take(&mut self.resources) {
            self.release(resource);
        }
        if self.sampler != vk::Sampler::null() {
            self.ctx.device().destroy_sampler(self.sampler);
            self.sampler = vk::Sampler::null();
        }
    }

    #[cfg(test)]
    pub(crate) fn discard_staging(&mut self, handle: TextureHandle) {
        if let Some(buffer) = self.resources.get_mut(&handle).and_then(|r| r.staging_buffer.take()) {
            self.ctx.device().destroy_buffer(buffer);
        }
    }

    fn release(&self, resource: TextureResource) {
        let device = self.ctx.device();
        device.destroy_image_view(resource.view);
        device.destroy_image(resource.image);
        if let Some(buffer) = resource.staging_buffer {
            device.destroy_buffer(buffer);
        }
        log::info!("Destroyed {}", resource.handle);
    }

    fn stage(&self, pixels: &PixelView<'_>) -> GpuResult<vk::Buffer> {
        let device = self.ctx.device();
        let buffer = device.create_buffer(pixels.gpu_size() as u64, vk::BufferUsageFlags::TRANSFER_SRC)?;
        device.map_buffer(buffer, &mut |bytes: &mut [u8]| pixels.write_normalized(bytes))?;
        Ok(buffer)
    }
}
