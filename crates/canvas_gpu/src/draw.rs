//! Draw-side data handed in by the layout layer
//!
//! The caller builds one vertex array and one index array for the whole frame,
//! plus an ordered list of [`DrawCommand`]s that slice into them.

use ash::vk;
use nalgebra::Matrix4;
use std::ops::Range;

use crate::texture::TextureHandle;

/// Canvas vertex: position in pixels, texture coordinate, linear RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex2d {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

unsafe impl bytemuck::Pod for Vertex2d {}
unsafe impl bytemuck::Zeroable for Vertex2d {}

impl Vertex2d {
    pub const fn new(position: [f32; 2], uv: [f32; 2], color: [f32; 4]) -> Self {
        Self { position, uv, color }
    }
}

/// Clip rectangle in framebuffer pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ClipRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering the whole target
    #[allow(clippy::cast_precision_loss)]
    pub fn full(extent: vk::Extent2D) -> Self {
        Self::new(0.0, 0.0, extent.width as f32, extent.height as f32)
    }

    /// Integer scissor `(x, y, width, height)` inside `extent`.
    ///
    /// Edges are rounded outwards and clamped to the target, so offsets are
    /// never negative.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_scissor(&self, extent: vk::Extent2D) -> (i32, i32, u32, u32) {
        let clamp = |v: f32, max: u32| v.clamp(0.0, max as f32) as u32;

        let x0 = clamp(self.x.floor(), extent.width);
        let y0 = clamp(self.y.floor(), extent.height);
        let x1 = clamp((self.x + self.width).ceil(), extent.width).max(x0);
        let y1 = clamp((self.y + self.height).ceil(), extent.height).max(y0);

        (x0 as i32, y0 as i32, x1 - x0, y1 - y0)
    }
}

/// One draw call of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    /// Textures bound to this draw, one per binding table
    pub textures: Vec<TextureHandle>,
    pub clip_rect: ClipRect,
    /// Pushed to the shaders as a column-major 4x4 matrix
    pub transform: Matrix4<f32>,
    /// Range into the frame's vertex array; `start` becomes the vertex offset
    pub vertex_range: Range<u32>,
    /// Range into the frame's index array
    pub index_range: Range<u32>,
}

impl DrawCommand {
    /// Draw sampling a single texture
    pub fn new(
        texture: TextureHandle,
        clip_rect: ClipRect,
        transform: Matrix4<f32>,
        vertex_range: Range<u32>,
        index_range: Range<u32>,
    ) -> Self {
        Self {
            textures: vec![texture],
            clip_rect,
            transform,
            vertex_range,
            index_range,
        }
    }

    /// Transform as push-constant bytes
    pub fn transform_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(self.transform.as_slice()).to_vec()
    }
}

/// Pipeline the canvas draws are recorded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// Surface objects of one frame, owned by the windowing layer
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    /// Signaled when the surface image has been acquired
    pub image_available: vk::Semaphore,
    /// Signaled by this frame's submission
    pub render_finished: vk::Semaphore,
    pub pipeline: CanvasPipeline,
}
