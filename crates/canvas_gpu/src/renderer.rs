//! Renderer facade
//!
//! [`CanvasRenderer`] is the only type most callers touch. Every operation is
//! infallible from the caller's point of view: a native failure or timeout is
//! logged and terminates the process through [`gpu_check!`](crate::gpu_check).

use ash::vk;

use crate::binding::BindingTableAllocator;
use crate::config::RendererConfig;
use crate::draw::{DrawCommand, FrameTarget, Vertex2d};
use crate::frame::{DrawSubmitter, FramePipeline, FrameStats};
use crate::gpu::{DeviceContext, GpuResult};
use crate::texture::{PixelView, TextureHandle, TextureRegistry, TextureResource, UploadScheduler};

/// Texture manager and frame-pipelined draw submitter for one device
pub struct CanvasRenderer {
    ctx: DeviceContext,
    config: RendererConfig,
    registry: TextureRegistry,
    uploads: UploadScheduler,
    allocator: BindingTableAllocator,
    pipeline: FramePipeline,
    submitter: DrawSubmitter,
    ticks: u64,
    shut_down: bool,
}

impl CanvasRenderer {
    /// Build every component on `ctx`
    pub fn new(ctx: DeviceContext, config: RendererConfig) -> Self {
        if let Err(error) = config.validate() {
            panic!("{error}");
        }

        let registry = crate::gpu_check!(TextureRegistry::new(ctx.clone()), "create texture registry");
        let uploads = crate::gpu_check!(UploadScheduler::new(ctx.clone()), "create upload scheduler");
        let allocator = crate::gpu_check!(
            BindingTableAllocator::new(
                ctx.clone(),
                config.max_frames_in_flight,
                config.initial_binding_capacity,
                config.tables_per_draw,
            ),
            "create binding tables"
        );
        let pipeline = crate::gpu_check!(
            FramePipeline::new(&ctx, config.max_frames_in_flight),
            "create frame slots"
        );

        log::info!(
            "Canvas renderer ready: {} frames in flight, {} binding tables per slot",
            config.max_frames_in_flight,
            config.initial_binding_capacity
        );

        Self {
            submitter: DrawSubmitter::new(config.clear_color),
            ctx,
            config,
            registry,
            uploads,
            allocator,
            pipeline,
            ticks: 0,
            shut_down: false,
        }
    }

    fn assert_live(&self) {
        assert!(!self.shut_down, "canvas renderer used after shutdown");
    }

    /// Create a texture; its pixels reach the GPU on the next [`tick`](Self::tick)
    pub fn add_texture(&mut self, pixels: PixelView<'_>, is_real_time: bool) -> TextureHandle {
        self.assert_live();
        crate::gpu_check!(self.registry.add_texture(pixels, is_real_time), "add texture")
    }

    /// Replace a texture's pixels; format and extent must match those it was created with
    pub fn update_texture(&mut self, handle: TextureHandle, pixels: PixelView<'_>) {
        self.assert_live();
        crate::gpu_check!(self.registry.update_texture(handle, pixels), "update texture");
    }

    /// Flag a texture for the next deletion sweep
    pub fn remove_texture(&mut self, handle: TextureHandle) {
        self.assert_live();
        self.registry.remove_texture(handle);
    }

    pub fn upload_font_atlas(&mut self, atlas: PixelView<'_>) -> TextureHandle {
        self.assert_live();
        crate::gpu_check!(self.registry.upload_font_atlas(atlas), "upload font atlas")
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureResource> {
        self.registry.get(handle)
    }

    /// All live textures
    pub const fn textures(&self) -> &TextureRegistry {
        &self.registry
    }

    /// Per-tick work: upload staged textures, and sweep deletions when the
    /// configured interval comes around
    pub fn tick(&mut self) {
        self.assert_live();
        crate::gpu_check!(self.uploads.flush(&mut self.registry), "flush texture uploads");

        self.ticks += 1;
        let interval = u64::from(self.config.garbage_collect_interval);
        if interval > 0 && self.ticks % interval == 0 {
            self.collect_garbage();
        }
    }

    /// Free every removed texture. Returns how many were freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.assert_live();
        let freed = crate::gpu_check!(
            self.uploads.collect_garbage(&mut self.registry),
            "collect texture garbage"
        );
        for handle in &freed {
            self.allocator.forget(*handle);
        }
        freed.len()
    }

    /// Record and submit one frame into slot `slot_index`
    pub fn submit_frame(
        &mut self,
        slot_index: usize,
        draws: &[DrawCommand],
        vertices: &[Vertex2d],
        indices: &[u32],
        target: &FrameTarget,
    ) {
        self.assert_live();
        crate::gpu_check!(
            self.submitter.submit_frame(
                &mut self.pipeline,
                &mut self.allocator,
                &self.registry,
                slot_index,
                draws,
                vertices,
                indices,
                target,
            ),
            "submit frame"
        );
    }

    pub const fn last_frame_stats(&self) -> Option<FrameStats> {
        self.submitter.last_frame_stats()
    }

    /// Layout of the binding tables, for building the canvas pipeline layout
    pub const fn binding_layout(&self) -> vk::DescriptorSetLayout {
        self.allocator.layout()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.pipeline.frames_in_flight()
    }

    /// Binding table capacity of a frame slot
    pub fn binding_capacity(&self, slot_index: usize) -> u32 {
        self.allocator.capacity(slot_index)
    }

    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Wait for the GPU and release everything. Safe to call more than once.
    pub fn shutdown(&mut self) {
        crate::gpu_check!(self.release(), "shut down canvas renderer");
    }

    fn release(&mut self) -> GpuResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        self.ctx.device().queue_wait_idle(self.ctx.fence_timeout())?;
        let textures = self.registry.len();
        self.registry.destroy_all();
        self.allocator.destroy();
        self.pipeline.destroy();
        self.uploads.destroy();

        log::info!("Canvas renderer shut down, released {} textures", textures);
        Ok(())
    }
}

impl Drop for CanvasRenderer {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            log::error!("Canvas renderer shutdown failed: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::PoolGrowth;
    use crate::draw::{CanvasPipeline, ClipRect};
    use crate::foundation::logging;
    use crate::gpu::headless::{CompletionMode, DeviceEvent, HeadlessDevice};
    use crate::texture::PixelFormat;
    use ash::vk::Handle;
    use nalgebra::Matrix4;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::{Duration, Instant};

    fn renderer(mode: CompletionMode, config: RendererConfig) -> (Arc<HeadlessDevice>, CanvasRenderer) {
        logging::init_for_tests();
        let device = Arc::new(HeadlessDevice::new(mode));
        let ctx = DeviceContext::new(device.clone(), Duration::from_secs(5));
        (device, CanvasRenderer::new(ctx, config))
    }

    fn target() -> FrameTarget {
        FrameTarget {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent: vk::Extent2D { width: 320, height: 240 },
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            pipeline: CanvasPipeline {
                pipeline: vk::Pipeline::from_raw(3),
                layout: vk::PipelineLayout::from_raw(4),
            },
        }
    }

    fn quads(textures: &[TextureHandle]) -> (Vec<DrawCommand>, Vec<Vertex2d>, Vec<u32>) {
        let clip = ClipRect::full(target().extent);
        let draws = textures
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let first = i as u32 * 4;
                DrawCommand::new(*t, clip, Matrix4::identity(), first..first + 4, 0..6)
            })
            .collect();
        (draws, vec![Vertex2d::default(); textures.len() * 4], vec![0, 1, 2, 2, 3, 0])
    }

    #[test]
    fn test_red_texture_scenario() {
        let (device, mut renderer) = renderer(CompletionMode::Immediate, RendererConfig::default());
        let red = [255u8, 0, 0].repeat(4);
        let handle = renderer.add_texture(PixelView::new(&red, 2, 2, PixelFormat::Rgb888), false);
        renderer.tick();

        assert_eq!(handle.id(), 0);
        let image = renderer.texture(handle).unwrap().image();
        assert_eq!(device.image_bytes(image).unwrap(), [255, 0, 0, 255].repeat(4));

        let blue = [0u8, 0, 255].repeat(4);
        renderer.update_texture(handle, PixelView::new(&blue, 2, 2, PixelFormat::Rgb888));
        assert!(renderer.texture(handle).unwrap().needs_upload());
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_update_with_larger_image_panics() {
        let (_device, mut renderer) = renderer(CompletionMode::Immediate, RendererConfig::default());
        let red = [255u8, 0, 0].repeat(4);
        let handle = renderer.add_texture(PixelView::new(&red, 2, 2, PixelFormat::Rgb888), false);
        let large = [0u8; 4 * 4 * 3];
        renderer.update_texture(handle, PixelView::new(&large, 4, 4, PixelFormat::Rgb888));
    }

    #[test]
    fn test_ten_draws_rebuild_binding_pool() {
        let config = RendererConfig {
            initial_binding_capacity: 4,
            ..RendererConfig::default()
        };
        let (_device, mut renderer) = renderer(CompletionMode::Immediate, config);
        let pixel = [255u8; 4];
        let handle = renderer.add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::Rgba8888), false);
        renderer.tick();

        let (draws, vertices, indices) = quads(&[handle; 10]);
        renderer.submit_frame(0, &draws, &vertices, &indices, &target());

        let stats = renderer.last_frame_stats().unwrap();
        assert_eq!(stats.pool_growth, PoolGrowth::Rebuild { capacity: 10 });
        assert_eq!(stats.draw_calls, 10);
        assert_eq!(renderer.binding_capacity(0), 10);
    }

    #[test]
    fn test_binding_capacity_never_shrinks() {
        let config = RendererConfig {
            initial_binding_capacity: 2,
            max_frames_in_flight: 1,
            ..RendererConfig::default()
        };
        let (_device, mut renderer) = renderer(CompletionMode::Immediate, config);
        let pixel = [255u8];
        let handle = renderer.add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::R8), false);
        renderer.tick();

        let mut previous = renderer.binding_capacity(0);
        for count in [1, 3, 2, 7, 0, 5, 8, 1] {
            let (draws, vertices, indices) = quads(&vec![handle; count]);
            renderer.submit_frame(0, &draws, &vertices, &indices, &target());
            assert!(renderer.binding_capacity(0) >= previous);
            previous = renderer.binding_capacity(0);
        }
        assert_eq!(previous, 8);
    }

    #[test]
    fn test_removed_texture_survives_until_sweep() {
        let (device, mut renderer) = renderer(CompletionMode::Immediate, RendererConfig::default());
        let pixel = [9u8, 9, 9, 255];
        let handle = renderer.add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::Rgba8888), false);
        renderer.tick();
        let image = renderer.texture(handle).unwrap().image();

        renderer.remove_texture(handle);
        let (draws, vertices, indices) = quads(&[handle]);
        renderer.submit_frame(0, &draws, &vertices, &indices, &target());
        assert!(device.image_bytes(image).is_some());

        device.clear_events();
        assert_eq!(renderer.collect_garbage(), 1);

        let events = device.events();
        let idle = events.iter().position(|e| *e == DeviceEvent::QueueWaitIdle).unwrap();
        let freed = events.iter().position(|e| *e == DeviceEvent::DestroyImage(image)).unwrap();
        assert_eq!(device.queue_wait_idle_count(), 1);
        assert!(idle < freed);
        assert!(renderer.texture(handle).is_none());
    }

    #[test]
    fn test_tick_runs_sweep_on_interval() {
        let config = RendererConfig {
            garbage_collect_interval: 2,
            ..RendererConfig::default()
        };
        let (device, mut renderer) = renderer(CompletionMode::Immediate, config);
        let pixel = [1u8];
        let handle = renderer.add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::R8), false);
        renderer.remove_texture(handle);

        renderer.tick();
        assert!(renderer.texture(handle).is_some());
        renderer.tick();
        assert!(renderer.texture(handle).is_none());
        assert_eq!(device.queue_wait_idle_count(), 1);
    }

    #[test]
    fn test_second_submit_on_busy_slot_blocks() {
        let (device, renderer) = renderer(CompletionMode::Manual, RendererConfig::default());
        let (tx, rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            let mut renderer = renderer;
            renderer.submit_frame(0, &[], &[], &[], &target());
            tx.send(1).unwrap();
            renderer.submit_frame(0, &[], &[], &[], &target());
            tx.send(2).unwrap();
            renderer
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(1));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        device.complete_pending().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(2));

        let mut renderer = worker.join().unwrap();
        device.complete_pending().unwrap();
        renderer.shutdown();
    }

    #[test]
    fn test_other_slot_is_free_while_one_is_busy() {
        let (device, mut renderer) = renderer(CompletionMode::Manual, RendererConfig::default());
        renderer.submit_frame(0, &[], &[], &[], &target());
        renderer.submit_frame(1, &[], &[], &[], &target());

        assert_eq!(device.pending_submissions(), 2);
        device.complete_pending().unwrap();
    }

    #[test]
    fn test_pool_rebuild_respects_fence_timeout() {
        logging::init_for_tests();
        let device = Arc::new(HeadlessDevice::new(CompletionMode::Manual));
        let ctx = DeviceContext::new(device.clone(), Duration::from_millis(50));
        let config = RendererConfig {
            initial_binding_capacity: 1,
            ..RendererConfig::default()
        };
        let mut renderer = CanvasRenderer::new(ctx, config);
        let pixel = [255u8; 4];
        let handle = renderer.add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::Rgba8888), false);
        renderer.submit_frame(0, &[], &[], &[], &target());

        let (draws, vertices, indices) = quads(&[handle; 3]);
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            renderer.submit_frame(1, &draws, &vertices, &indices, &target());
        }));

        assert!(outcome.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        device.complete_pending().unwrap();
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let (device, mut renderer) = renderer(CompletionMode::Immediate, RendererConfig::default());
        let pixel = [255u8; 4];
        let live = renderer.add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::Rgba8888), true);
        renderer.tick();
        let (draws, vertices, indices) = quads(&[live]);
        renderer.submit_frame(1, &draws, &vertices, &indices, &target());

        renderer.shutdown();
        renderer.shutdown();

        assert_eq!(device.live_images(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_binding_pools(), 0);
        assert_eq!(device.queue_wait_idle_count(), 1);
    }

    #[test]
    #[should_panic(expected = "after shutdown")]
    fn test_use_after_shutdown_panics() {
        let (_device, mut renderer) = renderer(CompletionMode::Immediate, RendererConfig::default());
        renderer.shutdown();
        renderer.tick();
    }

    #[test]
    #[should_panic(expected = "max_frames_in_flight")]
    fn test_invalid_config_panics() {
        let config = RendererConfig {
            max_frames_in_flight: 0,
            ..RendererConfig::default()
        };
        let _ = renderer(CompletionMode::Immediate, config);
    }
}
