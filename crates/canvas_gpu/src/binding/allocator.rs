//! Per-draw binding tables for every frame slot

use ash::vk;

use super::pool::{BindingPool, PoolGrowth};
use crate::draw::DrawCommand;
use crate::gpu::{BindingSlot, DeviceContext, GpuResult};
use crate::texture::{TextureHandle, TextureRegistry};

/// Tables of one slot plus the texture each table currently holds
struct SlotTables {
    pool: BindingPool,
    written: Vec<Option<TextureHandle>>,
}

/// Hands out and fills the binding tables each draw call reads from
pub struct BindingTableAllocator {
    ctx: DeviceContext,
    layout: vk::DescriptorSetLayout,
    tables_per_draw: u32,
    slots: Vec<SlotTables>,
}

impl BindingTableAllocator {
    /// One pool of `initial_capacity` tables for each of `frames_in_flight` slots
    pub fn new(
        ctx: DeviceContext,
        frames_in_flight: usize,
        initial_capacity: u32,
        tables_per_draw: u32,
    ) -> GpuResult<Self> {
        assert!(tables_per_draw > 0, "draws must consume at least one binding table");

        let layout = ctx.device().create_binding_layout(&[BindingSlot::texture(0)])?;
        let slots = (0..frames_in_flight)
            .map(|_| {
                Ok(SlotTables {
                    pool: BindingPool::new(ctx.clone(), layout, initial_capacity)?,
                    written: Vec::new(),
                })
            })
            .collect::<GpuResult<Vec<_>>>()?;

        Ok(Self {
            ctx,
            layout,
            tables_per_draw,
            slots,
        })
    }

    /// Layout of every table, for pipeline layout creation
    pub const fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub const fn tables_per_draw(&self) -> u32 {
        self.tables_per_draw
    }

    /// Table capacity of a slot's pool
    pub fn capacity(&self, slot: usize) -> u32 {
        self.slots[slot].pool.capacity()
    }

    /// Tables allocated in a slot's pool
    pub fn allocated_count(&self, slot: usize) -> u32 {
        self.slots[slot].pool.allocated_count()
    }

    /// Make tables available for `draws` on `slot` and write each draw's textures into them.
    ///
    /// Draw `i` owns tables `i * tables_per_draw .. (i + 1) * tables_per_draw`.
    /// A table already holding the same texture is not rewritten.
    pub fn bind_draws(
        &mut self,
        slot: usize,
        draws: &[DrawCommand],
        registry: &TextureRegistry,
    ) -> GpuResult<PoolGrowth> {
        let per_draw = self.tables_per_draw as usize;
        let Some(required) = draws
            .len()
            .checked_mul(per_draw)
            .and_then(|tables| u32::try_from(tables).ok())
        else {
            panic!("{} draws of {per_draw} tables exceed the binding table range", draws.len());
        };
        let tables = &mut self.slots[slot];

        let growth = tables.pool.ensure(required)?;
        if matches!(growth, PoolGrowth::Rebuild { .. }) {
            tables.written.clear();
        }
        tables.written.resize(tables.pool.tables().len(), None);

        let device = self.ctx.device();
        for (i, draw) in draws.iter().enumerate() {
            assert!(
                draw.textures.len() == per_draw,
                "draw {i} binds {} textures, each draw takes {per_draw}",
                draw.textures.len()
            );
            for (j, handle) in draw.textures.iter().enumerate() {
                let index = i * per_draw + j;
                if tables.written[index] == Some(*handle) {
                    continue;
                }
                device.write_binding_table(tables.pool.tables()[index], 0, &registry.binding_for(*handle));
                tables.written[index] = Some(*handle);
            }
        }
        Ok(growth)
    }

    /// Tables of draw `draw_index` on `slot`, valid after [`bind_draws`](Self::bind_draws)
    pub fn tables_for_draw(&self, slot: usize, draw_index: usize) -> &[vk::DescriptorSet] {
        let per_draw = self.tables_per_draw as usize;
        &self.slots[slot].pool.tables()[draw_index * per_draw..(draw_index + 1) * per_draw]
    }

    /// Drop a freed texture from every slot's write cache
    pub fn forget(&mut self, handle: TextureHandle) {
        for tables in &mut self.slots {
            for entry in tables.written.iter_mut().filter(|e| **e == Some(handle)) {
                *entry = None;
            }
        }
    }

    pub(crate) fn destroy(&mut self) {
        for tables in &mut self.slots {
            tables.pool.destroy();
            tables.written.clear();
        }
        if self.layout != vk::DescriptorSetLayout::null() {
            self.ctx.device().destroy_binding_layout(self.layout);
            self.layout = vk::DescriptorSetLayout::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::ClipRect;
    use crate::gpu::headless::{CompletionMode, DeviceEvent, HeadlessDevice};
    use crate::gpu::DescriptorBinding;
    use crate::texture::{PixelFormat, PixelView};
    use nalgebra::Matrix4;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup(capacity: u32) -> (Arc<HeadlessDevice>, TextureRegistry, BindingTableAllocator) {
        setup_with(capacity, 1)
    }

    fn setup_with(capacity: u32, tables_per_draw: u32) -> (Arc<HeadlessDevice>, TextureRegistry, BindingTableAllocator) {
        let device = Arc::new(HeadlessDevice::new(CompletionMode::Immediate));
        let ctx = DeviceContext::new(device.clone(), Duration::from_secs(1));
        let registry = TextureRegistry::new(ctx.clone()).unwrap();
        let allocator = BindingTableAllocator::new(ctx, 2, capacity, tables_per_draw).unwrap();
        (device, registry, allocator)
    }

    fn texture(registry: &mut TextureRegistry) -> TextureHandle {
        let pixel = [0u8, 0, 0, 255];
        registry
            .add_texture(PixelView::new(&pixel, 1, 1, PixelFormat::Rgba8888), false)
            .unwrap()
    }

    fn draws(textures: &[TextureHandle]) -> Vec<DrawCommand> {
        textures
            .iter()
            .map(|t| DrawCommand::new(*t, ClipRect::new(0.0, 0.0, 8.0, 8.0), Matrix4::identity(), 0..4, 0..6))
            .collect()
    }

    #[test]
    fn test_ten_draws_rebuild_a_four_table_pool() {
        let (device, mut registry, mut allocator) = setup(4);
        let handle = texture(&mut registry);

        let growth = allocator.bind_draws(0, &draws(&[handle; 10]), &registry).unwrap();

        assert_eq!(growth, PoolGrowth::Rebuild { capacity: 10 });
        assert_eq!(allocator.capacity(0), 10);
        assert_eq!(allocator.allocated_count(0), 10);
        assert_eq!(allocator.capacity(1), 4);
        assert_eq!(device.queue_wait_idle_count(), 1);
    }

    #[test]
    fn test_tables_hold_each_draws_texture() {
        let (device, mut registry, mut allocator) = setup(4);
        let a = texture(&mut registry);
        let b = texture(&mut registry);

        allocator.bind_draws(1, &draws(&[a, b, a]), &registry).unwrap();

        for (i, handle) in [a, b, a].iter().enumerate() {
            let table = allocator.tables_for_draw(1, i)[0];
            let expected = DescriptorBinding::texture(registry.get(*handle).unwrap().view(), registry.sampler());
            assert_eq!(device.table_binding(table, 0), Some(expected));
        }
    }

    #[test]
    fn test_multi_table_draws_use_consecutive_tables() {
        let (device, mut registry, mut allocator) = setup_with(4, 2);
        let a = texture(&mut registry);
        let b = texture(&mut registry);
        let mut frame = draws(&[a, b]);
        frame[0].textures = vec![a, b];
        frame[1].textures = vec![b, a];

        let growth = allocator.bind_draws(0, &frame, &registry).unwrap();
        assert_eq!(growth, PoolGrowth::Grow { additional: 4 });

        let binding = |handle: TextureHandle| {
            DescriptorBinding::texture(registry.get(handle).unwrap().view(), registry.sampler())
        };
        for (i, draw) in frame.iter().enumerate() {
            let tables = allocator.tables_for_draw(0, i);
            assert_eq!(tables.len(), 2);
            for (j, handle) in draw.textures.iter().enumerate() {
                assert_eq!(tables[j], allocator.slots[0].pool.tables()[i * 2 + j]);
                assert_eq!(device.table_binding(tables[j], 0), Some(binding(*handle)));
            }
        }
    }

    #[test]
    #[should_panic(expected = "each draw takes 2")]
    fn test_wrong_texture_count_panics() {
        let (_device, mut registry, mut allocator) = setup_with(4, 2);
        let a = texture(&mut registry);
        let _ = allocator.bind_draws(0, &draws(&[a]), &registry);
    }

    #[test]
    #[should_panic(expected = "exceed the binding table range")]
    fn test_table_count_overflow_panics() {
        let (_device, mut registry, mut allocator) = setup_with(4, u32::MAX);
        let a = texture(&mut registry);
        let _ = allocator.bind_draws(0, &draws(&[a, a]), &registry);
    }

    #[test]
    fn test_unchanged_tables_are_not_rewritten() {
        let (device, mut registry, mut allocator) = setup(4);
        let a = texture(&mut registry);
        let b = texture(&mut registry);

        allocator.bind_draws(0, &draws(&[a, b]), &registry).unwrap();
        device.clear_events();
        allocator.bind_draws(0, &draws(&[a, a]), &registry).unwrap();

        assert_eq!(device.count_events(|e| matches!(e, DeviceEvent::WriteBindingTable { .. })), 1);
    }

    #[test]
    fn test_forget_forces_rewrite() {
        let (device, mut registry, mut allocator) = setup(4);
        let a = texture(&mut registry);

        allocator.bind_draws(0, &draws(&[a]), &registry).unwrap();
        allocator.forget(a);
        device.clear_events();
        allocator.bind_draws(0, &draws(&[a]), &registry).unwrap();

        assert_eq!(device.count_events(|e| matches!(e, DeviceEvent::WriteBindingTable { .. })), 1);
    }

    #[test]
    #[should_panic(expected = "unknown")]
    fn test_unknown_texture_panics() {
        let (_device, registry, mut allocator) = setup(4);
        let mut other = TextureRegistry::new(DeviceContext::new(
            Arc::new(HeadlessDevice::new(CompletionMode::Immediate)),
            Duration::from_secs(1),
        ))
        .unwrap();
        let stranger = texture(&mut other);
        let _ = allocator.bind_draws(0, &draws(&[stranger]), &registry);
    }
}
