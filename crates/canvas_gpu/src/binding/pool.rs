//! Capacity-managed binding pool
//!
//! A pool grows in two tiers. Headroom left in the native pool is handed out
//! incrementally with no waiting; once the pool is exhausted it is rebuilt,
//! sized exactly to the new requirement, after the queue goes idle.

use ash::vk;

use crate::gpu::{DeviceContext, GpuResult};

/// How a pool must change to provide a number of tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolGrowth {
    /// Enough tables already exist
    Reuse,
    /// Allocate more tables from the existing pool
    Grow {
        /// Tables to add
        additional: u32,
    },
    /// Replace the pool with one of exactly `capacity` tables
    Rebuild {
        /// Capacity of the new pool
        capacity: u32,
    },
}

/// Binding tables of one frame slot and the native pool backing them
pub struct BindingPool {
    ctx: DeviceContext,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    tables: Vec<vk::DescriptorSet>,
    capacity: u32,
}

impl BindingPool {
    /// Create an empty pool able to hold `capacity` tables of `layout`
    pub fn new(ctx: DeviceContext, layout: vk::DescriptorSetLayout, capacity: u32) -> GpuResult<Self> {
        let pool = ctx.device().create_binding_pool(capacity, 1)?;
        Ok(Self {
            ctx,
            layout,
            pool,
            tables: Vec::new(),
            capacity,
        })
    }

    /// Tables that physically exist
    pub fn allocated_count(&self) -> u32 {
        u32::try_from(self.tables.len()).unwrap_or(u32::MAX)
    }

    /// Tables the current pool can hold
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn tables(&self) -> &[vk::DescriptorSet] {
        &self.tables
    }

    /// Decide how to provide `required` tables
    pub fn plan(&self, required: u32) -> PoolGrowth {
        let allocated = self.allocated_count();
        if required <= allocated {
            PoolGrowth::Reuse
        } else if required <= self.capacity {
            PoolGrowth::Grow {
                additional: required - allocated,
            }
        } else {
            PoolGrowth::Rebuild { capacity: required }
        }
    }

    /// Make at least `required` tables available
    pub fn ensure(&mut self, required: u32) -> GpuResult<PoolGrowth> {
        let growth = self.plan(required);
        match growth {
            PoolGrowth::Reuse => {}
            PoolGrowth::Grow { additional } => {
                let tables = self
                    .ctx
                    .device()
                    .allocate_binding_tables(self.pool, self.layout, additional)?;
                self.tables.extend(tables);
                log::debug!(
                    "Binding pool grew by {} tables ({}/{})",
                    additional,
                    self.tables.len(),
                    self.capacity
                );
            }
            PoolGrowth::Rebuild { capacity } => self.rebuild(capacity)?,
        }
        Ok(growth)
    }

    /// Wait for the queue to go idle, then replace the pool with a full one of `capacity` tables
    fn rebuild(&mut self, capacity: u32) -> GpuResult<()> {
        log::warn!(
            "Binding pool exhausted at {} tables, rebuilding with {}",
            self.capacity,
            capacity
        );

        let device = self.ctx.device();
        device.queue_wait_idle(self.ctx.fence_timeout())?;
        device.destroy_binding_pool(self.pool);
        self.pool = vk::DescriptorPool::null();
        self.tables.clear();

        self.pool = device.create_binding_pool(capacity, 1)?;
        self.capacity = capacity;
        self.tables = device.allocate_binding_tables(self.pool, self.layout, capacity)?;
        Ok(())
    }

    pub(crate) fn destroy(&mut self) {
        if self.pool != vk::DescriptorPool::null() {
            self.ctx.device().destroy_binding_pool(self.pool);
            self.pool = vk::DescriptorPool::null();
        }
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{CompletionMode, DeviceEvent, HeadlessDevice};
    use crate::gpu::BindingSlot;
    use crate::gpu::{CommandList, GpuDevice, GpuError, SubmitSync};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn pool(capacity: u32) -> (Arc<HeadlessDevice>, BindingPool) {
        let device = Arc::new(HeadlessDevice::new(CompletionMode::Immediate));
        let layout = device.create_binding_layout(&[BindingSlot::texture(0)]).unwrap();
        let ctx = DeviceContext::new(device.clone(), Duration::from_secs(1));
        (device, BindingPool::new(ctx, layout, capacity).unwrap())
    }

    #[test]
    fn test_plan_tiers() {
        let (_device, mut pool) = pool(4);
        assert_eq!(pool.plan(0), PoolGrowth::Reuse);
        assert_eq!(pool.plan(3), PoolGrowth::Grow { additional: 3 });
        assert_eq!(pool.plan(4), PoolGrowth::Grow { additional: 4 });
        assert_eq!(pool.plan(5), PoolGrowth::Rebuild { capacity: 5 });

        pool.ensure(2).unwrap();
        assert_eq!(pool.plan(2), PoolGrowth::Reuse);
        assert_eq!(pool.plan(4), PoolGrowth::Grow { additional: 2 });
    }

    #[test]
    fn test_incremental_growth_never_waits() {
        let (device, mut pool) = pool(8);
        pool.ensure(3).unwrap();
        pool.ensure(8).unwrap();

        assert_eq!(pool.allocated_count(), 8);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(device.queue_wait_idle_count(), 0);
    }

    #[test]
    fn test_exhausted_pool_rebuilds_to_exact_size() {
        let (device, mut pool) = pool(4);
        pool.ensure(4).unwrap();
        let old_tables = pool.tables().to_vec();

        assert_eq!(pool.ensure(10).unwrap(), PoolGrowth::Rebuild { capacity: 10 });
        assert_eq!(pool.capacity(), 10);
        assert_eq!(pool.allocated_count(), 10);
        assert!(pool.tables().iter().all(|t| !old_tables.contains(t)));

        let events = device.events();
        let idle = events.iter().position(|e| *e == DeviceEvent::QueueWaitIdle).unwrap();
        let destroy = events
            .iter()
            .position(|e| matches!(e, DeviceEvent::DestroyBindingPool(_)))
            .unwrap();
        assert_eq!(device.queue_wait_idle_count(), 1);
        assert!(idle < destroy);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let (_device, mut pool) = pool(2);
        let mut previous = pool.capacity();
        for required in [1, 5, 3, 0, 9, 2, 9, 12, 1] {
            pool.ensure(required).unwrap();
            assert!(pool.capacity() >= previous);
            assert!(pool.allocated_count() <= pool.capacity());
            assert!(pool.allocated_count() >= required);
            previous = pool.capacity();
        }
        assert_eq!(pool.capacity(), 12);
    }

    #[test]
    fn test_rebuild_times_out_on_busy_queue() {
        let device = Arc::new(HeadlessDevice::new(CompletionMode::Manual));
        let layout = device.create_binding_layout(&[BindingSlot::texture(0)]).unwrap();
        let timeout = Duration::from_millis(50);
        let mut pool = BindingPool::new(DeviceContext::new(device.clone(), timeout), layout, 1).unwrap();

        let cmd = device.create_command_buffer().unwrap();
        let fence = device.create_fence(false).unwrap();
        device.record_commands(cmd, &CommandList::new()).unwrap();
        device.submit(cmd, &SubmitSync::fence_only(fence)).unwrap();

        let started = Instant::now();
        let result = pool.ensure(3);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result, Err(GpuError::Timeout { operation: "queue idle", timeout }));
        assert_eq!(device.count_events(|e| matches!(e, DeviceEvent::DestroyBindingPool(_))), 0);
        assert_eq!(pool.capacity(), 1);

        device.complete_pending().unwrap();
        assert_eq!(pool.ensure(3).unwrap(), PoolGrowth::Rebuild { capacity: 3 });
    }
}
