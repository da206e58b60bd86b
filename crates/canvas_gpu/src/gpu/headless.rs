//! Headless GPU device
//!
//! Implements [`GpuDevice`] on CPU memory. Buffers and images are byte vectors,
//! copy commands really move bytes when their submission completes, and every
//! primitive call is appended to an event log. Handles are slotmap keys, so a
//! handle used after destruction is detected instead of aliasing a new object.
//!
//! In [`CompletionMode::Manual`] submissions stay in flight until
//! [`HeadlessDevice::complete_pending`] is called, which lets callers observe
//! exactly when the renderer blocks on a fence.

use ash::vk::{self, Handle};
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::binding::{BindingSlot, DescriptorBinding};
use super::commands::{Command, CommandList};
use super::device::{GpuDevice, SamplerDesc, SubmitSync};
use super::error::{GpuError, GpuResult};

new_key_type! {
    struct BufferKey;
    struct ImageKey;
    struct ViewKey;
    struct SamplerKey;
    struct LayoutKey;
    struct PoolKey;
    struct TableKey;
    struct CommandBufferKey;
    struct FenceKey;
    struct SemaphoreKey;
}

/// When submitted work completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Work completes during `submit`, fences signal immediately
    Immediate,
    /// Work stays in flight until [`HeadlessDevice::complete_pending`]
    Manual,
}

/// One recorded primitive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Buffer created
    CreateBuffer {
        /// New buffer
        buffer: vk::Buffer,
        /// Size in bytes
        size: u64,
    },
    /// Buffer mapped and written
    MapBuffer(vk::Buffer),
    /// Buffer destroyed
    DestroyBuffer(vk::Buffer),
    /// Image created
    CreateImage(vk::Image),
    /// Image destroyed
    DestroyImage(vk::Image),
    /// Image view destroyed
    DestroyImageView(vk::ImageView),
    /// Binding pool created
    CreateBindingPool {
        /// New pool
        pool: vk::DescriptorPool,
        /// Table capacity
        max_tables: u32,
    },
    /// Binding pool destroyed
    DestroyBindingPool(vk::DescriptorPool),
    /// Tables allocated from a pool
    AllocateBindingTables {
        /// Source pool
        pool: vk::DescriptorPool,
        /// Tables allocated
        count: u32,
    },
    /// Binding written into a table
    WriteBindingTable {
        /// Target table
        table: vk::DescriptorSet,
        /// Binding index
        binding: u32,
    },
    /// Commands recorded into a command buffer
    RecordCommands {
        /// Target command buffer
        command_buffer: vk::CommandBuffer,
        /// Number of commands
        commands: usize,
    },
    /// Command buffer submitted
    Submit {
        /// Submitted command buffer
        command_buffer: vk::CommandBuffer,
        /// Fence armed by the submission
        fence: vk::Fence,
    },
    /// Fence reset
    ResetFence(vk::Fence),
    /// Fence waited on
    WaitFence(vk::Fence),
    /// Whole-queue idle wait
    QueueWaitIdle,
}

struct HeadlessBuffer {
    bytes: Vec<u8>,
}

struct HeadlessImage {
    extent: vk::Extent2D,
    format: vk::Format,
    layout: vk::ImageLayout,
    bytes: Vec<u8>,
}

struct HeadlessPool {
    max_tables: u32,
    allocated: u32,
}

struct HeadlessTable {
    pool: PoolKey,
    bindings: BTreeMap<u32, DescriptorBinding>,
}

struct Submission {
    commands: CommandList,
    fence: vk::Fence,
}

#[derive(Default)]
struct DeviceState {
    buffers: SlotMap<BufferKey, HeadlessBuffer>,
    images: SlotMap<ImageKey, HeadlessImage>,
    views: SlotMap<ViewKey, vk::Image>,
    samplers: SlotMap<SamplerKey, SamplerDesc>,
    layouts: SlotMap<LayoutKey, Vec<BindingSlot>>,
    pools: SlotMap<PoolKey, HeadlessPool>,
    tables: SlotMap<TableKey, HeadlessTable>,
    command_buffers: SlotMap<CommandBufferKey, CommandList>,
    fences: SlotMap<FenceKey, bool>,
    semaphores: SlotMap<SemaphoreKey, ()>,
    pending: VecDeque<Submission>,
    events: Vec<DeviceEvent>,
    executed_draws: usize,
}

fn to_handle<H: Handle, K: Key>(key: K) -> H {
    H::from_raw(key.data().as_ffi())
}

fn to_key<K: Key, H: Handle>(handle: H) -> K {
    K::from(KeyData::from_ffi(handle.as_raw()))
}

fn unknown<H: Handle>(kind: &'static str, handle: H) -> GpuError {
    GpuError::UnknownObject { kind, raw: handle.as_raw() }
}

/// Bytes per texel of the formats the headless device stores
const fn texel_size(format: vk::Format) -> usize {
    match format {
        vk::Format::R8_UNORM => 1,
        _ => 4,
    }
}

impl DeviceState {
    fn complete(&mut self, submission: &Submission) -> GpuResult<()> {
        for command in submission.commands.commands() {
            match command {
                Command::ImageBarrier(barrier) => {
                    let image = self
                        .images
                        .get_mut(to_key(barrier.image))
                        .ok_or_else(|| unknown("image", barrier.image))?;
                    image.layout = barrier.new_layout;
                }
                Command::CopyBufferToImage { buffer, image, .. } => {
                    let source = self
                        .buffers
                        .get(to_key(*buffer))
                        .ok_or_else(|| unknown("buffer", *buffer))?
                        .bytes
                        .clone();
                    let target = self
                        .images
                        .get_mut(to_key(*image))
                        .ok_or_else(|| unknown("image", *image))?;
                    let len = target.bytes.len().min(source.len());
                    target.bytes[..len].copy_from_slice(&source[..len]);
                }
                Command::BindBindingTables { tables, .. } => {
                    if let Some(table) = tables.iter().find(|t| !self.tables.contains_key(to_key(**t))) {
                        return Err(unknown("binding table", *table));
                    }
                }
                Command::DrawIndexed { .. } => self.executed_draws += 1,
                _ => {}
            }
        }

        let fence = self
            .fences
            .get_mut(to_key(submission.fence))
            .ok_or_else(|| unknown("fence", submission.fence))?;
        *fence = true;
        Ok(())
    }
}

/// CPU-memory [`GpuDevice`] with an inspectable event log
pub struct HeadlessDevice {
    mode: CompletionMode,
    state: Mutex<DeviceState>,
    completed: Condvar,
}

impl HeadlessDevice {
    /// Create a device with the given completion behavior
    pub fn new(mode: CompletionMode) -> Self {
        Self {
            mode,
            state: Mutex::new(DeviceState::default()),
            completed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Complete every in-flight submission, signaling their fences
    pub fn complete_pending(&self) -> GpuResult<()> {
        let mut state = self.lock();
        while let Some(submission) = state.pending.pop_front() {
            state.complete(&submission)?;
        }
        drop(state);
        self.completed.notify_all();
        Ok(())
    }

    /// Signal a fence without completing any work
    pub fn signal_fence(&self, fence: vk::Fence) {
        if let Some(signaled) = self.lock().fences.get_mut(to_key(fence)) {
            *signaled = true;
        }
        self.completed.notify_all();
    }

    /// Whether `fence` is currently signaled
    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.lock().fences.get(to_key(fence)).copied().unwrap_or(false)
    }

    /// Submissions that have not completed yet
    pub fn pending_submissions(&self) -> usize {
        self.lock().pending.len()
    }

    /// Snapshot of the event log
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.lock().events.clone()
    }

    /// Empty the event log
    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Number of logged events matching `predicate`
    pub fn count_events(&self, predicate: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.lock().events.iter().filter(|event| predicate(event)).count()
    }

    /// Number of `queue_wait_idle` calls so far
    pub fn queue_wait_idle_count(&self) -> usize {
        self.count_events(|event| matches!(event, DeviceEvent::QueueWaitIdle))
    }

    /// Indexed draws executed by completed submissions
    pub fn executed_draws(&self) -> usize {
        self.lock().executed_draws
    }

    /// Contents of a live buffer
    pub fn buffer_bytes(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.lock().buffers.get(to_key(buffer)).map(|b| b.bytes.clone())
    }

    /// Contents of a live image, tightly packed
    pub fn image_bytes(&self, image: vk::Image) -> Option<Vec<u8>> {
        self.lock().images.get(to_key(image)).map(|i| i.bytes.clone())
    }

    /// Current layout of a live image
    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.lock().images.get(to_key(image)).map(|i| i.layout)
    }

    /// Format and extent of a live image
    pub fn image_info(&self, image: vk::Image) -> Option<(vk::Format, vk::Extent2D)> {
        self.lock().images.get(to_key(image)).map(|i| (i.format, i.extent))
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Number of live images
    pub fn live_images(&self) -> usize {
        self.lock().images.len()
    }

    /// Number of live binding pools
    pub fn live_binding_pools(&self) -> usize {
        self.lock().pools.len()
    }

    /// Table capacity of a live pool
    pub fn pool_capacity(&self, pool: vk::DescriptorPool) -> Option<u32> {
        self.lock().pools.get(to_key(pool)).map(|p| p.max_tables)
    }

    /// Binding last written at `binding` of a live table
    pub fn table_binding(&self, table: vk::DescriptorSet, binding: u32) -> Option<DescriptorBinding> {
        self.lock()
            .tables
            .get(to_key(table))
            .and_then(|t| t.bindings.get(&binding).copied())
    }

    /// Commands last recorded into a command buffer
    pub fn recorded_commands(&self, command_buffer: vk::CommandBuffer) -> Option<CommandList> {
        self.lock().command_buffers.get(to_key(command_buffer)).cloned()
    }

    /// Whether an image view is still alive
    pub fn is_view_alive(&self, view: vk::ImageView) -> bool {
        self.lock().views.contains_key(to_key(view))
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_buffer(&self, size: u64, _usage: vk::BufferUsageFlags) -> GpuResult<vk::Buffer> {
        let len = usize::try_from(size).map_err(|_| GpuError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;
        let mut state = self.lock();
        let buffer = to_handle(state.buffers.insert(HeadlessBuffer { bytes: vec![0; len] }));
        state.events.push(DeviceEvent::CreateBuffer { buffer, size });
        Ok(buffer)
    }

    fn map_buffer(&self, buffer: vk::Buffer, write: &mut dyn FnMut(&mut [u8])) -> GpuResult<()> {
        let mut state = self.lock();
        let target = state
            .buffers
            .get_mut(to_key(buffer))
            .ok_or_else(|| unknown("buffer", buffer))?;
        write(&mut target.bytes);
        state.events.push(DeviceEvent::MapBuffer(buffer));
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.lock();
        if state.buffers.remove(to_key(buffer)).is_none() {
            log::error!("Headless device: destroying unknown buffer {:#x}", buffer.as_raw());
        }
        state.events.push(DeviceEvent::DestroyBuffer(buffer));
    }

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        _usage: vk::ImageUsageFlags,
    ) -> GpuResult<vk::Image> {
        let len = extent.width as usize * extent.height as usize * texel_size(format);
        let mut state = self.lock();
        let image = to_handle(state.images.insert(HeadlessImage {
            extent,
            format,
            layout: vk::ImageLayout::UNDEFINED,
            bytes: vec![0; len],
        }));
        state.events.push(DeviceEvent::CreateImage(image));
        Ok(image)
    }

    fn create_image_view(&self, image: vk::Image, _format: vk::Format) -> GpuResult<vk::ImageView> {
        let mut state = self.lock();
        if !state.images.contains_key(to_key(image)) {
            return Err(unknown("image", image));
        }
        Ok(to_handle(state.views.insert(image)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.lock();
        state.views.remove(to_key(view));
        state.events.push(DeviceEvent::DestroyImageView(view));
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.lock();
        if state.images.remove(to_key(image)).is_none() {
            log::error!("Headless device: destroying unknown image {:#x}", image.as_raw());
        }
        state.events.push(DeviceEvent::DestroyImage(image));
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> GpuResult<vk::Sampler> {
        Ok(to_handle(self.lock().samplers.insert(*desc)))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.lock().samplers.remove(to_key(sampler));
    }

    fn create_binding_layout(&self, slots: &[BindingSlot]) -> GpuResult<vk::DescriptorSetLayout> {
        Ok(to_handle(self.lock().layouts.insert(slots.to_vec())))
    }

    fn destroy_binding_layout(&self, layout: vk::DescriptorSetLayout) {
        self.lock().layouts.remove(to_key(layout));
    }

    fn create_binding_pool(&self, max_tables: u32, _slots_per_table: u32) -> GpuResult<vk::DescriptorPool> {
        let mut state = self.lock();
        let pool = to_handle(state.pools.insert(HeadlessPool { max_tables, allocated: 0 }));
        state.events.push(DeviceEvent::CreateBindingPool { pool, max_tables });
        Ok(pool)
    }

    fn destroy_binding_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.lock();
        let key: PoolKey = to_key(pool);
        state.pools.remove(key);
        state.tables.retain(|_, table| table.pool != key);
        state.events.push(DeviceEvent::DestroyBindingPool(pool));
    }

    fn allocate_binding_tables(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> GpuResult<Vec<vk::DescriptorSet>> {
        let mut state = self.lock();
        if !state.layouts.contains_key(to_key(layout)) {
            return Err(unknown("binding layout", layout));
        }
        let key: PoolKey = to_key(pool);
        let entry = state.pools.get_mut(key).ok_or_else(|| unknown("binding pool", pool))?;
        if entry.allocated + count > entry.max_tables {
            return Err(GpuError::PoolExhausted {
                requested: entry.allocated + count,
                capacity: entry.max_tables,
            });
        }
        entry.allocated += count;

        let tables = (0..count)
            .map(|_| {
                to_handle(state.tables.insert(HeadlessTable {
                    pool: key,
                    bindings: BTreeMap::new(),
                }))
            })
            .collect();
        state.events.push(DeviceEvent::AllocateBindingTables { pool, count });
        Ok(tables)
    }

    fn write_binding_table(&self, table: vk::DescriptorSet, binding: u32, resource: &DescriptorBinding) {
        let mut state = self.lock();
        match state.tables.get_mut(to_key(table)) {
            Some(entry) => {
                entry.bindings.insert(binding, *resource);
            }
            None => log::error!("Headless device: writing unknown binding table {:#x}", table.as_raw()),
        }
        state.events.push(DeviceEvent::WriteBindingTable { table, binding });
    }

    fn create_command_buffer(&self) -> GpuResult<vk::CommandBuffer> {
        Ok(to_handle(self.lock().command_buffers.insert(CommandList::new())))
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        self.lock().command_buffers.remove(to_key(command_buffer));
    }

    fn record_commands(&self, command_buffer: vk::CommandBuffer, commands: &CommandList) -> GpuResult<()> {
        let mut state = self.lock();
        let target = state
            .command_buffers
            .get_mut(to_key(command_buffer))
            .ok_or_else(|| unknown("command buffer", command_buffer))?;
        target.clone_from(commands);
        state.events.push(DeviceEvent::RecordCommands {
            command_buffer,
            commands: commands.len(),
        });
        Ok(())
    }

    fn submit(&self, command_buffer: vk::CommandBuffer, sync: &SubmitSync) -> GpuResult<()> {
        let mut state = self.lock();
        let commands = state
            .command_buffers
            .get(to_key(command_buffer))
            .ok_or_else(|| unknown("command buffer", command_buffer))?
            .clone();
        for semaphore in sync.wait_semaphore.iter().chain(sync.signal_semaphore.iter()) {
            if !state.semaphores.contains_key(to_key(*semaphore)) {
                return Err(unknown("semaphore", *semaphore));
            }
        }
        let signaled = state
            .fences
            .get(to_key(sync.fence))
            .copied()
            .ok_or_else(|| unknown("fence", sync.fence))?;
        if signaled {
            // Submitting with a signaled fence is invalid usage in Vulkan.
            return Err(GpuError::Api(vk::Result::ERROR_VALIDATION_FAILED_EXT));
        }

        state.events.push(DeviceEvent::Submit { command_buffer, fence: sync.fence });
        let submission = Submission { commands, fence: sync.fence };
        match self.mode {
            CompletionMode::Immediate => {
                state.complete(&submission)?;
                drop(state);
                self.completed.notify_all();
            }
            CompletionMode::Manual => state.pending.push_back(submission),
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> GpuResult<vk::Fence> {
        Ok(to_handle(self.lock().fences.insert(signaled)))
    }

    fn reset_fence(&self, fence: vk::Fence) -> GpuResult<()> {
        let mut state = self.lock();
        let entry = state.fences.get_mut(to_key(fence)).ok_or_else(|| unknown("fence", fence))?;
        *entry = false;
        state.events.push(DeviceEvent::ResetFence(fence));
        Ok(())
    }

    fn wait_fence(&self, fence: vk::Fence, timeout: Duration) -> GpuResult<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        state.events.push(DeviceEvent::WaitFence(fence));
        loop {
            match state.fences.get(to_key(fence)) {
                None => return Err(unknown("fence", fence)),
                Some(true) => return Ok(()),
                Some(false) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GpuError::Timeout { operation: "fence", timeout });
            }
            state = self
                .completed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.lock().fences.remove(to_key(fence));
    }

    fn create_semaphore(&self) -> GpuResult<vk::Semaphore> {
        Ok(to_handle(self.lock().semaphores.insert(())))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.lock().semaphores.remove(to_key(semaphore));
    }

    fn queue_wait_idle(&self, timeout: Duration) -> GpuResult<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        state.events.push(DeviceEvent::QueueWaitIdle);
        while !state.pending.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Err(GpuError::Timeout { operation: "queue idle", timeout });
            }
            state = self
                .completed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::commands::ImageBarrier;

    #[test]
    fn test_null_handles_are_never_live() {
        let device = HeadlessDevice::new(CompletionMode::Immediate);
        let buffer = device.create_buffer(4, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        assert_ne!(buffer, vk::Buffer::null());
        assert!(device.buffer_bytes(vk::Buffer::null()).is_none());
    }

    #[test]
    fn test_destroyed_handles_are_not_reused() {
        let device = HeadlessDevice::new(CompletionMode::Immediate);
        let first = device.create_buffer(4, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        device.destroy_buffer(first);
        let second = device.create_buffer(4, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();

        assert_ne!(first, second);
        assert!(device.buffer_bytes(first).is_none());
        assert!(matches!(
            device.map_buffer(first, &mut |_: &mut [u8]| {}),
            Err(GpuError::UnknownObject { kind: "buffer", .. })
        ));
    }

    #[test]
    fn test_copy_executes_on_completion() {
        let device = HeadlessDevice::new(CompletionMode::Manual);
        let extent = vk::Extent2D { width: 1, height: 1 };
        let buffer = device.create_buffer(4, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        device.map_buffer(buffer, &mut |bytes: &mut [u8]| bytes.copy_from_slice(&[1, 2, 3, 4])).unwrap();
        let image = device
            .create_image(extent, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED)
            .unwrap();

        let mut list = CommandList::new();
        list.push(Command::ImageBarrier(ImageBarrier::to_transfer_dst(image, vk::ImageLayout::UNDEFINED)));
        list.push(Command::CopyBufferToImage { buffer, image, extent });
        list.push(Command::ImageBarrier(ImageBarrier::transfer_dst_to(
            image,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )));

        let cmd = device.create_command_buffer().unwrap();
        let fence = device.create_fence(false).unwrap();
        device.record_commands(cmd, &list).unwrap();
        device.submit(cmd, &SubmitSync::fence_only(fence)).unwrap();

        assert_eq!(device.image_bytes(image).unwrap(), vec![0, 0, 0, 0]);
        assert!(!device.is_fence_signaled(fence));

        device.complete_pending().unwrap();
        assert_eq!(device.image_bytes(image).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(device.image_layout(image), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        assert!(device.is_fence_signaled(fence));
    }

    #[test]
    fn test_wait_fence_times_out() {
        let device = HeadlessDevice::new(CompletionMode::Manual);
        let fence = device.create_fence(false).unwrap();
        let result = device.wait_fence(fence, Duration::from_millis(10));
        assert!(matches!(result, Err(GpuError::Timeout { .. })));
    }

    #[test]
    fn test_queue_idle_honors_caller_timeout() {
        let device = HeadlessDevice::new(CompletionMode::Manual);
        let cmd = device.create_command_buffer().unwrap();
        let fence = device.create_fence(false).unwrap();
        device.record_commands(cmd, &CommandList::new()).unwrap();
        device.submit(cmd, &SubmitSync::fence_only(fence)).unwrap();

        let started = Instant::now();
        let result = device.queue_wait_idle(Duration::from_millis(20));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            result,
            Err(GpuError::Timeout {
                operation: "queue idle",
                timeout: Duration::from_millis(20),
            })
        );

        device.complete_pending().unwrap();
        assert_eq!(device.queue_wait_idle(Duration::from_millis(20)), Ok(()));
    }

    #[test]
    fn test_pool_rejects_over_allocation() {
        let device = HeadlessDevice::new(CompletionMode::Immediate);
        let layout = device.create_binding_layout(&[BindingSlot::texture(0)]).unwrap();
        let pool = device.create_binding_pool(2, 1).unwrap();

        assert_eq!(device.allocate_binding_tables(pool, layout, 2).unwrap().len(), 2);
        assert_eq!(
            device.allocate_binding_tables(pool, layout, 1),
            Err(GpuError::PoolExhausted { requested: 3, capacity: 2 })
        );
    }

    #[test]
    fn test_destroying_pool_frees_its_tables() {
        let device = HeadlessDevice::new(CompletionMode::Immediate);
        let layout = device.create_binding_layout(&[BindingSlot::texture(0)]).unwrap();
        let pool = device.create_binding_pool(1, 1).unwrap();
        let table = device.allocate_binding_tables(pool, layout, 1).unwrap()[0];
        let binding = DescriptorBinding::Sampler(vk::Sampler::null());

        device.write_binding_table(table, 0, &binding);
        assert_eq!(device.table_binding(table, 0), Some(binding));

        device.destroy_binding_pool(pool);
        assert_eq!(device.table_binding(table, 0), None);
        assert_eq!(device.live_binding_pools(), 0);
    }
}
