//! Rotating frame slots

use super::slot::FrameSlot;
use crate::gpu::{DeviceContext, GpuResult};

/// N frame slots, each guarded by its own fence
pub struct FramePipeline {
    slots: Vec<FrameSlot>,
}

impl FramePipeline {
    pub fn new(ctx: &DeviceContext, frames_in_flight: usize) -> GpuResult<Self> {
        assert!(frames_in_flight > 0, "at least one frame slot is required");
        let slots = (0..frames_in_flight)
            .map(|index| FrameSlot::new(ctx.clone(), index))
            .collect::<GpuResult<Vec<_>>>()?;
        log::debug!("Frame pipeline created with {} slots", frames_in_flight);
        Ok(Self { slots })
    }

    /// Number of slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Mutable slot; panics if `index` is out of range
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        let count = self.slots.len();
        assert!(index < count, "frame slot {index} out of range, pipeline has {count}");
        &mut self.slots[index]
    }

    pub(crate) fn destroy(&mut self) {
        for slot in &mut self.slots {
            slot.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SlotState;
    use crate::gpu::headless::{CompletionMode, HeadlessDevice};
    use std::sync::Arc;
    use std::time::Duration;

    fn pipeline(mode: CompletionMode, slots: usize) -> (Arc<HeadlessDevice>, FramePipeline) {
        let device = Arc::new(HeadlessDevice::new(mode));
        let ctx = DeviceContext::new(device.clone(), Duration::from_millis(50));
        (device, FramePipeline::new(&ctx, slots).unwrap())
    }

    #[test]
    fn test_slots_start_idle_with_signaled_fences() {
        let (device, pipeline) = pipeline(CompletionMode::Manual, 3);
        assert_eq!(pipeline.frames_in_flight(), 3);
        for i in 0..3 {
            assert_eq!(pipeline.slot(i).index(), i);
            assert_eq!(pipeline.slot(i).state(), SlotState::Idle);
            assert!(device.is_fence_signaled(pipeline.slot(i).fence()));
        }
    }

    #[test]
    fn test_slot_state_follows_submission() {
        let (device, mut pipeline) = pipeline(CompletionMode::Manual, 2);
        let slot = pipeline.slot_mut(0);

        slot.begin().unwrap();
        assert_eq!(slot.state(), SlotState::Recording);
        assert!(!device.is_fence_signaled(slot.fence()));

        slot.submit(None, None).unwrap();
        assert_eq!(slot.state(), SlotState::Submitted);

        // Fence is unsignaled until the GPU finishes
        assert!(slot.begin().is_err());
        device.complete_pending().unwrap();
        assert!(slot.begin().is_ok());
    }

    #[test]
    fn test_slots_do_not_share_fences() {
        let (_device, mut pipeline) = pipeline(CompletionMode::Manual, 2);
        pipeline.slot_mut(0).begin().unwrap();
        pipeline.slot_mut(0).submit(None, None).unwrap();

        // Slot 1 is still free while slot 0 is in flight
        assert!(pipeline.slot_mut(1).begin().is_ok());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_slot_panics() {
        let (_device, mut pipeline) = pipeline(CompletionMode::Immediate, 2);
        pipeline.slot_mut(2);
    }
}
