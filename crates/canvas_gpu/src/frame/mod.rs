//! Frames in flight
//!
//! A [`FramePipeline`] owns N [`FrameSlot`]s. [`DrawSubmitter`] fills one slot
//! per frame, after waiting for the GPU to release it.

pub mod buffer;
pub mod pipeline;
pub mod slot;
pub mod submitter;

pub use buffer::HostBuffer;
pub use pipeline::FramePipeline;
pub use slot::{FrameSlot, SlotState};
pub use submitter::{DrawSubmitter, FrameStats};
