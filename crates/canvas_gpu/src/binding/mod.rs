//! Binding tables
//!
//! Every draw call reads its texture through a binding table. Each frame slot
//! owns a [`BindingPool`] of tables; [`BindingTableAllocator`] sizes the pools
//! and writes the tables for a frame's draws.

pub mod allocator;
pub mod pool;

pub use allocator::BindingTableAllocator;
pub use pool::{BindingPool, PoolGrowth};
