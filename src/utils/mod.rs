//! Utility helpers: generational allocation, phase timers, and math extensions.

pub mod allocator;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, EntityId};
pub use math::*;
pub use profiling::{Timer, TimerRegistry};
