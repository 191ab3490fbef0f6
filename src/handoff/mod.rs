//! # Handoff Module
//!
//! Bounded, double-buffered producer/consumer transfer between threads.
//!
//! - [`BoundedBatch`] - fixed-capacity container moved between owners
//! - [`HandoffChannel`] - producer side with current, standby and backlog buffers
//! - [`Collector`] - the single consumer end

pub mod batch;
pub mod channel;

pub use batch::{BoundedBatch, Overflow};
pub use channel::{Collector, HandoffChannel};
