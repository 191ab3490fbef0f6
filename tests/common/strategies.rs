//! Proptest strategies for handoff and pairing properties.

use proptest::prelude::*;

/// Channel capacities small enough to force rotation and blocking
pub fn capacity_strategy() -> impl Strategy<Value = usize> {
    1usize..=8
}

/// Sizes of successive submits, some larger than any generated capacity
pub fn batch_sizes_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=20, 1..30)
}

/// How many messages to publish and callbacks to register
pub fn message_count_strategy() -> impl Strategy<Value = usize> {
    1usize..=60
}
