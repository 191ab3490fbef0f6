//! Pipeline counters shared by the workers and the client.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a receiver's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecverStats {
    /// Records relayed from the source into the message channel
    pub messages_fetched: u64,
    /// Failed source fetches
    pub fetch_errors: u64,
    /// Callbacks invoked with a message
    pub callbacks_invoked: u64,
    /// Invocations routed to the error callback
    pub messages_rejected: u64,
    /// Callbacks that panicked
    pub callback_panics: u64,
    /// Callbacks dropped by unsubscribe before being matched
    pub callbacks_discarded: u64,
    /// Messages dropped by unsubscribe before being matched
    pub messages_discarded: u64,
    /// Messages left uncommitted under the commit policy
    pub acks_skipped: u64,
    pub ack_failures: u64,
}

#[derive(Debug, Default)]
pub struct PipelineCounters {
    messages_fetched: AtomicU64,
    fetch_errors: AtomicU64,
    callbacks_invoked: AtomicU64,
    messages_rejected: AtomicU64,
    callback_panics: AtomicU64,
    callbacks_discarded: AtomicU64,
    messages_discarded: AtomicU64,
    acks_skipped: AtomicU64,
    ack_failures: AtomicU64,
}

macro_rules! counter {
    ($name:ident, $field:ident) => {
        pub fn $name(&self, count: u64) {
            self.$field.fetch_add(count, Ordering::Relaxed);
        }
    };
}

impl PipelineCounters {
    counter!(add_fetched, messages_fetched);
    counter!(add_fetch_errors, fetch_errors);
    counter!(add_invoked, callbacks_invoked);
    counter!(add_rejected, messages_rejected);
    counter!(add_panics, callback_panics);
    counter!(add_callbacks_discarded, callbacks_discarded);
    counter!(add_messages_discarded, messages_discarded);
    counter!(add_acks_skipped, acks_skipped);
    counter!(add_ack_failures, ack_failures);

    pub fn snapshot(&self) -> RecverStats {
        RecverStats {
            messages_fetched: self.messages_fetched.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            callbacks_invoked: self.callbacks_invoked.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            callbacks_discarded: self.callbacks_discarded.load(Ordering::Relaxed),
            messages_discarded: self.messages_discarded.load(Ordering::Relaxed),
            acks_skipped: self.acks_skipped.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = PipelineCounters::default();
        counters.add_fetched(3);
        counters.add_invoked(2);
        counters.add_panics(1);
        counters.add_fetched(1);

        let stats = counters.snapshot();
        assert_eq!(stats.messages_fetched, 4);
        assert_eq!(stats.callbacks_invoked, 2);
        assert_eq!(stats.callback_panics, 1);
        assert_eq!(stats.ack_failures, 0);
    }
}
