//! Drain tracking for blocking waits.
//!
//! Every callback registration takes a ticket. The Matcher settles one
//! ticket per invoked callback, and unsubscribe/close settle the ones they
//! discard. A caller waiting for ticket `n` returns once `n` registrations
//! have settled, which makes "drained" a counted condition rather than a
//! single notification that can be missed.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// Result of a bounded wait on the drain condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every registration up to the awaited one has settled
    Drained,
    /// The timeout elapsed first
    TimedOut,
}

impl WaitOutcome {
    pub fn is_drained(self) -> bool {
        self == WaitOutcome::Drained
    }
}

#[derive(Debug, Default)]
struct DrainState {
    registered: u64,
    settled: u64,
}

#[derive(Debug, Default)]
pub struct DrainTracker {
    state: Mutex<DrainState>,
    drained: Condvar,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new registration and return its ticket
    pub fn register(&self) -> u64 {
        let mut state = self.state.lock();
        state.registered += 1;
        state.registered
    }

    /// Mark `count` registrations as invoked or discarded
    pub fn settle(&self, count: u64) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.settled = (state.settled + count).min(state.registered);
        self.drained.notify_all();
    }

    /// Settle everything outstanding, releasing all waiters. Returns how many were abandoned.
    pub fn abandon_all(&self) -> u64 {
        let mut state = self.state.lock();
        let abandoned = state.registered - state.settled;
        state.settled = state.registered;
        self.drained.notify_all();
        abandoned
    }

    /// Signal the drained condition without settling anything
    pub fn report_idle(&self) {
        trace!("Matcher idle, signalling drained condition");
        self.drained.notify_all();
    }

    /// Registrations not yet settled
    pub fn outstanding(&self) -> u64 {
        let state = self.state.lock();
        state.registered - state.settled
    }

    /// Wait until every registration made so far has settled
    pub fn wait_all(&self, timeout: Option<Duration>) -> WaitOutcome {
        let target = self.state.lock().registered;
        self.wait_for_ticket(target, timeout)
    }

    /// Wait until at least `ticket` registrations have settled.
    ///
    /// `None` waits without a deadline.
    pub fn wait_for_ticket(&self, ticket: u64, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = self.state.lock();
        while state.settled < ticket {
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut state, deadline).timed_out() {
                        return if state.settled >= ticket {
                            WaitOutcome::Drained
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
                None => self.drained.wait(&mut state),
            }
        }
        WaitOutcome::Drained
    }
}
