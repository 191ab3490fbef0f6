//! # Matcher
//!
//! Pairs messages with callback registrations strictly by position: the
//! *i*-th message collected since the last reset goes to the *i*-th callback.
//! Each iteration runs COLLECT → APPEND → DRAIN-PAIR → REPORT.
//!
//! A channel is only collected while its pending queue is empty. Unpaired
//! messages therefore stay in the handoff channel, where they count against
//! its `2 × capacity` bound and eventually block the ingest worker.

use super::callback::{CallbackOutcome, MatchCallback};
use super::drain::DrainTracker;
use super::stats::PipelineCounters;
use crate::config::CommitPolicy;
use crate::error::{RecverError, Result};
use crate::handoff::{Collector, HandoffChannel};
use crate::messaging::RawMessage;
use crate::source::MessageSource;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const WORKER_NAME: &str = "recver-matcher";

#[derive(Default)]
struct PendingQueues {
    messages: VecDeque<RawMessage>,
    callbacks: VecDeque<MatchCallback>,
}

/// What a reset threw away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub messages: usize,
    pub callbacks: usize,
}

/// Pending queues shared between the Matcher and the client.
///
/// Only the Matcher appends and pairs; the client may reset them when the
/// subscription changes. Channels are cleared while the queue lock is held,
/// and the Matcher appends under the same lock after checking each channel's
/// generation, so items collected before a reset never reach the queues.
#[derive(Default)]
pub struct MatchQueues {
    inner: Mutex<PendingQueues>,
}

impl MatchQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// (pending messages, pending callbacks)
    pub fn len(&self) -> (usize, usize) {
        let queues = self.inner.lock();
        (queues.messages.len(), queues.callbacks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == (0, 0)
    }

    /// Drop every pending message and callback, in the queues and in both channels
    pub fn reset(
        &self,
        messages: &HandoffChannel<RawMessage>,
        callbacks: &HandoffChannel<MatchCallback>,
    ) -> ResetReport {
        let (dropped_messages, dropped_callbacks, report) = {
            let mut queues = self.inner.lock();
            let dropped_messages = std::mem::take(&mut queues.messages);
            let dropped_callbacks = std::mem::take(&mut queues.callbacks);
            let report = ResetReport {
                messages: dropped_messages.len() + messages.clear(),
                callbacks: dropped_callbacks.len() + callbacks.clear(),
            };
            (dropped_messages, dropped_callbacks, report)
        };
        // User closures are dropped outside the lock
        drop(dropped_callbacks);
        drop(dropped_messages);
        report
    }
}

/// Summary of one Matcher iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub messages_collected: usize,
    pub callbacks_collected: usize,
    pub matched: usize,
    /// Callbacks collected before a reset and dropped
    pub discarded: usize,
    /// No callback left pending and none newly arrived
    pub drained: bool,
}

pub struct Matcher<S: MessageSource> {
    source: Arc<S>,
    messages: Collector<RawMessage>,
    callbacks: Collector<MatchCallback>,
    queues: Arc<MatchQueues>,
    tracker: Arc<DrainTracker>,
    counters: Arc<PipelineCounters>,
    commit_policy: CommitPolicy,
    collect_timeout: Duration,
    /// Cleared by [`MatcherWorker::stop`]; checked before every pairing
    running: Arc<AtomicBool>,
}

impl<S: MessageSource> Matcher<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<S>,
        messages: Collector<RawMessage>,
        callbacks: Collector<MatchCallback>,
        queues: Arc<MatchQueues>,
        tracker: Arc<DrainTracker>,
        counters: Arc<PipelineCounters>,
        commit_policy: CommitPolicy,
        collect_timeout: Duration,
    ) -> Self {
        Self {
            source,
            messages,
            callbacks,
            queues,
            tracker,
            counters,
            commit_policy,
            collect_timeout,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Run one COLLECT → APPEND → DRAIN-PAIR → REPORT iteration
    pub fn run_cycle(&mut self) -> CycleReport {
        let (need_messages, need_callbacks) = {
            let queues = self.queues.inner.lock();
            (queues.messages.is_empty(), queues.callbacks.is_empty())
        };

        // COLLECT
        let new_messages = if need_messages {
            self.messages.collect(self.collect_timeout)
        } else {
            Vec::new()
        };
        let new_callbacks = if need_callbacks {
            self.callbacks.collect(self.collect_timeout)
        } else {
            Vec::new()
        };

        let mut report = CycleReport {
            messages_collected: new_messages.len(),
            callbacks_collected: new_callbacks.len(),
            ..CycleReport::default()
        };

        // APPEND
        let (stale_messages, stale_callbacks) = {
            let mut queues = self.queues.inner.lock();
            let messages_cleared =
                self.messages.generation() != self.messages.channel().generation();
            let callbacks_cleared =
                self.callbacks.generation() != self.callbacks.channel().generation();

            let stale_messages = if messages_cleared {
                new_messages
            } else {
                queues.messages.extend(new_messages);
                Vec::new()
            };
            let stale_callbacks = if callbacks_cleared {
                new_callbacks
            } else {
                queues.callbacks.extend(new_callbacks);
                Vec::new()
            };
            (stale_messages, stale_callbacks)
        };
        if !stale_messages.is_empty() || !stale_callbacks.is_empty() {
            debug!(
                messages = stale_messages.len(),
                callbacks = stale_callbacks.len(),
                "Dropping items collected before a reset"
            );
            report.discarded = stale_callbacks.len();
            self.counters
                .add_messages_discarded(stale_messages.len() as u64);
            self.counters
                .add_callbacks_discarded(stale_callbacks.len() as u64);
            self.tracker.settle(stale_callbacks.len() as u64);
        }

        // DRAIN-PAIR
        loop {
            // Pairs left once stopped are discarded by the exit reset, never invoked
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let pair = {
                let mut queues = self.queues.inner.lock();
                if queues.messages.is_empty() || queues.callbacks.is_empty() {
                    None
                } else {
                    queues.messages.pop_front().zip(queues.callbacks.pop_front())
                }
            };
            let Some((message, callback)) = pair else {
                break;
            };
            self.dispatch(message, callback);
            report.matched += 1;
        }

        // REPORT
        let callbacks_pending = !self.queues.inner.lock().callbacks.is_empty();
        if !callbacks_pending && report.callbacks_collected == 0 {
            report.drained = true;
            self.tracker.report_idle();
        }

        report
    }

    /// Invoke one callback, then commit its message per the commit policy
    fn dispatch(&self, message: RawMessage, callback: MatchCallback) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&message)));
        self.counters.add_invoked(1);

        let commit = match outcome {
            Ok(CallbackOutcome::Delivered) => true,
            Ok(CallbackOutcome::Rejected) => {
                self.counters.add_rejected(1);
                true
            }
            Err(payload) => {
                self.counters.add_panics(1);
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    panic = %panic_message(payload.as_ref()),
                    "Callback panicked"
                );
                self.commit_policy == CommitPolicy::Always
            }
        };

        if commit {
            if let Err(err) = self.source.ack(&message) {
                self.counters.add_ack_failures(1);
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "Failed to commit message"
                );
            }
        } else {
            self.counters.add_acks_skipped(1);
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Leaving message uncommitted after callback panic"
            );
        }

        self.tracker.settle(1);
    }

    /// Loop until `running` clears, then empty both channels so no producer
    /// stays blocked on a Matcher that is gone
    pub fn run(mut self) {
        while self.running.load(Ordering::Acquire) {
            self.run_cycle();
        }

        let report = self
            .queues
            .reset(self.messages.channel(), self.callbacks.channel());
        self.counters
            .add_messages_discarded(report.messages as u64);
        self.counters
            .add_callbacks_discarded(report.callbacks as u64);
        self.tracker.settle(report.callbacks as u64);
        info!(
            worker = WORKER_NAME,
            dropped_messages = report.messages,
            dropped_callbacks = report.callbacks,
            "🛑 Matcher stopped"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Thread handle for a running [`Matcher`]
pub struct MatcherWorker {
    running: Arc<AtomicBool>,
    messages: Arc<HandoffChannel<RawMessage>>,
    callbacks: Arc<HandoffChannel<MatchCallback>>,
    handle: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
}

impl MatcherWorker {
    pub fn spawn<S: MessageSource>(matcher: Matcher<S>) -> Result<Self> {
        let running = Arc::clone(&matcher.running);
        let messages = Arc::clone(matcher.messages.channel());
        let callbacks = Arc::clone(matcher.callbacks.channel());

        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || matcher.run())
            .map_err(|e| RecverError::worker_spawn(WORKER_NAME, e))?;
        let thread_id = handle.thread().id();

        info!(worker = WORKER_NAME, "🚀 Matcher started");

        Ok(Self {
            running,
            messages,
            callbacks,
            handle: Some(handle),
            thread_id: Some(thread_id),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the running flag and join the thread.
    ///
    /// A callback currently running is not interrupted, but no further pair
    /// is invoked. When called from a callback on the matcher thread itself
    /// the join is skipped and the loop exits after that callback returns,
    /// discarding whatever was still queued.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if self.thread_id == Some(thread::current().id()) {
            debug!(worker = WORKER_NAME, "Stop requested from matcher thread, not joining");
            self.handle.take();
            return;
        }

        // Cut short a collect wait that is already in progress
        self.messages.wake_collector();
        self.callbacks.wake_collector();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(worker = WORKER_NAME, "Matcher panicked");
            }
        }
    }
}

impl Drop for MatcherWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}
