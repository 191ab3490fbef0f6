//! # Receiver Client
//!
//! [`Recver`] is the public face of the pipeline. Constructing one starts the
//! Matcher and the ingest worker; callers then register one-shot callbacks,
//! each of which is paired with exactly one future message in registration
//! order.
//!
//! ## Usage
//!
//! ```rust
//! use msg_recver::{MemorySource, RecverConfig, Recver};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> msg_recver::Result<()> {
//! let source = Arc::new(MemorySource::new());
//! let recver = Recver::new(RecverConfig::new("localhost:9092", "billing"), Arc::clone(&source))?;
//! recver.subscribe(["orders"])?;
//!
//! source.publish("orders", 0, r#"{"id":1}"#);
//! let outcome = recver.consume_sync(
//!     |message| println!("{} @ {}", message.value, message.offset),
//!     |error| eprintln!("{error}"),
//!     Some(Duration::from_secs(5)),
//! )?;
//! assert!(outcome.is_drained());
//!
//! recver.close();
//! # Ok(())
//! # }
//! ```

pub mod callbacks;

use crate::config::RecverConfig;
use crate::error::{RecverError, Result};
use crate::execution::{
    on_raw, DrainTracker, IngestWorker, MatchCallback, MatchQueues, Matcher, MatcherWorker,
    PipelineCounters, RecverStats, ResetReport, WaitOutcome,
};
use crate::handoff::HandoffChannel;
use crate::logging::log_worker_operation;
use crate::messaging::{ConsumedMessage, JsonDecoder, MessageDecoder, RawMessage};
use crate::source::MessageSource;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use callbacks::{log_consume_error, log_consumed};

struct Workers {
    matcher: MatcherWorker,
    ingest: IngestWorker,
}

/// Callback-oriented stream receiver
pub struct Recver<S: MessageSource, D: MessageDecoder = JsonDecoder> {
    config: RecverConfig,
    source: Arc<S>,
    decoder: Arc<D>,
    messages: Arc<HandoffChannel<RawMessage>>,
    callbacks: Arc<HandoffChannel<MatchCallback>>,
    queues: Arc<MatchQueues>,
    tracker: Arc<DrainTracker>,
    counters: Arc<PipelineCounters>,
    /// Held across ticket issue and submit so ticket order is channel order
    registration: Mutex<()>,
    workers: Mutex<Option<Workers>>,
    closed: AtomicBool,
}

impl<S: MessageSource> Recver<S, JsonDecoder> {
    /// Start a receiver decoding payloads as JSON
    pub fn new(config: RecverConfig, source: Arc<S>) -> Result<Self> {
        Self::with_decoder(config, source, JsonDecoder)
    }
}

impl<S: MessageSource, D: MessageDecoder> Recver<S, D> {
    /// Start a receiver with a custom payload decoder
    pub fn with_decoder(config: RecverConfig, source: Arc<S>, decoder: D) -> Result<Self> {
        config.validate()?;

        let capacity = config.batch_capacity;
        let (messages, message_collector) = HandoffChannel::new("messages", capacity);
        let (callbacks, callback_collector) = HandoffChannel::new("callbacks", capacity);
        let queues = Arc::new(MatchQueues::new());
        let tracker = Arc::new(DrainTracker::new());
        let counters = Arc::new(PipelineCounters::default());

        let matcher = MatcherWorker::spawn(Matcher::new(
            Arc::clone(&source),
            message_collector,
            callback_collector,
            Arc::clone(&queues),
            Arc::clone(&tracker),
            Arc::clone(&counters),
            config.commit_policy,
            config.collect_timeout(),
        ))?;
        // On failure the matcher is stopped by its Drop
        let ingest = IngestWorker::spawn(
            Arc::clone(&source),
            Arc::clone(&messages),
            config.poll_timeout(),
            Arc::clone(&counters),
        )?;

        info!(
            group_id = %config.group_id,
            batch_capacity = capacity,
            commit_policy = ?config.commit_policy,
            "✅ Receiver started"
        );

        Ok(Self {
            config,
            source,
            decoder: Arc::new(decoder),
            messages,
            callbacks,
            queues,
            tracker,
            counters,
            registration: Mutex::new(()),
            workers: Mutex::new(Some(Workers { matcher, ingest })),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RecverConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RecverStats {
        self.counters.snapshot()
    }

    /// Registrations neither invoked nor discarded yet
    pub fn outstanding(&self) -> u64 {
        self.tracker.outstanding()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(RecverError::Closed)
        } else {
            Ok(())
        }
    }

    /// Replace the source subscription with `topics`
    pub fn subscribe<I, T>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.ensure_open()?;
        let topics: Vec<String> = topics.into_iter().map(Into::into).collect();
        self.source.subscribe(&topics)?;
        info!(topics = ?topics, "📡 Subscribed");
        Ok(())
    }

    /// Queue a registration and return its ticket
    fn register(&self, callback: MatchCallback) -> Result<u64> {
        self.ensure_open()?;
        let _order = self.registration.lock();
        let ticket = self.tracker.register();
        if let Err(err) = self.callbacks.submit(vec![callback]) {
            // Never reaches the Matcher, so nothing else will settle it
            self.tracker.settle(1);
            return Err(if self.is_closed() { RecverError::Closed } else { err });
        }
        debug!(ticket, "Callback registered");
        Ok(ticket)
    }

    /// Register callbacks for the next unmatched message and return immediately.
    ///
    /// Blocks only while the callback channel is saturated. Must not be
    /// called from inside a callback when that can happen, since the
    /// callback thread is the one that would relieve it.
    pub fn consume_async<F, E>(&self, on_success: F, on_error: E) -> Result<()>
    where
        F: FnOnce(ConsumedMessage<D::Value>) + Send + 'static,
        E: FnOnce(RecverError) + Send + 'static,
    {
        let callback = callbacks::adapt(Arc::clone(&self.decoder), on_success, on_error);
        self.register(callback).map(|_| ())
    }

    /// Register callbacks and block until they (and every earlier
    /// registration) have been invoked or discarded.
    ///
    /// `None` waits without a deadline. Calling this from inside a callback
    /// would wait on the thread that runs it; use [`Recver::consume_async`]
    /// there instead.
    pub fn consume_sync<F, E>(
        &self,
        on_success: F,
        on_error: E,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome>
    where
        F: FnOnce(ConsumedMessage<D::Value>) + Send + 'static,
        E: FnOnce(RecverError) + Send + 'static,
    {
        let callback = callbacks::adapt(Arc::clone(&self.decoder), on_success, on_error);
        let ticket = self.register(callback)?;
        let outcome = self.tracker.wait_for_ticket(ticket, timeout);
        if outcome == WaitOutcome::TimedOut {
            debug!(ticket, "consume_sync timed out");
        }
        Ok(outcome)
    }

    /// Register a callback that receives the undecoded record
    pub fn consume_raw_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&RawMessage) + Send + 'static,
    {
        self.register(on_raw(callback)).map(|_| ())
    }

    /// Block until every registration made so far has settled
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.tracker.wait_all(timeout)
    }

    /// Wait for pending callbacks, drop the source subscription, then discard
    /// every queued message and registration.
    ///
    /// Registrations still pending when `timeout` elapses are discarded and
    /// never invoked; the returned outcome says whether that happened.
    pub fn unsubscribe(&self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        self.ensure_open()?;
        let outcome = self.wait(timeout);
        self.source.unsubscribe()?;

        let report = self.discard_pending();
        if report.callbacks > 0 {
            warn!(
                discarded_callbacks = report.callbacks,
                discarded_messages = report.messages,
                "Unsubscribed with callbacks still pending"
            );
        } else {
            info!(discarded_messages = report.messages, "Unsubscribed");
        }
        Ok(outcome)
    }

    /// Drop queued messages and registrations, settling the registrations
    fn discard_pending(&self) -> ResetReport {
        let report = self.queues.reset(&self.messages, &self.callbacks);
        self.counters
            .add_messages_discarded(report.messages as u64);
        self.counters
            .add_callbacks_discarded(report.callbacks as u64);
        self.tracker.settle(report.callbacks as u64);
        report
    }

    /// Stop both workers and release the source.
    ///
    /// Idempotent. Pending registrations are abandoned, which releases every
    /// blocked `consume_sync` and `wait` caller.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log_worker_operation("recver", "close", Some("stopping matcher and ingest worker"));

        let workers = self.workers.lock().take();
        if let Some(mut workers) = workers {
            workers.matcher.stop();
            // Needed when stopped from a callback, where the Matcher is not joined
            self.discard_pending();
            self.callbacks.close();
            workers.ingest.stop();
        }

        let abandoned = self.tracker.abandon_all();
        info!(abandoned, stats = ?self.counters.snapshot(), "🛑 Receiver closed");
    }
}

impl<S: MessageSource, D: MessageDecoder> Recver<S, D>
where
    D::Value: Debug,
{
    /// Register the default callbacks, which only log the outcome
    pub fn consume_logged(&self) -> Result<()> {
        self.consume_async(log_consumed, log_consume_error)
    }
}

impl<S: MessageSource, D: MessageDecoder> Drop for Recver<S, D> {
    fn drop(&mut self) {
        self.close();
    }
}
