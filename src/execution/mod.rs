//! # Execution Module
//!
//! The two worker threads of a receiver and the state they share.
//!
//! - [`IngestWorker`] - relays fetched batches into the message channel
//! - [`Matcher`] / [`MatcherWorker`] - pairs messages with callbacks in order
//! - [`DrainTracker`] - counted drain condition behind the blocking waits
//! - [`PipelineCounters`] - lock-free counters exposed as [`RecverStats`]

pub mod callback;
pub mod drain;
pub mod ingest;
pub mod matcher;
pub mod stats;

pub use callback::{on_raw, CallbackOutcome, MatchCallback};
pub use drain::{DrainTracker, WaitOutcome};
pub use ingest::IngestWorker;
pub use matcher::{CycleReport, MatchQueues, Matcher, MatcherWorker, ResetReport};
pub use stats::{PipelineCounters, RecverStats};
