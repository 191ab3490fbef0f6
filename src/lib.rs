#![allow(clippy::doc_markdown)] // Allow technical terms like JSON, Kafka in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Msg Recver
//!
//! Callback-oriented stream receiver built on a bounded, double-buffered
//! handoff between threads.
//!
//! ## Overview
//!
//! A [`Recver`] runs two fixed worker threads. The ingest worker fetches
//! batches from a [`MessageSource`] and hands them to the Matcher through a
//! [`HandoffChannel`]. Callers register one-shot callbacks through a second
//! channel. The Matcher pairs the *i*-th message with the *i*-th callback,
//! invokes it and commits the message.
//!
//! ```text
//! source ──► IngestWorker ──► message channel ──► Matcher ◄── callback channel ◄── Recver ◄── callers
//! ```
//!
//! ## Backpressure
//!
//! Each channel holds at most `2 × batch_capacity` items. The Matcher stops
//! collecting messages while unpaired ones are queued, so a caller that
//! registers callbacks slower than messages arrive ends up blocking the
//! ingest worker rather than growing memory.
//!
//! ## Module Organization
//!
//! - [`client`] - the [`Recver`] facade and default callbacks
//! - [`handoff`] - [`BoundedBatch`] and [`HandoffChannel`]
//! - [`execution`] - ingest worker, Matcher, drain tracking and counters
//! - [`source`] - the [`MessageSource`] trait and the in-process [`MemorySource`]
//! - [`messaging`] - message records and payload decoders
//! - [`config`] - [`RecverConfig`] and layered loading
//! - [`error`] - structured error handling
//! - [`logging`] - tracing subscriber setup
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! cargo bench --features benchmarks
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod handoff;
pub mod logging;
pub mod messaging;
pub mod source;

pub use client::{log_consume_error, log_consumed, Recver};
pub use config::{CommitPolicy, ConfigLoader, ConfigurationError, RecverConfig};
pub use error::{RecverError, Result};
pub use execution::{CallbackOutcome, RecverStats, WaitOutcome};
pub use handoff::{BoundedBatch, Collector, HandoffChannel};
pub use messaging::{
    BytesDecoder, ConsumedMessage, JsonDecoder, MessageDecoder, RawMessage, TypedJsonDecoder,
};
pub use source::{MemorySource, MessageSource};
