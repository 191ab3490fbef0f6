//! # Message Source Module
//!
//! The upstream stream client is an external collaborator. The receiver only
//! needs batch fetching, acknowledgement and subscription management from it,
//! expressed by [`MessageSource`]. Methods take `&self` because the source is
//! shared by the ingest thread (fetch, close), the matcher thread (ack) and
//! caller threads (subscribe, unsubscribe).

pub mod memory;

use crate::error::Result;
use crate::messaging::RawMessage;
use std::time::Duration;

pub use memory::MemorySource;

/// Batch-fetch / acknowledge interface of a stream client
pub trait MessageSource: Send + Sync + 'static {
    /// Replace the current subscription with `topics`
    fn subscribe(&self, topics: &[String]) -> Result<()>;

    fn unsubscribe(&self) -> Result<()>;

    /// Fetch up to `max_items` records, waiting at most `timeout`.
    ///
    /// An empty vector means nothing arrived in time.
    fn poll_batch(&self, max_items: usize, timeout: Duration) -> Result<Vec<RawMessage>>;

    /// Mark a record processed so it is not redelivered
    fn ack(&self, message: &RawMessage) -> Result<()>;

    /// Release the connection; called once by the ingest worker on shutdown
    fn close(&self) -> Result<()>;
}
