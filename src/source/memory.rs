//! In-process message source backed by a crossbeam channel.
//!
//! Records are published with increasing offsets per topic partition and
//! delivered only while their topic is subscribed; records for other topics
//! are dropped at fetch time. Fetch failures can be injected to exercise the
//! ingest worker's error path.

use super::MessageSource;
use crate::error::{RecverError, Result};
use crate::messaging::RawMessage;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct MemorySourceState {
    subscriptions: HashSet<String>,
    next_offsets: HashMap<(String, i32), i64>,
    acked: Vec<RawMessage>,
    injected_poll_failures: usize,
    polls: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct MemorySource {
    sender: Sender<RawMessage>,
    receiver: Receiver<RawMessage>,
    state: Mutex<MemorySourceState>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            state: Mutex::new(MemorySourceState::default()),
        }
    }

    /// Publish a payload to a topic partition, returning its offset
    pub fn publish(&self, topic: &str, partition: i32, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = self.next_offset(topic, partition);
        self.publish_raw(RawMessage::new(topic, partition, offset, payload));
        offset
    }

    /// Publish an error event for a topic partition
    pub fn publish_error(&self, topic: &str, partition: i32, error: impl Into<String>) {
        let offset = self.next_offset(topic, partition);
        self.publish_raw(RawMessage::failed(topic, partition, offset, error));
    }

    /// Publish a prepared record as-is
    pub fn publish_raw(&self, message: RawMessage) {
        // The receiver half lives in self, so the channel cannot be disconnected
        let _ = self.sender.send(message);
    }

    /// Make the next `count` fetches fail
    pub fn fail_next_polls(&self, count: usize) {
        self.state.lock().injected_poll_failures += count;
    }

    /// Records acknowledged so far, in acknowledgement order
    pub fn acked(&self) -> Vec<RawMessage> {
        self.state.lock().acked.clone()
    }

    pub fn acked_offsets(&self) -> Vec<(String, i32, i64)> {
        self.state
            .lock()
            .acked
            .iter()
            .map(|m| (m.topic.clone(), m.partition, m.offset))
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state.lock().subscriptions.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Records published but not yet fetched
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    pub fn poll_count(&self) -> u64 {
        self.state.lock().polls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn next_offset(&self, topic: &str, partition: i32) -> i64 {
        let mut state = self.state.lock();
        let next = state
            .next_offsets
            .entry((topic.to_string(), partition))
            .or_insert(0);
        let offset = *next;
        *next += 1;
        offset
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.state.lock().closed {
            return Err(RecverError::source(operation, "source is closed"));
        }
        Ok(())
    }
}

impl MessageSource for MemorySource {
    fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.ensure_open("subscribe")?;
        let mut state = self.state.lock();
        state.subscriptions = topics.iter().cloned().collect();
        debug!(topics = ?topics, "Memory source subscribed");
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        self.ensure_open("unsubscribe")?;
        self.state.lock().subscriptions.clear();
        Ok(())
    }

    fn poll_batch(&self, max_items: usize, timeout: Duration) -> Result<Vec<RawMessage>> {
        let subscriptions = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(RecverError::source("poll_batch", "source is closed"));
            }
            state.polls += 1;
            if state.injected_poll_failures > 0 {
                state.injected_poll_failures -= 1;
                return Err(RecverError::source("poll_batch", "injected fetch failure"));
            }
            state.subscriptions.clone()
        };

        let max_items = max_items.max(1);
        let mut batch = Vec::new();
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return Ok(batch)
            }
        };

        let mut next = Some(first);
        while let Some(message) = next {
            if subscriptions.contains(&message.topic) {
                batch.push(message);
            }
            if batch.len() >= max_items {
                break;
            }
            next = self.receiver.try_recv().ok();
        }

        Ok(batch)
    }

    fn ack(&self, message: &RawMessage) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(RecverError::source("ack", "source is closed"));
        }
        state.acked.push(message.clone());
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.subscriptions.clear();
        Ok(())
    }
}
