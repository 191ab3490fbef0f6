//! # Message Structures
//!
//! Raw records as fetched from the source, and the decoded form handed to
//! success callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record fetched from the message source, before decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    /// Set when the source delivered an error event instead of a record
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RawMessage {
    /// Create a record carrying a payload
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: Some(payload.into()),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an error event for a topic partition
    pub fn failed(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Payload bytes, empty for tombstones and error events
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// A decoded message as seen by success callbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedMessage<V> {
    pub value: V,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
}

impl<V> ConsumedMessage<V> {
    /// Attach a decoded value to the coordinates of its raw record
    pub fn from_raw(raw: &RawMessage, value: V) -> Self {
        Self {
            value,
            topic: raw.topic.clone(),
            partition: raw.partition,
            offset: raw.offset,
            timestamp: raw.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_message() {
        let message = RawMessage::new("orders", 1, 42, br#"{"id":1}"#.to_vec()).with_key("k1");
        assert!(!message.is_error());
        assert_eq!(message.payload(), br#"{"id":1}"#);
        assert_eq!(message.key.as_deref(), Some(&b"k1"[..]));
    }

    #[test]
    fn test_error_message() {
        let message = RawMessage::failed("orders", 0, -1, "partition EOF");
        assert!(message.is_error());
        assert_eq!(message.error_message(), Some("partition EOF"));
        assert!(message.payload().is_empty());
    }

    #[test]
    fn test_consumed_message_keeps_coordinates() {
        let raw = RawMessage::new("orders", 2, 7, "x");
        let consumed = ConsumedMessage::from_raw(&raw, 99u32);
        assert_eq!(consumed.value, 99);
        assert_eq!(consumed.topic, "orders");
        assert_eq!(consumed.partition, 2);
        assert_eq!(consumed.offset, 7);
    }
}
