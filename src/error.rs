//! # Receiver Error Types
//!
//! Structured error handling for the receiver pipeline using thiserror
//! instead of `Box<dyn Error>` patterns.

use crate::config::ConfigurationError;
use thiserror::Error;

/// Errors surfaced by the handoff channels, the workers and the public client
#[derive(Error, Debug)]
pub enum RecverError {
    #[error("Handoff channel closed: {channel}")]
    ChannelClosed { channel: String },

    #[error("Message source error: {operation}: {message}")]
    Source { operation: String, message: String },

    #[error("Message deserialization error: {message}")]
    Deserialization { message: String },

    #[error("Message error on {topic}[{partition}]: {message}")]
    Message {
        topic: String,
        partition: i32,
        message: String,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to spawn {worker} worker: {message}")]
    WorkerSpawn { worker: String, message: String },

    #[error("Receiver is closed")]
    Closed,
}

impl RecverError {
    /// Create a channel closed error
    pub fn channel_closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed {
            channel: channel.into(),
        }
    }

    /// Create a source operation error
    pub fn source(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    /// Create an error for a message that arrived carrying an error marker
    pub fn message(topic: impl Into<String>, partition: i32, message: impl Into<String>) -> Self {
        Self::Message {
            topic: topic.into(),
            partition,
            message: message.into(),
        }
    }

    /// Create a worker spawn error
    pub fn worker_spawn(worker: impl Into<String>, err: std::io::Error) -> Self {
        Self::WorkerSpawn {
            worker: worker.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error means the pipeline is shutting down
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. } | Self::Closed)
    }
}

/// Conversion from serde_json::Error to RecverError
impl From<serde_json::Error> for RecverError {
    fn from(err: serde_json::Error) -> Self {
        RecverError::deserialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecverError::message("orders", 3, "broker transport failure");
        assert_eq!(
            err.to_string(),
            "Message error on orders[3]: broker transport failure"
        );

        let err = RecverError::channel_closed("messages");
        assert_eq!(err.to_string(), "Handoff channel closed: messages");
    }

    #[test]
    fn test_shutdown_classification() {
        assert!(RecverError::channel_closed("callbacks").is_shutdown());
        assert!(RecverError::Closed.is_shutdown());
        assert!(!RecverError::deserialization("bad json").is_shutdown());
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RecverError = parse_err.into();
        assert!(matches!(err, RecverError::Deserialization { .. }));
    }
}
