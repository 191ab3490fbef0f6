//! # Receiver Configuration
//!
//! Settings for one receiver instance: where the source connects, how large
//! the handoff buffers are, how long each worker waits before rechecking its
//! running flag, and when processed messages are committed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use msg_recver::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Base file, then config/<env>.toml, then RECVER_* environment variables
//! let config = ConfigLoader::new().with_directory("config").load()?;
//!
//! let properties = config.source_properties();
//! assert_eq!(properties["enable.auto.offset.store"], "false");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Largest accepted `batch_capacity`; each channel preallocates four buffers of it
pub const MAX_BATCH_CAPACITY: usize = 1_000_000;

/// When the Matcher acknowledges a message after invoking its callback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit after every invocation, including a panicking one (at-most-once)
    #[default]
    Always,
    /// Leave the offset uncommitted when the callback panicked, so the source
    /// redelivers the message after a restart or rebalance
    UnlessPanicked,
}

/// Root configuration for a receiver
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecverConfig {
    /// Bootstrap broker list, comma separated
    pub brokers: String,

    /// Consumer group identifier
    pub group_id: String,

    /// Capacity of every handoff buffer, also the maximum batch fetched per poll
    pub batch_capacity: usize,

    /// How long one source fetch may block
    pub poll_timeout_ms: u64,

    /// How long the Matcher waits on an empty channel before rechecking its running flag
    pub collect_timeout_ms: u64,

    /// Where to start when the group has no committed offset
    pub auto_offset_reset: String,

    /// Source-side local queue buffering delay
    pub queue_buffering_max_ms: u64,

    pub commit_policy: CommitPolicy,

    /// Extra source properties passed through verbatim
    pub properties: HashMap<String, String>,
}

impl Default for RecverConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            group_id: String::new(),
            batch_capacity: 1000,
            poll_timeout_ms: 300,
            collect_timeout_ms: 500,
            auto_offset_reset: "smallest".to_string(),
            queue_buffering_max_ms: 50,
            commit_policy: CommitPolicy::Always,
            properties: HashMap::new(),
        }
    }
}

impl RecverConfig {
    /// Create a configuration for the given brokers and group with default tuning
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            ..Self::default()
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    /// Validate the configuration, rejecting values the pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.brokers.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "brokers",
                "receiver configuration",
            ));
        }

        if self.group_id.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "group_id",
                "receiver configuration",
            ));
        }

        if self.batch_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch_capacity",
                "0",
                "handoff buffers must hold at least one item",
            ));
        }
        if self.batch_capacity > MAX_BATCH_CAPACITY {
            return Err(ConfigurationError::invalid_value(
                "batch_capacity",
                self.batch_capacity.to_string(),
                format!("handoff buffers hold at most {MAX_BATCH_CAPACITY} items"),
            ));
        }

        for (field, value) in [
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("collect_timeout_ms", self.collect_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "worker waits must be bounded by a non-zero timeout",
                ));
            }
        }

        Ok(())
    }

    /// Render the Kafka-style property map handed to a source client
    ///
    /// Offsets are stored explicitly by the Matcher, so automatic offset
    /// storing is always disabled and cannot be overridden.
    pub fn source_properties(&self) -> BTreeMap<String, String> {
        let mut properties: BTreeMap<String, String> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        properties.insert("bootstrap.servers".to_string(), self.brokers.clone());
        properties.insert("group.id".to_string(), self.group_id.clone());
        properties.insert(
            "auto.offset.reset".to_string(),
            self.auto_offset_reset.clone(),
        );
        properties.insert(
            "queue.buffering.max.ms".to_string(),
            self.queue_buffering_max_ms.to_string(),
        );
        properties.insert("enable.auto.offset.store".to_string(), "false".to_string());
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecverConfig::new("localhost:9092", "billing");
        assert_eq!(config.batch_capacity, 1000);
        assert_eq!(config.poll_timeout(), Duration::from_millis(300));
        assert_eq!(config.collect_timeout(), Duration::from_millis(500));
        assert_eq!(config.commit_policy, CommitPolicy::Always);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let config = RecverConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { ref field, .. }) if field == "brokers"
        ));

        let config = RecverConfig::new("localhost:9092", "  ");
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { ref field, .. }) if field == "group_id"
        ));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = RecverConfig::new("localhost:9092", "billing");
        config.batch_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RecverConfig::new("localhost:9092", "billing");
        config.collect_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "collect_timeout_ms"
        ));
    }

    #[test]
    fn test_validation_bounds_batch_capacity() {
        let mut config = RecverConfig::new("localhost:9092", "billing");
        config.batch_capacity = MAX_BATCH_CAPACITY;
        assert!(config.validate().is_ok());

        config.batch_capacity = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "batch_capacity"
        ));
    }

    #[test]
    fn test_source_properties() {
        let mut config = RecverConfig::new("broker-1:9092,broker-2:9092", "billing");
        config
            .properties
            .insert("session.timeout.ms".to_string(), "6000".to_string());
        config
            .properties
            .insert("enable.auto.offset.store".to_string(), "true".to_string());

        let properties = config.source_properties();
        assert_eq!(properties["bootstrap.servers"], "broker-1:9092,broker-2:9092");
        assert_eq!(properties["group.id"], "billing");
        assert_eq!(properties["auto.offset.reset"], "smallest");
        assert_eq!(properties["queue.buffering.max.ms"], "50");
        assert_eq!(properties["session.timeout.ms"], "6000");
        assert_eq!(properties["enable.auto.offset.store"], "false");
    }

    #[test]
    fn test_commit_policy_serde() {
        let policy: CommitPolicy = serde_json::from_str("\"unless_panicked\"").unwrap();
        assert_eq!(policy, CommitPolicy::UnlessPanicked);
        assert_eq!(
            serde_json::to_string(&CommitPolicy::Always).unwrap(),
            "\"always\""
        );
    }
}
