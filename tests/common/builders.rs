//! Fixtures shared by the integration tests.

use msg_recver::{MemorySource, Recver, RecverConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const TOPIC: &str = "orders";

/// Generous upper bound for waits that should finish almost immediately
pub const PATIENCE: Duration = Duration::from_secs(10);

/// Configuration with short timeouts so tests never sit in a full poll interval
pub fn test_config(capacity: usize) -> RecverConfig {
    let mut config = RecverConfig::new("localhost:9092", "integration-tests");
    config.batch_capacity = capacity;
    config.poll_timeout_ms = 20;
    config.collect_timeout_ms = 20;
    config
}

/// A receiver over a fresh memory source, already subscribed to [`TOPIC`]
pub fn subscribed_recver(config: RecverConfig) -> (Arc<MemorySource>, Recver<MemorySource>) {
    let source = Arc::new(MemorySource::new());
    let recver = Recver::new(config, Arc::clone(&source)).expect("receiver should start");
    recver.subscribe([TOPIC]).expect("subscribe should succeed");
    (source, recver)
}

/// Poll `condition` until it holds or [`PATIENCE`] runs out
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Thread-safe log of what callbacks saw
#[derive(Debug, Clone, Default)]
pub struct Recorder<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, entry: T) {
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<T> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
