//! # Ingest Worker
//!
//! A single thread relaying fetched batches from the message source into the
//! message handoff channel. It never looks inside a record. When the Matcher
//! falls behind, `submit` blocks and the fetch cadence slows with it.

use super::stats::PipelineCounters;
use crate::error::{RecverError, Result};
use crate::handoff::HandoffChannel;
use crate::messaging::RawMessage;
use crate::source::MessageSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const WORKER_NAME: &str = "recver-ingest";

pub struct IngestWorker {
    running: Arc<AtomicBool>,
    channel: Arc<HandoffChannel<RawMessage>>,
    handle: Option<JoinHandle<()>>,
}

impl IngestWorker {
    /// Start the ingest thread.
    ///
    /// Each fetch asks the source for at most one channel buffer worth of
    /// records and waits at most `poll_timeout`.
    pub fn spawn<S: MessageSource>(
        source: Arc<S>,
        channel: Arc<HandoffChannel<RawMessage>>,
        poll_timeout: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));

        let loop_running = Arc::clone(&running);
        let loop_channel = Arc::clone(&channel);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                run_ingest_loop(
                    source.as_ref(),
                    &loop_channel,
                    &loop_running,
                    poll_timeout,
                    &counters,
                )
            })
            .map_err(|e| RecverError::worker_spawn(WORKER_NAME, e))?;

        info!(
            worker = WORKER_NAME,
            batch_size = channel.capacity(),
            poll_timeout_ms = poll_timeout.as_millis() as u64,
            "🚀 Ingest worker started"
        );

        Ok(Self {
            running,
            channel,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop fetching, close the message channel and join the thread.
    ///
    /// Closing the channel releases the worker if it is blocked in `submit`;
    /// a fetch in progress finishes within the poll timeout.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.channel.close();

        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                error!(worker = WORKER_NAME, "Ingest worker panicked");
            }
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run_ingest_loop<S: MessageSource>(
    source: &S,
    channel: &HandoffChannel<RawMessage>,
    running: &AtomicBool,
    poll_timeout: Duration,
    counters: &PipelineCounters,
) {
    while running.load(Ordering::Acquire) {
        // A clear after this point (unsubscribe) makes the fetched batch stale
        let generation = channel.generation();
        match source.poll_batch(channel.capacity(), poll_timeout) {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                let fetched = batch.len();
                counters.add_fetched(fetched as u64);
                debug!(fetched, "Relaying fetched batch");

                match channel.submit_if_generation(batch, generation) {
                    Ok(0) => {}
                    Ok(dropped) => {
                        counters.add_messages_discarded(dropped as u64);
                        debug!(dropped, "Discarded batch fetched before a reset");
                    }
                    Err(err) => {
                        if running.load(Ordering::Acquire) {
                            warn!(error = %err, "Message channel refused batch, stopping ingest");
                        }
                        break;
                    }
                }
            }
            Err(err) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                counters.add_fetch_errors(1);
                warn!(error = %err, "Source fetch failed, retrying");
                // Keep a failing source from spinning the thread; stop() unparks
                thread::park_timeout(poll_timeout);
            }
        }
    }

    if let Err(err) = source.close() {
        warn!(error = %err, "Failed to close message source");
    }
    info!(worker = WORKER_NAME, "🛑 Ingest worker stopped");
}
