//! # Handoff Channel
//!
//! Moves bursts of items from producer threads to a single consumer with
//! very short critical sections. The producer side owns a *current* buffer,
//! an optional *standby* buffer and a *backlog* of filled buffers. The
//! consumer ([`Collector`]) owns two spare buffers of its own.
//!
//! ```text
//!  submit()                                   collect()
//!  ───────►  current ──full──► backlog ──swap──► taken ──drain──► Vec<T>
//!               ▲                                  │
//!               └──── standby ◄──── spares ◄───────┘
//! ```
//!
//! Every channel owns exactly four buffers for its whole life. The producer
//! side always holds two of them, so at most `2 × capacity` items wait
//! uncollected. A producer that finds both of its buffers full blocks until
//! the collector hands a drained buffer back, which is the pipeline's only
//! form of backpressure.

use super::batch::BoundedBatch;
use crate::error::{RecverError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Producer-side buffer slots, guarded by the channel mutex
#[derive(Debug)]
struct Slots<T> {
    current: Option<BoundedBatch<T>>,
    standby: Option<BoundedBatch<T>>,
    backlog: Vec<BoundedBatch<T>>,
    /// Bumped by every clear, so a collector can tell its items were cleared since
    generation: u64,
    closed: bool,
}

impl<T> Slots<T> {
    fn has_items(&self) -> bool {
        !self.backlog.is_empty() || self.current.as_ref().is_some_and(|b| !b.is_empty())
    }

    fn buffered_len(&self) -> usize {
        self.current.iter().map(BoundedBatch::readable_count).sum::<usize>()
            + self.standby.iter().map(BoundedBatch::readable_count).sum::<usize>()
            + self.backlog.iter().map(BoundedBatch::readable_count).sum::<usize>()
    }

    /// Put an empty buffer into the first vacant producer slot
    fn restock(&mut self, batch: BoundedBatch<T>) -> Option<BoundedBatch<T>> {
        if self.current.is_none() {
            self.current = Some(batch);
            None
        } else if self.standby.is_none() {
            self.standby = Some(batch);
            None
        } else {
            Some(batch)
        }
    }

    /// Discard every buffered item and return backlog buffers to the slots
    fn discard_all(&mut self) -> usize {
        self.generation += 1;
        let mut discarded = 0;
        for batch in self.current.iter_mut().chain(self.standby.iter_mut()) {
            discarded += batch.readable_count();
            batch.clear();
        }
        while let Some(mut batch) = self.backlog.pop() {
            discarded += batch.readable_count();
            batch.clear();
            if self.restock(batch).is_some() {
                warn!("Handoff channel held more buffers than slots while clearing");
            }
        }
        discarded
    }
}

/// Producer handle and shared state of one handoff channel
#[derive(Debug)]
pub struct HandoffChannel<T> {
    name: String,
    capacity: usize,
    slots: Mutex<Slots<T>>,
    became_empty: Condvar,
    became_nonempty: Condvar,
}

impl<T> HandoffChannel<T> {
    /// Create a channel and its single consumer end.
    ///
    /// All four buffers are allocated here and recycled afterwards.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Arc<Self>, Collector<T>) {
        let capacity = capacity.max(1);
        let channel = Arc::new(Self {
            name: name.into(),
            capacity,
            slots: Mutex::new(Slots {
                current: Some(BoundedBatch::new(capacity)),
                standby: Some(BoundedBatch::new(capacity)),
                backlog: Vec::with_capacity(3),
                generation: 0,
                closed: false,
            }),
            became_empty: Condvar::new(),
            became_nonempty: Condvar::new(),
        });

        let collector = Collector {
            channel: Arc::clone(&channel),
            spares: vec![BoundedBatch::new(capacity), BoundedBatch::new(capacity)],
            taken: Vec::with_capacity(3),
            generation: 0,
        };

        (channel, collector)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items waiting on the producer side (current, standby and backlog)
    pub fn buffered_len(&self) -> usize {
        self.slots.lock().buffered_len()
    }

    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Number of clears so far
    pub fn generation(&self) -> u64 {
        self.slots.lock().generation
    }

    /// Release a collector blocked in `collect` early, without touching the items
    pub fn wake_collector(&self) {
        let _slots = self.slots.lock();
        self.became_nonempty.notify_all();
    }

    /// Hand `items` to the consumer, blocking while both producer buffers are full.
    ///
    /// Batches larger than the channel capacity are split into
    /// capacity-sized chunks that keep their order. Returns
    /// [`RecverError::ChannelClosed`] once the channel has been closed; items
    /// of the batch not yet appended at that point are dropped.
    pub fn submit(&self, items: Vec<T>) -> Result<()> {
        self.submit_checked(items, None).map(|_| ())
    }

    /// Like [`submit`](Self::submit), but only while the channel is still at
    /// `generation`.
    ///
    /// A producer that read the generation before producing its batch uses
    /// this so the batch never lands in a channel cleared in the meantime.
    /// The check is repeated after every wait for a free buffer. Returns how
    /// many items were dropped because the generation moved on (0 when the
    /// whole batch was handed over).
    pub fn submit_if_generation(&self, items: Vec<T>, generation: u64) -> Result<usize> {
        self.submit_checked(items, Some(generation))
    }

    fn submit_checked(&self, items: Vec<T>, generation: Option<u64>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut slots = self.slots.lock();
        let mut pending = items;
        while !pending.is_empty() {
            let rest = if pending.len() > self.capacity {
                pending.split_off(self.capacity)
            } else {
                Vec::new()
            };
            if let Some(stale) = self.submit_chunk(&mut slots, pending, generation)? {
                let dropped = stale.len() + rest.len();
                debug!(channel = %self.name, dropped, "Dropping batch produced before a clear");
                return Ok(dropped);
            }
            pending = rest;
        }
        Ok(0)
    }

    /// Append one chunk, handing it back if the generation no longer matches
    fn submit_chunk(
        &self,
        slots: &mut MutexGuard<'_, Slots<T>>,
        mut chunk: Vec<T>,
        generation: Option<u64>,
    ) -> Result<Option<Vec<T>>> {
        loop {
            if slots.closed {
                return Err(RecverError::channel_closed(&self.name));
            }
            if generation.is_some_and(|expected| expected != slots.generation) {
                return Ok(Some(chunk));
            }

            if let Some(mut current) = slots.current.take() {
                match current.append(chunk) {
                    Ok(()) => {
                        slots.current = Some(current);
                        self.became_nonempty.notify_one();
                        return Ok(None);
                    }
                    Err(overflow) => {
                        chunk = overflow.items;
                        slots.backlog.push(current);
                    }
                }
            }

            if let Some(standby) = slots.standby.take() {
                trace!(channel = %self.name, "Promoting standby buffer");
                slots.current = Some(standby);
                continue;
            }

            debug!(
                channel = %self.name,
                backlog = slots.backlog.len(),
                buffered = slots.buffered_len(),
                "Handoff channel saturated, waiting for collector"
            );
            self.became_nonempty.notify_one();
            self.became_empty.wait(slots);
        }
    }

    /// Discard everything buffered on the producer side and wake blocked producers.
    ///
    /// Returns the number of discarded items.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock();
        let discarded = slots.discard_all();
        self.became_empty.notify_all();
        if discarded > 0 {
            debug!(channel = %self.name, discarded, "Handoff channel cleared");
        }
        discarded
    }

    /// Clear the channel and refuse further submissions.
    ///
    /// Both conditions are broadcast so no producer or collector stays
    /// blocked past teardown.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        slots.closed = true;
        let discarded = slots.discard_all();
        self.became_empty.notify_all();
        self.became_nonempty.notify_all();
        debug!(channel = %self.name, discarded, "Handoff channel closed");
    }
}

/// Consumer end of a [`HandoffChannel`].
///
/// There is exactly one per channel; `collect` takes `&mut self`, so the
/// single-consumer rule is enforced by ownership.
#[derive(Debug)]
pub struct Collector<T> {
    channel: Arc<HandoffChannel<T>>,
    spares: Vec<BoundedBatch<T>>,
    taken: Vec<BoundedBatch<T>>,
    generation: u64,
}

impl<T> Collector<T> {
    pub fn channel(&self) -> &Arc<HandoffChannel<T>> {
        &self.channel
    }

    /// Channel generation observed by the last `collect`.
    ///
    /// If it differs from [`HandoffChannel::generation`], the channel was
    /// cleared after those items were taken.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Take everything the producers have handed over, in submission order.
    ///
    /// Waits at most `timeout` for something to arrive and returns an empty
    /// vector if nothing did, so the caller can recheck its running flag.
    pub fn collect(&mut self, timeout: Duration) -> Vec<T> {
        let channel = &*self.channel;
        {
            let mut slots = channel.slots.lock();
            if !slots.has_items() && !slots.closed {
                channel.became_nonempty.wait_for(&mut slots, timeout);
            }

            self.generation = slots.generation;
            std::mem::swap(&mut self.taken, &mut slots.backlog);
            if slots.current.as_ref().is_some_and(|b| !b.is_empty()) {
                self.taken.extend(slots.current.take());
            }

            let mut refilled = false;
            if slots.current.is_none() {
                slots.current = self.spares.pop();
                refilled = true;
            }
            if slots.standby.is_none() {
                slots.standby = self.spares.pop();
                refilled = true;
            }
            if refilled {
                channel.became_empty.notify_all();
            }
        }

        let mut out = Vec::new();
        for mut batch in self.taken.drain(..) {
            batch.drain_into(&mut out);
            self.spares.push(batch);
        }
        if !out.is_empty() {
            trace!(channel = %channel.name, collected = out.len(), "Collected handoff items");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;
    use std::thread;
    use std::time::Instant;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_fast_path_submit_and_collect() {
        let (channel, mut collector) = HandoffChannel::new("test", 4);
        channel.submit(vec![1, 2]).unwrap();
        channel.submit(vec![3]).unwrap();

        assert_eq!(channel.buffered_len(), 3);
        assert_eq!(collector.collect(SHORT), vec![1, 2, 3]);
        assert_eq!(channel.buffered_len(), 0);
    }

    #[test]
    fn test_order_preserved_across_rotation() {
        let (channel, mut collector) = HandoffChannel::new("test", 2);
        channel.submit(vec![1, 2]).unwrap();
        channel.submit(vec![3]).unwrap();
        channel.submit(vec![4]).unwrap();

        assert_eq!(collector.collect(SHORT), vec![1, 2, 3, 4]);

        channel.submit(vec![5, 6]).unwrap();
        channel.submit(vec![7]).unwrap();
        assert_eq!(collector.collect(SHORT), vec![5, 6, 7]);
    }

    #[test]
    fn test_oversized_batch_is_split() {
        let (channel, mut collector) = HandoffChannel::new("test", 2);
        let handle = thread::spawn(move || channel.submit((1..=5).collect()));

        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while received.len() < 5 && Instant::now() < deadline {
            received.extend(collector.collect(SHORT));
        }

        handle.join().unwrap().unwrap();
        assert_eq!(received, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_collect_on_empty_channel_times_out() {
        let (_channel, mut collector) = HandoffChannel::<u32>::new("test", 4);

        let started = Instant::now();
        assert!(collector.collect(Duration::from_millis(50)).is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));

        // Restartable
        assert!(collector.collect(SHORT).is_empty());
    }

    #[test]
    fn test_third_submit_blocks_until_collect() {
        let (channel, mut collector) = HandoffChannel::new("test", 1);
        channel.submit(vec![1]).unwrap();
        channel.submit(vec![2]).unwrap();
        assert_eq!(channel.buffered_len(), 2);

        let (done_tx, done_rx) = bounded(1);
        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            let result = producer.submit(vec![3]);
            done_tx.send(()).unwrap();
            result
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(150)).is_err());
        assert_eq!(channel.buffered_len(), 2);

        assert_eq!(collector.collect(SHORT), vec![1, 2]);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(collector.collect(SHORT), vec![3]);
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let (channel, _collector) = HandoffChannel::new("test", 1);
        channel.submit(vec![1]).unwrap();
        channel.submit(vec![2]).unwrap();

        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || producer.submit(vec![3]));

        thread::sleep(Duration::from_millis(50));
        channel.close();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(RecverError::ChannelClosed { .. })));
        assert!(channel.is_closed());
        assert_eq!(channel.buffered_len(), 0);
        assert!(channel.submit(vec![4]).is_err());
    }

    #[test]
    fn test_clear_discards_and_unblocks() {
        let (channel, mut collector) = HandoffChannel::new("test", 1);
        channel.submit(vec![1]).unwrap();
        channel.submit(vec![2]).unwrap();

        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || producer.submit(vec![3]));

        thread::sleep(Duration::from_millis(50));
        let discarded = channel.clear();
        handle.join().unwrap().unwrap();

        assert_eq!(discarded, 2);
        assert_eq!(collector.collect(SHORT), vec![3]);
    }

    #[test]
    fn test_generation_tracks_clears() {
        let (channel, mut collector) = HandoffChannel::new("test", 2);
        channel.submit(vec![1]).unwrap();
        assert_eq!(collector.collect(SHORT), vec![1]);
        assert_eq!(collector.generation(), channel.generation());

        channel.clear();
        assert_ne!(collector.generation(), channel.generation());

        collector.collect(Duration::ZERO);
        assert_eq!(collector.generation(), channel.generation());
    }

    #[test]
    fn test_wake_collector_keeps_items() {
        let (channel, mut collector) = HandoffChannel::<u32>::new("test", 2);
        let waker = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.wake_collector();
        });

        let started = Instant::now();
        assert!(collector.collect(Duration::from_secs(10)).is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_submit_if_generation_drops_batch_after_clear() {
        let (channel, mut collector) = HandoffChannel::new("test", 1);
        let generation = channel.generation();
        assert_eq!(channel.submit_if_generation(vec![1], generation).unwrap(), 0);
        assert_eq!(channel.submit_if_generation(vec![2], generation).unwrap(), 0);

        // Blocked on a full channel when the clear happens
        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || producer.submit_if_generation(vec![3, 4], generation));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(channel.clear(), 2);

        assert_eq!(handle.join().unwrap().unwrap(), 2);
        assert_eq!(channel.buffered_len(), 0);
        assert!(collector.collect(SHORT).is_empty());

        // A stale generation is refused up front, the current one accepted
        assert_eq!(channel.submit_if_generation(vec![5], generation).unwrap(), 1);
        assert_eq!(
            channel.submit_if_generation(vec![6], channel.generation()).unwrap(),
            0
        );
        assert_eq!(collector.collect(SHORT), vec![6]);
    }

    #[test]
    fn test_buffers_are_recycled() {
        let (channel, mut collector) = HandoffChannel::new("test", 3);
        for round in 0..50 {
            channel.submit(vec![round, round + 1]).unwrap();
            channel.submit(vec![round + 2, round + 3]).unwrap();
            assert_eq!(collector.collect(SHORT).len(), 4);
            assert_eq!(collector.spares.len(), 2);

            let slots = channel.slots.lock();
            assert!(slots.current.is_some());
            assert!(slots.standby.is_some());
            assert!(slots.backlog.is_empty());
        }
    }

    #[test]
    fn test_buffered_items_never_exceed_twice_capacity() {
        let capacity = 3;
        let (channel, mut collector) = HandoffChannel::new("test", capacity);
        let producer = Arc::clone(&channel);
        let handle = thread::spawn(move || {
            for i in 0..200u32 {
                producer.submit(vec![i; (i as usize % capacity) + 1]).unwrap();
            }
        });

        let mut total = 0;
        let expected: usize = (0..200usize).map(|i| (i % capacity) + 1).sum();
        let deadline = Instant::now() + Duration::from_secs(10);
        while total < expected && Instant::now() < deadline {
            assert!(channel.buffered_len() <= 2 * capacity);
            total += collector.collect(SHORT).len();
            thread::sleep(Duration::from_micros(200));
        }

        handle.join().unwrap();
        assert_eq!(total, expected);
    }
}
