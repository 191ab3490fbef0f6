//! Fixed-capacity ordered container, the unit of cross-thread transfer.
//!
//! A batch has no locking of its own. It is always owned by exactly one
//! party at a time (a channel slot, the backlog, or the collector) and moves
//! between them by value.

use std::fmt;

/// Items refused by [`BoundedBatch::append`] because they do not fit
#[derive(Debug, PartialEq, Eq)]
pub struct Overflow<T> {
    pub items: Vec<T>,
    pub writable: usize,
}

impl<T> fmt::Display for Overflow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch overflow: {} items offered, {} writable",
            self.items.len(),
            self.writable
        )
    }
}

#[derive(Debug)]
pub struct BoundedBatch<T> {
    capacity: usize,
    items: Vec<T>,
}

impl<T> BoundedBatch<T> {
    /// Create an empty batch with storage for `capacity` items.
    ///
    /// A zero capacity is raised to one so every batch can make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots left before the batch is full
    pub fn writable_count(&self) -> usize {
        self.capacity - self.items.len()
    }

    /// Items currently held
    pub fn readable_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Append all of `items`, or none of them.
    ///
    /// Callers are expected to check [`writable_count`](Self::writable_count)
    /// first; an oversized append hands the items back untouched.
    pub fn append(&mut self, items: Vec<T>) -> Result<(), Overflow<T>> {
        let writable = self.writable_count();
        if items.len() > writable {
            return Err(Overflow { items, writable });
        }
        self.items.extend(items);
        Ok(())
    }

    /// Remove and return every item in insertion order
    pub fn retrieve_all(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.items.len());
        out.append(&mut self.items);
        out
    }

    /// Move every item onto the end of `out`, keeping this batch's storage
    pub fn drain_into(&mut self, out: &mut Vec<T>) {
        out.append(&mut self.items);
    }

    /// Drop every item without releasing the backing storage
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
