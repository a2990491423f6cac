//! Bounded in-memory queue with disk writeback

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use nadhi_common::{ItemState, LogItem, config::OverflowPolicy};
use nadhi_spool::{DiskStore, RecordId};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::{spill::spill, stats::DeliveryStats};

/// Where an enqueued item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Held in memory, waiting for a worker
    Accepted,
    /// The queue was full (or closed) and the item was written to disk
    WrittenBack(RecordId),
    /// The queue was full and the disk write failed
    Dropped,
}

/// Bounded FIFO of [`LogItem`]s shared by the producer and the workers.
///
/// `enqueue` never waits: once the queue holds `capacity` items the
/// overflowing item goes straight to disk. Items a worker has dequeued are
/// tracked as in flight until the worker calls [`complete`](Self::complete),
/// so `pending() == 0` means every accepted item reached a terminal state.
#[derive(Debug)]
pub struct SafeQueue {
    items: Mutex<VecDeque<LogItem>>,
    capacity: usize,
    /// Mirror of `items.len()`, readable without the lock
    len: AtomicUsize,
    in_flight: AtomicUsize,
    accepting: AtomicBool,
    available: Notify,
    idle: Notify,
    overflow: OverflowPolicy,
    store: Arc<dyn DiskStore>,
    stats: Arc<DeliveryStats>,
}

impl SafeQueue {
    pub fn new(
        capacity: usize,
        overflow: OverflowPolicy,
        store: Arc<dyn DiskStore>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        let capacity = capacity.max(1);

        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            len: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            available: Notify::new(),
            idle: Notify::new(),
            overflow,
            store,
            stats,
        }
    }

    /// Add an item, writing it back to disk if the queue is full or closed.
    pub fn enqueue(&self, mut item: LogItem) -> Enqueued {
        item.state = ItemState::Queued;

        let mut items = self.items.lock();
        // Read under the lock so nothing lands in memory after `close`
        if !self.is_accepting() {
            drop(items);
            return self.write_back(item, "queue closed");
        }

        if items.len() < self.capacity {
            items.push_back(item);
            self.len.store(items.len(), Ordering::Release);
            drop(items);

            self.available.notify_one();
            return Enqueued::Accepted;
        }

        match self.overflow {
            OverflowPolicy::WritebackIncoming => {
                drop(items);
                self.write_back(item, "queue full")
            }
            OverflowPolicy::WritebackOldest => {
                let Some(oldest) = items.pop_front() else {
                    drop(items);
                    return self.write_back(item, "queue full");
                };
                items.push_back(item);
                // Hold the evicted item as in flight until it is on disk
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                drop(items);

                self.available.notify_one();
                // A failed write of the evicted item is counted as dropped;
                // the incoming item is in memory either way
                self.write_back(oldest, "queue full, evicted oldest");
                self.complete(1);

                Enqueued::Accepted
            }
        }
    }

    fn write_back(&self, mut item: LogItem, reason: &str) -> Enqueued {
        match spill(self.store.as_ref(), &mut item, reason) {
            Some(record) => {
                self.stats.record_written_back();
                Enqueued::WrittenBack(record)
            }
            None => {
                self.stats.record_dropped(1);
                Enqueued::Dropped
            }
        }
    }

    /// Take the oldest item without waiting.
    pub fn try_dequeue(&self) -> Option<LogItem> {
        let mut items = self.items.lock();
        let mut item = items.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.len.store(items.len(), Ordering::Release);
        drop(items);

        item.state = ItemState::InFlight;
        Some(item)
    }

    /// Wait up to `timeout` for an item.
    pub async fn dequeue(&self, timeout: Duration) -> Option<LogItem> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Take up to `max` items without waiting. They count as in flight.
    pub fn take_batch(&self, max: usize) -> Vec<LogItem> {
        let mut items = self.items.lock();
        let count = max.min(items.len());
        let mut batch: Vec<LogItem> = items.drain(..count).collect();
        self.in_flight.fetch_add(batch.len(), Ordering::AcqRel);
        self.len.store(items.len(), Ordering::Release);
        drop(items);

        for item in &mut batch {
            item.state = ItemState::InFlight;
        }
        batch
    }

    /// Take everything still in memory. The items count as in flight.
    pub fn take_all(&self) -> Vec<LogItem> {
        self.take_batch(usize::MAX)
    }

    /// Mark `count` in-flight items as having reached a terminal state.
    pub fn complete(&self, count: usize) {
        if count == 0 {
            return;
        }

        let previous = self.in_flight.fetch_sub(count, Ordering::AcqRel);
        debug_assert!(previous >= count, "completed more items than were in flight");

        if self.pending() == 0 {
            self.idle.notify_waiters();
        }
    }

    /// Put a replayed item back at the tail.
    ///
    /// Refused once the fill ratio would reach `limit`, or after the queue
    /// has been closed; the item is handed back untouched. An empty queue
    /// always takes one item, whatever its capacity.
    pub fn try_requeue(&self, mut item: LogItem, limit: f64) -> Result<(), LogItem> {
        let mut items = self.items.lock();
        if !self.is_accepting() {
            return Err(item);
        }

        let below_limit = self.ratio_of(items.len() + 1) < limit && items.len() < self.capacity;
        if !(items.is_empty() || below_limit) {
            return Err(item);
        }

        item.state = ItemState::Queued;
        items.push_back(item);
        self.len.store(items.len(), Ordering::Release);
        drop(items);

        self.available.notify_one();
        Ok(())
    }

    /// Stop accepting items into memory; later enqueues go to disk.
    pub fn close(&self) {
        let items = self.items.lock();
        let was_accepting = self.accepting.swap(false, Ordering::AcqRel);
        drop(items);

        if was_accepting {
            debug!(pending = self.pending(), "Queue closed");
        }
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Wait until nothing is queued or in flight. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending = self.pending();
            if pending == 0 {
                return true;
            }
            trace!(pending, "Waiting for queue to go idle");

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pending() == 0;
            }
        }
    }

    /// Items queued plus items in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        let items = self.items.lock();
        items.len() + self.in_flight.load(Ordering::Acquire)
    }

    /// Items waiting in memory, excluding those in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fraction of capacity currently held in memory.
    #[must_use]
    pub fn fill_ratio(&self) -> f64 {
        self.ratio_of(self.len())
    }

    #[allow(clippy::cast_precision_loss, reason = "queue sizes are far below 2^52")]
    fn ratio_of(&self, len: usize) -> f64 {
        len as f64 / self.capacity as f64
    }
}
