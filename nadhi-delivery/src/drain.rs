//! Pressure relief: move items from memory to disk when the queue runs hot.

use std::sync::Arc;

use nadhi_common::{Signal, config::DrainConfig, internal};
use nadhi_spool::DiskStore;
use tokio::{sync::broadcast, time::MissedTickBehavior};
use tracing::info;

use crate::{SafeQueue, spill::spill, stats::DeliveryStats};

/// Samples the queue fill ratio and drains to disk with hysteresis.
///
/// Draining starts once the ratio reaches the high watermark and carries
/// on, batch by batch, until it drops below the low watermark.
#[derive(Debug)]
pub struct DrainWorker {
    queue: Arc<SafeQueue>,
    store: Arc<dyn DiskStore>,
    stats: Arc<DeliveryStats>,
    config: DrainConfig,
}

impl DrainWorker {
    pub fn new(
        queue: Arc<SafeQueue>,
        store: Arc<dyn DiskStore>,
        stats: Arc<DeliveryStats>,
        config: DrainConfig,
    ) -> Self {
        Self {
            queue,
            store,
            stats,
            config,
        }
    }

    /// Take one sample, draining if needed. Returns the number of items moved.
    pub fn sample(&self) -> usize {
        let ratio = self.queue.fill_ratio();
        if ratio < self.config.high_watermark {
            return 0;
        }

        info!(
            fill_ratio = ratio,
            high = self.config.high_watermark,
            low = self.config.low_watermark,
            "Queue under pressure, draining to disk"
        );

        let mut moved = 0;
        while self.queue.fill_ratio() >= self.config.low_watermark {
            let batch = self.queue.take_batch(self.config.batch_size.max(1));
            if batch.is_empty() {
                break;
            }

            let taken = batch.len();
            for mut item in batch {
                if spill(self.store.as_ref(), &mut item, "drain").is_some() {
                    self.stats.record_drained(1);
                    moved += 1;
                } else {
                    self.stats.record_dropped(1);
                }
            }
            self.queue.complete(taken);
        }

        info!(
            moved,
            fill_ratio = self.queue.fill_ratio(),
            "Drain finished"
        );
        moved
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<Signal>) {
        let period = self.config.sample_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        internal!(
            level = DEBUG,
            "Drain worker started, high={} low={}",
            self.config.high_watermark,
            self.config.low_watermark
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sample();
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nadhi_common::{EvaluatedRecord, LogItem, config::OverflowPolicy};
    use nadhi_spool::MemoryStore;
    use serde_json::json;

    use super::*;

    fn setup(capacity: usize) -> (Arc<SafeQueue>, Arc<MemoryStore>, DrainWorker) {
        let store = Arc::new(MemoryStore::new());
        let stats = Arc::new(DeliveryStats::new());
        let queue = Arc::new(SafeQueue::new(
            capacity,
            OverflowPolicy::default(),
            Arc::clone(&store) as Arc<dyn DiskStore>,
            Arc::clone(&stats),
        ));
        let worker = DrainWorker::new(
            Arc::clone(&queue),
            Arc::clone(&store) as Arc<dyn DiskStore>,
            stats,
            DrainConfig {
                high_watermark: 0.9,
                low_watermark: 0.7,
                batch_size: 1,
                sample_interval_ms: 100,
            },
        );
        (queue, store, worker)
    }

    fn fill(queue: &SafeQueue, count: usize) {
        for n in 0..count {
            queue.enqueue(LogItem::new(EvaluatedRecord::new(json!({"n": n}), ["p"])));
        }
    }

    #[test]
    fn test_below_high_watermark_does_nothing() {
        let (queue, store, worker) = setup(10);
        fill(&queue, 8);

        assert_eq!(worker.sample(), 0);
        assert_eq!(queue.len(), 8);
        assert!(store.items().is_empty());
    }

    #[test]
    fn test_drains_until_below_low_watermark() {
        let (queue, store, worker) = setup(10);
        fill(&queue, 9);

        assert_eq!(worker.sample(), 3);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.pending(), 6);

        // Oldest items go first
        let drained = store.items();
        assert_eq!(drained[0].record.payload["n"], 0);
        assert_eq!(drained[2].record.payload["n"], 2);
    }
}
