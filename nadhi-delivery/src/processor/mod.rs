//! Delivery processor orchestration
//!
//! The processor owns the queue and every background task that works on
//! it: `workers` delivery workers, the health prober, the drain worker and
//! the replay worker. All of them stop on a broadcast [`Signal`].

mod replay;
mod worker;

use std::{mem, sync::Arc, time::Duration};

use nadhi_common::{
    EvaluatedRecord, LogItem, ResolvedConfig, Signal, config::DeliveryTimeouts, internal,
};
use nadhi_spool::DiskStore;
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{Notify, broadcast},
    task::JoinHandle,
};
use tracing::warn;

use crate::{
    DrainWorker, Enqueued, HealthMonitor, HealthProber, ProcessorError, SafeQueue, Transport,
    TransportSet,
    spill::spill,
    stats::{DeliveryStats, StatsSnapshot},
};

/// State shared between the processor handle and its tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) queue: Arc<SafeQueue>,
    pub(crate) health: Arc<HealthMonitor>,
    pub(crate) transports: TransportSet,
    pub(crate) store: Arc<dyn DiskStore>,
    pub(crate) stats: Arc<DeliveryStats>,
    pub(crate) timeouts: DeliveryTimeouts,
    /// Replay stops once the queue would reach this fill ratio
    pub(crate) replay_limit: f64,
    pub(crate) replay_requested: Notify,
    pub(crate) replay_lock: Mutex<()>,
}

/// Outcome of [`AsyncProcessor::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// The queue did not empty within the exit timeout
    pub timed_out: bool,
    /// Items written to disk because the timeout was hit
    pub force_persisted: usize,
    pub stats: StatsSnapshot,
}

/// Builder for [`AsyncProcessor`].
#[derive(Debug, Default)]
pub struct ProcessorBuilder {
    config: ResolvedConfig,
    store: Option<Arc<dyn DiskStore>>,
    transports: TransportSet,
}

impl ProcessorBuilder {
    #[must_use]
    pub fn config(mut self, config: ResolvedConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn DiskStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport);
        self
    }

    #[must_use]
    pub fn transports(mut self, transports: TransportSet) -> Self {
        self.transports = transports;
        self
    }

    /// Validate the configuration and start every task on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - No disk store was given
    /// - There is no tokio runtime to spawn onto
    pub fn build(self) -> Result<AsyncProcessor, ProcessorError> {
        let Self {
            config,
            store,
            transports,
        } = self;

        config.validate()?;
        let store = store.ok_or(ProcessorError::MissingStore)?;
        let runtime = Handle::try_current().map_err(|e| ProcessorError::NoRuntime(e.to_string()))?;

        let stats = Arc::new(DeliveryStats::new());
        let queue = Arc::new(SafeQueue::new(
            config.queue_size,
            config.overflow,
            Arc::clone(&store),
            Arc::clone(&stats),
        ));
        let health = Arc::new(HealthMonitor::new(config.health.clone(), transports.tiers()));

        let shared = Arc::new(Shared {
            queue: Arc::clone(&queue),
            health: Arc::clone(&health),
            transports: transports.clone(),
            store: Arc::clone(&store),
            stats: Arc::clone(&stats),
            timeouts: config.timeouts.clone(),
            replay_limit: config.drain.low_watermark,
            replay_requested: Notify::new(),
            replay_lock: Mutex::new(()),
        });

        let (shutdown, _) = broadcast::channel(16);

        let workers = (0..config.workers)
            .map(|id| {
                let worker = worker::Worker::new(id, Arc::clone(&shared));
                runtime.spawn(worker.run(shutdown.subscribe()))
            })
            .collect();

        let mut background = Vec::with_capacity(3);
        if !transports.is_empty() {
            let prober = HealthProber::new(Arc::clone(&health), transports.clone());
            background.push(runtime.spawn(prober.run(shutdown.subscribe())));
        }

        let drain = DrainWorker::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&stats),
            config.drain.clone(),
        );
        background.push(runtime.spawn(drain.run(shutdown.subscribe())));
        background.push(runtime.spawn(replay::run(Arc::clone(&shared), shutdown.subscribe())));

        internal!(
            level = INFO,
            "Processor started: {} workers, queue size {}, tiers {:?}",
            config.workers,
            config.queue_size,
            transports.tiers().collect::<Vec<_>>()
        );

        Ok(AsyncProcessor {
            shared,
            shutdown,
            workers: Mutex::new(workers),
            background: Mutex::new(background),
            exit_timeout: config.exit_timeout(),
        })
    }
}

/// Asynchronous delivery of log items through the tier hierarchy.
///
/// Dropping the processor stops its tasks without waiting for the queue;
/// call [`flush`](Self::flush) first to settle every accepted item.
#[derive(Debug)]
pub struct AsyncProcessor {
    shared: Arc<Shared>,
    shutdown: broadcast::Sender<Signal>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    exit_timeout: Duration,
}

impl AsyncProcessor {
    #[must_use]
    pub fn builder() -> ProcessorBuilder {
        ProcessorBuilder::default()
    }

    /// Queue a record for delivery. Never blocks.
    pub fn submit(&self, record: EvaluatedRecord) -> Enqueued {
        self.enqueue(LogItem::new(record))
    }

    pub fn enqueue(&self, item: LogItem) -> Enqueued {
        self.shared.queue.enqueue(item)
    }

    /// Replay records from disk right away. Returns how many were requeued.
    pub fn replay(&self) -> usize {
        self.shared.replay_from_disk()
    }

    /// Ask the background replay worker for a pass without waiting for it.
    pub fn request_replay(&self) {
        self.shared.replay_requested.notify_one();
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    #[must_use]
    pub fn health(&self) -> &HealthMonitor {
        &self.shared.health
    }

    #[must_use]
    pub fn queue(&self) -> &SafeQueue {
        &self.shared.queue
    }

    #[must_use]
    pub const fn exit_timeout(&self) -> Duration {
        self.exit_timeout
    }

    /// Stop accepting new items into memory and settle the queue.
    ///
    /// Waits up to the exit timeout for every queued and in-flight item to
    /// reach a terminal state. Whatever is still queued after that is
    /// written straight to disk. Records submitted after `flush` starts go
    /// directly to disk.
    pub async fn flush(&self) -> FlushReport {
        let queue = &self.shared.queue;
        queue.close();
        internal!(level = INFO, "Flushing {} pending items", queue.pending());

        let settled = queue.wait_idle(self.exit_timeout).await;

        let mut force_persisted = 0;
        if !settled {
            let error = ProcessorError::ShutdownTimeout(self.exit_timeout);
            warn!(
                %error,
                queued = queue.len(),
                in_flight = queue.in_flight(),
                "Persisting queued items to disk"
            );

            let mut remaining = queue.take_all();
            for item in &mut remaining {
                if spill(self.shared.store.as_ref(), item, "exit timeout").is_some() {
                    force_persisted += 1;
                } else {
                    self.shared.stats.record_dropped(1);
                }
            }
            self.shared.stats.record_persisted(force_persisted);
            queue.complete(remaining.len());
        }

        let _ = self.shutdown.send(Signal::Shutdown);

        for handle in mem::take(&mut *self.background.lock()) {
            handle.abort();
        }

        // Workers still busy after a timeout finish their item on their own
        let workers = mem::take(&mut *self.workers.lock());
        if settled {
            for handle in workers {
                let _ = handle.await;
            }
        }

        let stats = self.stats();
        internal!(level = INFO, "Flush complete: {stats:?}");

        FlushReport {
            timed_out: !settled,
            force_persisted,
            stats,
        }
    }
}

impl Drop for AsyncProcessor {
    fn drop(&mut self) {
        let _ = self.shutdown.send(Signal::Shutdown);
    }
}
