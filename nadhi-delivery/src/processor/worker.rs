use std::{sync::Arc, time::Duration};

use nadhi_common::{ItemState, LogItem, Signal, Tier, outgoing};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::Shared;
use crate::{DeliveryError, spill::spill};

/// A delivery worker: takes items off the queue and walks them down the
/// tier hierarchy until one tier accepts them or they reach disk.
pub(crate) struct Worker {
    id: usize,
    shared: Arc<Shared>,
}

impl Worker {
    pub(crate) const fn new(id: usize, shared: Arc<Shared>) -> Self {
        Self { id, shared }
    }

    pub(crate) async fn run(self, mut shutdown: broadcast::Receiver<Signal>) {
        debug!(worker = self.id, "Delivery worker started");
        let wait = self.shared.timeouts.dequeue();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                item = self.shared.queue.dequeue(wait) => {
                    if let Some(item) = item {
                        self.shared.deliver(vec![item]).await;
                    }
                }
            }
        }

        debug!(worker = self.id, "Delivery worker stopped");
    }
}

impl Shared {
    fn call_timeout(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Primary => self.timeouts.primary(),
            Tier::Relay => self.timeouts.relay(),
            Tier::Fallback | Tier::Disk => self.timeouts.fallback(),
        }
    }

    /// Deliver `cargo`, which the caller has already marked as in flight.
    ///
    /// Every item ends `Delivered`, `Persisted` or `Dropped`, and the queue
    /// is told about all of them, including any picked up for batching.
    pub(crate) async fn deliver(&self, mut cargo: Vec<LogItem>) {
        let mut tier = self.health.best_available_tier_from(Tier::Primary);

        while let Some(transport) = self.transports.get(tier).filter(|_| tier.is_remote()) {
            if tier == Tier::Fallback {
                self.fill_batch(&mut cargo, transport.max_batch());
            }

            for item in &mut cargo {
                item.attempts += 1;
                item.state = ItemState::InFlight;
            }

            let outcome = tokio::time::timeout(self.call_timeout(tier), transport.deliver(&cargo))
                .await
                .unwrap_or_else(|_| Err(DeliveryError::connection(tier, "timed out")));

            match outcome {
                Ok(()) => {
                    for item in &mut cargo {
                        item.state = ItemState::Delivered;
                    }
                    outgoing!(level = DEBUG, %tier, items = cargo.len(), "Delivered");
                    self.health.record_delivery_success(tier);
                    self.stats.record_delivered(tier, cargo.len());
                    self.queue.complete(cargo.len());
                    return;
                }
                Err(e) => {
                    warn!(
                        %tier,
                        items = cargo.len(),
                        error = %e,
                        "Delivery failed, trying next tier"
                    );
                    self.health.record_delivery_failure(&e);
                    tier = self
                        .health
                        .best_available_tier_from(tier.next().unwrap_or(Tier::Disk));
                }
            }
        }

        self.persist(&mut cargo);
        self.queue.complete(cargo.len());
    }

    /// Top up a fallback batch from the queue, but only with items that
    /// would be routed to the fallback tier anyway.
    fn fill_batch(&self, cargo: &mut Vec<LogItem>, max: usize) {
        if cargo.len() >= max
            || self.health.best_available_tier_from(Tier::Primary) != Tier::Fallback
        {
            return;
        }

        let extra = self.queue.take_batch(max - cargo.len());
        if !extra.is_empty() {
            debug!(extra = extra.len(), "Batching items for fallback");
            cargo.extend(extra);
        }
    }

    fn persist(&self, cargo: &mut [LogItem]) {
        for item in cargo {
            if spill(self.store.as_ref(), item, "no tier available").is_some() {
                self.stats.record_persisted(1);
            } else {
                self.stats.record_dropped(1);
            }
        }
    }
}
