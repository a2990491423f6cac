use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;
use nadhi_common::{Signal, internal};
use tokio::{sync::broadcast, time::MissedTickBehavior};
use tracing::trace;

use crate::{HealthMonitor, TransportSet};

/// Periodically probes every transport and feeds the results to the monitor.
///
/// Probes run on their own task, so a slow tier never holds up delivery.
#[derive(Debug)]
pub struct HealthProber {
    monitor: Arc<HealthMonitor>,
    transports: TransportSet,
}

impl HealthProber {
    pub const fn new(monitor: Arc<HealthMonitor>, transports: TransportSet) -> Self {
        Self {
            monitor,
            transports,
        }
    }

    /// Probe every tier once, concurrently.
    pub async fn probe_all(&self) {
        let timeout = self.monitor.config().probe_timeout();

        let probes = self.transports.iter().map(|transport| async move {
            let passed = tokio::time::timeout(timeout, transport.probe())
                .await
                .unwrap_or(false);
            (transport.tier(), passed)
        });

        for (tier, passed) in join_all(probes).await {
            trace!(%tier, passed, "Health probe");
            self.monitor.record_probe(tier, passed);
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<Signal>) {
        let interval = self.monitor.config().probe_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        internal!(level = DEBUG, "Health prober started, interval {interval:?}");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.probe_all().await,
                _ = shutdown.recv() => {
                    internal!(level = DEBUG, "Health prober stopped");
                    break;
                }
            }
        }
    }
}
