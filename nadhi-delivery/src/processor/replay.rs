use std::sync::Arc;

use nadhi_common::{Signal, internal};
use tokio::{sync::broadcast, time::MissedTickBehavior};
use tracing::{info, warn};

use super::Shared;

impl Shared {
    /// Move records from disk back into the queue, oldest first.
    ///
    /// Stops as soon as the queue refuses an item (it is nearing the low
    /// watermark, or has been closed). Nothing is replayed unless some
    /// remote tier is healthy, so records do not bounce between disk and
    /// memory during an outage. Returns the number of records moved.
    pub(crate) fn replay_from_disk(&self) -> usize {
        if !self.queue.is_accepting() || !self.health.any_healthy() {
            return 0;
        }

        // One pass at a time, or two passes could requeue the same record
        let Some(_pass) = self.replay_lock.try_lock() else {
            return 0;
        };

        let replay = match self.store.replay() {
            Ok(replay) => replay,
            Err(e) => {
                warn!(error = %e, "Unable to list records for replay");
                return 0;
            }
        };

        let mut moved = 0;
        for (record, result) in replay {
            let item = match result {
                Ok(item) => item,
                Err(e) => {
                    warn!(%record, error = %e, "Skipping unreadable record during replay");
                    continue;
                }
            };

            if self.queue.try_requeue(item, self.replay_limit).is_err() {
                break;
            }

            if let Err(e) = self.store.remove(&record) {
                warn!(%record, error = %e, "Replayed record could not be removed and may be sent twice");
            }
            moved += 1;
        }

        if moved > 0 {
            self.stats.record_replayed(moved);
            info!(moved, "Replayed records from disk");
        }
        moved
    }
}

/// Replays on start, on every interval and whenever a tier recovers.
pub(crate) async fn run(shared: Arc<Shared>, mut shutdown: broadcast::Receiver<Signal>) {
    let mut ticker = tokio::time::interval(shared.timeouts.replay_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    internal!(level = DEBUG, "Replay worker started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
            () = shared.health.recovered() => {}
            () = shared.replay_requested.notified() => {}
        }

        shared.replay_from_disk();
    }
}
