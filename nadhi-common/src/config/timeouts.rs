//! Per-call and loop timing for the delivery subsystem.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts applied to each tier's outbound call and to the background loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTimeouts {
    /// Timeout for a single primary delivery call.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::primary_secs")]
    pub primary_secs: u64,

    /// Timeout for a single relay call.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::relay_secs")]
    pub relay_secs: u64,

    /// Timeout for a single fallback batch upload.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::fallback_secs")]
    pub fallback_secs: u64,

    /// How long a worker waits on an empty queue before re-checking for shutdown.
    ///
    /// Default: 500 milliseconds
    #[serde(default = "defaults::dequeue_ms")]
    pub dequeue_ms: u64,

    /// Interval between periodic disk replay passes.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::replay_interval_secs")]
    pub replay_interval_secs: u64,
}

impl Default for DeliveryTimeouts {
    fn default() -> Self {
        Self {
            primary_secs: defaults::primary_secs(),
            relay_secs: defaults::relay_secs(),
            fallback_secs: defaults::fallback_secs(),
            dequeue_ms: defaults::dequeue_ms(),
            replay_interval_secs: defaults::replay_interval_secs(),
        }
    }
}

impl DeliveryTimeouts {
    #[must_use]
    pub const fn primary(&self) -> Duration {
        Duration::from_secs(self.primary_secs)
    }

    #[must_use]
    pub const fn relay(&self) -> Duration {
        Duration::from_secs(self.relay_secs)
    }

    #[must_use]
    pub const fn fallback(&self) -> Duration {
        Duration::from_secs(self.fallback_secs)
    }

    #[must_use]
    pub const fn dequeue(&self) -> Duration {
        Duration::from_millis(self.dequeue_ms)
    }

    #[must_use]
    pub const fn replay_interval(&self) -> Duration {
        Duration::from_secs(self.replay_interval_secs)
    }
}

mod defaults {
    pub const fn primary_secs() -> u64 {
        10
    }

    pub const fn relay_secs() -> u64 {
        5
    }

    pub const fn fallback_secs() -> u64 {
        30
    }

    pub const fn dequeue_ms() -> u64 {
        500
    }

    pub const fn replay_interval_secs() -> u64 {
        5
    }
}
