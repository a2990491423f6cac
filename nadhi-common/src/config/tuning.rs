//! Health monitor and drain worker tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Probe cadence and hysteresis for the per-tier health state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Consecutive failed probes that demote a `Healthy` tier
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successful probes that promote a `Recovering` tier
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

const fn default_probe_interval_ms() -> u64 {
    500
}

const fn default_probe_timeout_ms() -> u64 {
    2000
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_success_threshold() -> u32 {
    2
}

/// Watermarks and batch size for the drain worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Fill ratio at which drain mode starts
    #[serde(default = "default_high_watermark")]
    pub high_watermark: f64,

    /// Fill ratio below which drain mode stops
    #[serde(default = "default_low_watermark")]
    pub low_watermark: f64,

    /// Items moved to disk per drain step
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            batch_size: default_batch_size(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

impl DrainConfig {
    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

const fn default_high_watermark() -> f64 {
    0.90
}

const fn default_low_watermark() -> f64 {
    0.70
}

const fn default_batch_size() -> usize {
    100
}

const fn default_sample_interval_ms() -> u64 {
    100
}

/// What the queue writes to disk when an enqueue finds it full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// The incoming item goes straight to disk.
    #[default]
    WritebackIncoming,
    /// The oldest queued item goes to disk and the incoming item takes its place.
    WritebackOldest,
}
