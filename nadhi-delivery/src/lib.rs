//! Delivery of log items for the nadhi pipeline
//!
//! This crate provides:
//! - A bounded in-memory queue that writes overflow back to disk
//! - Health tracking and probing for each remote tier
//! - Delivery workers that fail over Primary, Relay, Fallback, then Disk
//! - Drain and replay workers moving items between memory and disk

mod drain;
mod error;
mod health;
mod processor;
pub mod queue;
mod spill;
mod stats;
pub mod transport;

pub use drain::DrainWorker;
pub use error::{DeliveryError, ProcessorError};
pub use health::{HealthMonitor, HealthProber, HealthState, Transition};
pub use processor::{AsyncProcessor, FlushReport, ProcessorBuilder};
pub use queue::{Enqueued, SafeQueue};
pub use stats::{DeliveryStats, StatsSnapshot};
pub use transport::{
    FallbackTransport, PrimaryTransport, RelayTransport, Transport, TransportSet,
};
