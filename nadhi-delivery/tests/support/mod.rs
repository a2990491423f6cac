//! Scriptable transports and helpers for delivery tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use nadhi_common::{EvaluatedRecord, LogItem, ResolvedConfig, Tier};
use nadhi_delivery::{DeliveryError, Transport};
use parking_lot::Mutex;
use serde_json::json;

/// What a [`MockTransport`] does with the next delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    ConnectionFailure,
    ApplicationFailure,
}

/// A transport whose answers are scripted by the test.
///
/// Scripted outcomes are consumed first, then the default applies.
#[derive(Debug)]
pub struct MockTransport {
    tier: Tier,
    max_batch: usize,
    script: Mutex<VecDeque<Outcome>>,
    default: Mutex<Outcome>,
    probe_ok: AtomicBool,
    delay: Duration,
    accepted: Mutex<Vec<Vec<LogItem>>>,
    calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            max_batch: 1,
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Outcome::Accept),
            probe_ok: AtomicBool::new(true),
            delay: Duration::ZERO,
            accepted: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A transport that is down: deliveries and probes fail.
    pub fn down(tier: Tier) -> Self {
        let transport = Self::new(tier);
        transport.set_outcome(Outcome::ConnectionFailure);
        transport.set_probe(false);
        transport
    }

    #[must_use]
    pub const fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *self.default.lock() = outcome;
    }

    pub fn push_outcome(&self, outcome: Outcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn set_probe(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    /// Every item accepted so far, in delivery order.
    pub fn delivered(&self) -> Vec<LogItem> {
        self.accepted.lock().iter().flatten().cloned().collect()
    }

    /// Size of each accepted batch.
    pub fn batches(&self) -> Vec<usize> {
        self.accepted.lock().iter().map(Vec::len).collect()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn max_batch(&self) -> usize {
        self.max_batch
    }

    async fn deliver(&self, items: &[LogItem]) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.default.lock());

        match outcome {
            Outcome::Accept => {
                self.accepted.lock().push(items.to_vec());
                Ok(())
            }
            Outcome::ConnectionFailure => {
                Err(DeliveryError::connection(self.tier, "connection refused"))
            }
            Outcome::ApplicationFailure => Err(DeliveryError::application(
                self.tier,
                Some(400),
                "bad request",
            )),
        }
    }

    async fn probe(&self) -> bool {
        self.probe_ok.load(Ordering::SeqCst)
    }
}

/// Configuration tuned for tests: probes and replay stay out of the way.
pub fn config(queue_size: usize, workers: usize) -> ResolvedConfig {
    let mut config = ResolvedConfig {
        queue_size,
        workers,
        exit_timeout: 5,
        ..ResolvedConfig::default()
    };
    config.health.probe_interval_ms = 60_000;
    config.timeouts.replay_interval_secs = 3600;
    config.timeouts.dequeue_ms = 50;
    config
}

pub fn record(n: usize) -> EvaluatedRecord {
    EvaluatedRecord::new(json!({"message": format!("event {n}"), "n": n}), ["alerts"])
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn arc(transport: MockTransport) -> Arc<MockTransport> {
    Arc::new(transport)
}
