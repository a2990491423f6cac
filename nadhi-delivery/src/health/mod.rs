//! Per-tier health tracking
//!
//! Each remote tier carries one of three states:
//! - **Healthy**: delivered to freely
//! - **Unhealthy**: skipped by workers, still probed
//! - **Recovering**: answered a probe after being unhealthy; used only when
//!   no healthy tier is available until enough probes succeed in a row
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  N failed probes, or a connection   ┌───────────┐
//! │ Healthy │ ──────── failure on delivery ─────> │ Unhealthy │
//! └─────────┘                                      └───────────┘
//!     ^                                               │     ^
//!     │                                  probe passes │     │ probe or
//!     │  M probes pass in a row                       v     │ delivery fails
//!     │                                         ┌────────────┐
//!     └──────────────────────────────────────── │ Recovering │
//!                                               └────────────┘
//! ```
//!
//! Application failures (the tier answered and refused the record) never
//! change a tier's state.

mod prober;

use std::{fmt, sync::Arc, time::Instant};

use dashmap::DashMap;
use nadhi_common::{Tier, config::HealthConfig};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub use prober::HealthProber;

use crate::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Recovering,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Recovering => "recovering",
        })
    }
}

/// A state change reported by [`HealthMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub tier: Tier,
    pub from: HealthState,
    pub to: HealthState,
}

#[derive(Debug)]
struct TierHealth {
    state: HealthState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    changed_at: Instant,
}

impl TierHealth {
    fn new() -> Self {
        Self {
            state: HealthState::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            changed_at: Instant::now(),
        }
    }

    fn move_to(&mut self, tier: Tier, to: HealthState) -> Transition {
        let from = self.state;
        self.state = to;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.changed_at = Instant::now();

        Transition { tier, from, to }
    }

    fn probe_passed(&mut self, tier: Tier, config: &HealthConfig) -> Option<Transition> {
        match self.state {
            HealthState::Healthy => {
                self.consecutive_failures = 0;
                None
            }
            HealthState::Unhealthy => Some(self.move_to(tier, HealthState::Recovering)),
            HealthState::Recovering => {
                self.consecutive_successes += 1;
                (self.consecutive_successes >= config.success_threshold)
                    .then(|| self.move_to(tier, HealthState::Healthy))
            }
        }
    }

    fn probe_failed(&mut self, tier: Tier, config: &HealthConfig) -> Option<Transition> {
        match self.state {
            HealthState::Healthy => {
                self.consecutive_failures += 1;
                (self.consecutive_failures >= config.failure_threshold)
                    .then(|| self.move_to(tier, HealthState::Unhealthy))
            }
            HealthState::Recovering => Some(self.move_to(tier, HealthState::Unhealthy)),
            HealthState::Unhealthy => None,
        }
    }
}

/// Health state for every enabled remote tier.
///
/// Tiers that were never enabled (for example the relay when it is
/// switched off) are reported as absent and skipped by tier selection.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    tiers: DashMap<Tier, Arc<Mutex<TierHealth>>>,
    recovered: Notify,
}

impl HealthMonitor {
    /// Track `enabled` tiers, all starting healthy. `Disk` is ignored.
    pub fn new(config: HealthConfig, enabled: impl IntoIterator<Item = Tier>) -> Self {
        let tiers = DashMap::new();
        for tier in enabled.into_iter().filter(|tier| tier.is_remote()) {
            tiers.insert(tier, Arc::new(Mutex::new(TierHealth::new())));
        }

        Self {
            config,
            tiers,
            recovered: Notify::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn entry(&self, tier: Tier) -> Option<Arc<Mutex<TierHealth>>> {
        self.tiers.get(&tier).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn is_enabled(&self, tier: Tier) -> bool {
        self.tiers.contains_key(&tier)
    }

    /// Current state, or `None` for a tier that is not enabled.
    #[must_use]
    pub fn state(&self, tier: Tier) -> Option<HealthState> {
        self.entry(tier).map(|health| health.lock().state)
    }

    /// Feed the outcome of a health probe.
    pub fn record_probe(&self, tier: Tier, passed: bool) -> Option<Transition> {
        let health = self.entry(tier)?;
        let transition = {
            let mut health = health.lock();
            if passed {
                health.probe_passed(tier, &self.config)
            } else {
                health.probe_failed(tier, &self.config)
            }
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }
        transition
    }

    /// A delivery failed. Connection failures demote the tier at once.
    pub fn record_delivery_failure(&self, error: &DeliveryError) -> Option<Transition> {
        if !error.is_connection() {
            return None;
        }

        let tier = error.tier();
        let health = self.entry(tier)?;
        let transition = {
            let mut health = health.lock();
            (health.state != HealthState::Unhealthy)
                .then(|| health.move_to(tier, HealthState::Unhealthy))
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }
        transition
    }

    /// A delivery succeeded; clears any run of failed probes.
    pub fn record_delivery_success(&self, tier: Tier) {
        if let Some(health) = self.entry(tier) {
            let mut health = health.lock();
            if health.state == HealthState::Healthy {
                health.consecutive_failures = 0;
            }
        }
    }

    fn announce(&self, transition: Transition) {
        let Transition { tier, from, to } = transition;

        match to {
            HealthState::Unhealthy => {
                warn!(%tier, %from, "Tier marked UNHEALTHY - routing around it");
            }
            HealthState::Recovering => {
                info!(%tier, "Tier answered a probe - RECOVERING");
            }
            HealthState::Healthy => {
                info!(%tier, %from, "Tier HEALTHY - normal routing resumed");
                self.recovered.notify_one();
            }
        }
    }

    /// Resolves the next time any tier becomes healthy again.
    pub async fn recovered(&self) {
        self.recovered.notified().await;
    }

    /// Pick the tier for an item, considering `start` and everything below it.
    ///
    /// The first healthy tier wins; failing that, the first recovering one.
    /// With neither, the item goes to `Disk`.
    #[must_use]
    pub fn best_available_tier_from(&self, start: Tier) -> Tier {
        let mut recovering = None;

        for tier in Tier::REMOTE.into_iter().filter(|tier| *tier >= start) {
            match self.state(tier) {
                Some(HealthState::Healthy) => return tier,
                Some(HealthState::Recovering) if recovering.is_none() => recovering = Some(tier),
                _ => {}
            }
        }

        let tier = recovering.unwrap_or(Tier::Disk);
        debug!(%start, %tier, "No healthy tier available");
        tier
    }

    /// Returns `true` if at least one remote tier is healthy.
    #[must_use]
    pub fn any_healthy(&self) -> bool {
        Tier::REMOTE
            .into_iter()
            .any(|tier| self.state(tier) == Some(HealthState::Healthy))
    }

    /// State of every enabled tier, in hierarchy order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Tier, HealthState)> {
        Tier::REMOTE
            .into_iter()
            .filter_map(|tier| self.state(tier).map(|state| (tier, state)))
            .collect()
    }

    /// How long `tier` has been in its current state.
    #[must_use]
    pub fn time_in_state(&self, tier: Tier) -> Option<std::time::Duration> {
        self.entry(tier).map(|health| health.lock().changed_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(
            HealthConfig {
                failure_threshold: 3,
                success_threshold: 2,
                ..HealthConfig::default()
            },
            Tier::REMOTE,
        )
    }

    #[test]
    fn test_probe_failures_demote_after_threshold() {
        let health = monitor();

        assert!(health.record_probe(Tier::Primary, false).is_none());
        assert!(health.record_probe(Tier::Primary, false).is_none());
        let transition = health.record_probe(Tier::Primary, false).unwrap();

        assert_eq!(transition.from, HealthState::Healthy);
        assert_eq!(transition.to, HealthState::Unhealthy);
        assert_eq!(health.state(Tier::Primary), Some(HealthState::Unhealthy));
    }

    #[test]
    fn test_success_resets_failure_run() {
        let health = monitor();

        health.record_probe(Tier::Primary, false);
        health.record_probe(Tier::Primary, false);
        health.record_probe(Tier::Primary, true);
        health.record_probe(Tier::Primary, false);
        health.record_probe(Tier::Primary, false);

        assert_eq!(health.state(Tier::Primary), Some(HealthState::Healthy));
    }

    #[test]
    fn test_recovery_needs_consecutive_successes() {
        let health = monitor();
        let down = DeliveryError::connection(Tier::Primary, "refused");
        health.record_delivery_failure(&down);

        let to_recovering = health.record_probe(Tier::Primary, true).unwrap();
        assert_eq!(to_recovering.to, HealthState::Recovering);

        assert!(health.record_probe(Tier::Primary, true).is_none());
        let to_healthy = health.record_probe(Tier::Primary, true).unwrap();
        assert_eq!(to_healthy.to, HealthState::Healthy);
    }

    #[test]
    fn test_recovering_falls_back_on_failure() {
        let health = monitor();
        health.record_delivery_failure(&DeliveryError::connection(Tier::Relay, "gone"));
        health.record_probe(Tier::Relay, true);

        let transition = health.record_probe(Tier::Relay, false).unwrap();
        assert_eq!(transition.from, HealthState::Recovering);
        assert_eq!(transition.to, HealthState::Unhealthy);
    }

    #[test]
    fn test_application_failures_keep_state() {
        let health = monitor();
        let refused = DeliveryError::application(Tier::Primary, Some(400), "bad");

        for _ in 0..10 {
            assert!(health.record_delivery_failure(&refused).is_none());
        }
        assert_eq!(health.state(Tier::Primary), Some(HealthState::Healthy));
    }

    #[test]
    fn test_tier_selection() {
        let health = monitor();
        assert_eq!(health.best_available_tier_from(Tier::Primary), Tier::Primary);
        assert_eq!(health.best_available_tier_from(Tier::Relay), Tier::Relay);

        health.record_delivery_failure(&DeliveryError::connection(Tier::Primary, "down"));
        assert_eq!(health.best_available_tier_from(Tier::Primary), Tier::Relay);

        health.record_delivery_failure(&DeliveryError::connection(Tier::Relay, "down"));
        health.record_delivery_failure(&DeliveryError::connection(Tier::Fallback, "down"));
        assert_eq!(health.best_available_tier_from(Tier::Primary), Tier::Disk);
        assert!(!health.any_healthy());

        // A recovering tier is used only when nothing is healthy
        health.record_probe(Tier::Fallback, true);
        assert_eq!(health.best_available_tier_from(Tier::Primary), Tier::Fallback);

        health.record_probe(Tier::Relay, true);
        health.record_probe(Tier::Relay, true);
        health.record_probe(Tier::Relay, true);
        assert_eq!(health.best_available_tier_from(Tier::Primary), Tier::Relay);
        assert_eq!(health.best_available_tier_from(Tier::Fallback), Tier::Fallback);
    }

    #[test]
    fn test_time_in_state_restarts_on_transition() {
        let health = monitor();
        assert_eq!(health.time_in_state(Tier::Disk), None);

        std::thread::sleep(std::time::Duration::from_millis(50));
        let before = health.time_in_state(Tier::Primary).unwrap();
        assert!(before >= std::time::Duration::from_millis(50));

        // A probe that keeps the state does not reset the clock
        health.record_probe(Tier::Primary, true);
        assert!(health.time_in_state(Tier::Primary).unwrap() >= before);

        health.record_delivery_failure(&DeliveryError::connection(Tier::Primary, "down"));
        assert!(health.time_in_state(Tier::Primary).unwrap() < before);
    }

    #[test]
    fn test_disabled_tier_is_skipped() {
        let health = HealthMonitor::new(
            HealthConfig::default(),
            [Tier::Primary, Tier::Fallback, Tier::Disk],
        );

        assert!(!health.is_enabled(Tier::Relay));
        assert!(!health.is_enabled(Tier::Disk));
        assert_eq!(health.state(Tier::Relay), None);

        health.record_delivery_failure(&DeliveryError::connection(Tier::Primary, "down"));
        assert_eq!(health.best_available_tier_from(Tier::Primary), Tier::Fallback);
        assert_eq!(health.snapshot().len(), 2);
    }
}
