//! Delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use nadhi_common::Tier;
use serde_json::{Value, json};

/// Running totals of where items ended up.
///
/// Every item counts exactly once towards a terminal outcome: one of the
/// `delivered` slots, `persisted`, `written_back`, `drained` or `dropped`.
/// `replayed` counts items moved from disk back into memory, which then
/// reach a terminal outcome a second time.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: [AtomicU64; 3],
    persisted: AtomicU64,
    written_back: AtomicU64,
    drained: AtomicU64,
    dropped: AtomicU64,
    replayed: AtomicU64,
}

impl DeliveryStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self, tier: Tier, count: usize) {
        if let Some(slot) = self.delivered.get(tier.index()) {
            slot.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_persisted(&self, count: usize) {
        self.persisted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_written_back(&self) {
        self.written_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drained(&self, count: usize) {
        self.drained.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_replayed(&self, count: usize) {
        self.replayed.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let delivered = |tier: Tier| self.delivered[tier.index()].load(Ordering::Relaxed);

        StatsSnapshot {
            delivered_primary: delivered(Tier::Primary),
            delivered_relay: delivered(Tier::Relay),
            delivered_fallback: delivered(Tier::Fallback),
            persisted: self.persisted.load(Ordering::Relaxed),
            written_back: self.written_back.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered_primary: u64,
    pub delivered_relay: u64,
    pub delivered_fallback: u64,
    pub persisted: u64,
    pub written_back: u64,
    pub drained: u64,
    pub dropped: u64,
    pub replayed: u64,
}

impl StatsSnapshot {
    #[must_use]
    pub const fn delivered(&self) -> u64 {
        self.delivered_primary + self.delivered_relay + self.delivered_fallback
    }

    /// Items that went to disk by any route.
    #[must_use]
    pub const fn on_disk(&self) -> u64 {
        self.persisted + self.written_back + self.drained
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "delivered": {
                "primary": self.delivered_primary,
                "relay": self.delivered_relay,
                "fallback": self.delivered_fallback,
            },
            "persisted": self.persisted,
            "written_back": self.written_back,
            "drained": self.drained,
            "dropped": self.dropped,
            "replayed": self.replayed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_totals() {
        let stats = DeliveryStats::new();
        stats.record_delivered(Tier::Primary, 3);
        stats.record_delivered(Tier::Fallback, 2);
        stats.record_delivered(Tier::Disk, 9);
        stats.record_written_back();
        stats.record_drained(4);
        stats.record_persisted(1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.delivered(), 5);
        assert_eq!(snapshot.on_disk(), 6);
        assert_eq!(snapshot.to_json()["delivered"]["fallback"], 2);
    }
}
