use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EvaluatedRecord;

/// Identifier for a log item
///
/// A ULID, so identifiers sort by creation time. The disk store reuses
/// the same scheme for its file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    id: ulid::Ulid,
}

impl ItemId {
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Serialize for ItemId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Lifecycle of a [`LogItem`].
///
/// `Delivered`, `Persisted` and `Dropped` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    #[default]
    Queued,
    InFlight,
    Delivered,
    Persisted,
    Dropped,
}

impl ItemState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Persisted | Self::Dropped)
    }
}

/// The unit of work flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogItem {
    pub id: ItemId,
    pub record: EvaluatedRecord,
    /// Delivery attempts made so far, one per tier tried.
    #[serde(default)]
    pub attempts: u32,
    #[serde(skip)]
    pub state: ItemState,
    pub enqueued_at: DateTime<Utc>,
}

impl LogItem {
    #[must_use]
    pub fn new(record: EvaluatedRecord) -> Self {
        Self {
            id: ItemId::generate(),
            record,
            attempts: 0,
            state: ItemState::Queued,
            enqueued_at: Utc::now(),
        }
    }

    /// Time spent since the item was first enqueued.
    #[must_use]
    pub fn age(&self) -> chrono::TimeDelta {
        Utc::now() - self.enqueued_at
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_state_is_not_persisted() {
        let mut item = LogItem::new(EvaluatedRecord::new(json!({"message": "m"}), ["p"]));
        item.attempts = 3;
        item.state = ItemState::InFlight;

        let encoded = serde_json::to_string(&item).unwrap();
        let decoded: LogItem = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.id, item.id);
        assert_eq!(decoded.attempts, 3);
        assert_eq!(decoded.enqueued_at, item.enqueued_at);
        assert_eq!(decoded.state, ItemState::Queued);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ItemState::Queued.is_terminal());
        assert!(!ItemState::InFlight.is_terminal());
        assert!(ItemState::Delivered.is_terminal());
        assert!(ItemState::Persisted.is_terminal());
        assert!(ItemState::Dropped.is_terminal());
    }
}
