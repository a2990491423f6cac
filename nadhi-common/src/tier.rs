use std::fmt;

use serde::{Deserialize, Serialize};

/// A destination in the failover hierarchy, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Relay,
    Fallback,
    Disk,
}

impl Tier {
    /// Every tier, most preferred first.
    pub const ALL: [Self; 4] = [Self::Primary, Self::Relay, Self::Fallback, Self::Disk];

    /// Tiers that are reached over a channel and therefore carry a health state.
    pub const REMOTE: [Self; 3] = [Self::Primary, Self::Relay, Self::Fallback];

    /// The tier tried after this one fails. `Disk` is terminal.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Primary => Some(Self::Relay),
            Self::Relay => Some(Self::Fallback),
            Self::Fallback => Some(Self::Disk),
            Self::Disk => None,
        }
    }

    #[must_use]
    pub const fn is_remote(self) -> bool {
        !matches!(self, Self::Disk)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Relay => "relay",
            Self::Fallback => "fallback",
            Self::Disk => "disk",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
