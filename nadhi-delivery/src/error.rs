//! Typed error handling for delivery.
//!
//! Delivery failures are split by what they say about the tier:
//! - Connection failures (unreachable, timed out, 5xx above 500) - the tier
//!   is presumed down and demoted immediately
//! - Application failures (3xx, 4xx, 500) - the tier answered, so its
//!   health is untouched, but the item still moves down the chain

use std::time::Duration;

use nadhi_common::{Tier, config::ConfigError};
use nadhi_relay::RelayError;
use nadhi_spool::SpoolError;
use thiserror::Error;

/// Failure of a single delivery attempt against one tier.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The tier could not be reached or did not answer in time.
    #[error("{tier} unreachable: {message}")]
    Connection { tier: Tier, message: String },

    /// The tier answered but refused the record.
    #[error("{tier} rejected the record{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Application {
        tier: Tier,
        status: Option<u16>,
        message: String,
    },
}

impl DeliveryError {
    pub fn connection(tier: Tier, message: impl Into<String>) -> Self {
        Self::Connection {
            tier,
            message: message.into(),
        }
    }

    pub fn application(tier: Tier, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Application {
            tier,
            status,
            message: message.into(),
        }
    }

    /// Map an HTTP status onto the delivery outcome.
    ///
    /// 2xx is success, 300 through 500 inclusive is an application failure,
    /// everything else is treated as the server being unavailable.
    pub fn from_status(tier: Tier, status: u16) -> Result<(), Self> {
        match status {
            200..=299 => Ok(()),
            300..=500 => Err(Self::application(
                tier,
                Some(status),
                "server refused the record",
            )),
            _ => Err(Self::connection(
                tier,
                format!("server unavailable ({status})"),
            )),
        }
    }

    #[must_use]
    pub const fn tier(&self) -> Tier {
        match self {
            Self::Connection { tier, .. } | Self::Application { tier, .. } => *tier,
        }
    }

    /// Returns `true` if this failure should mark the tier unhealthy.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    #[must_use]
    pub const fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }
}

impl From<RelayError> for DeliveryError {
    fn from(error: RelayError) -> Self {
        if error.is_connection() {
            Self::connection(Tier::Relay, error.to_string())
        } else {
            Self::application(Tier::Relay, None, error.to_string())
        }
    }
}

/// Errors surfaced by the processor itself rather than a single delivery.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Flush gave up waiting; the remainder was force-persisted.
    #[error("Flush did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    /// The processor must be started from within a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Disk store error: {0}")]
    Spool(#[from] SpoolError),

    /// A transport could not be constructed.
    #[error("Transport setup failed for {tier}: {message}")]
    Transport { tier: Tier, message: String },

    #[error("No disk store configured")]
    MissingStore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(DeliveryError::from_status(Tier::Primary, 200).is_ok());
        assert!(DeliveryError::from_status(Tier::Primary, 204).is_ok());

        for status in [301, 400, 404, 429, 500] {
            let err = DeliveryError::from_status(Tier::Primary, status).unwrap_err();
            assert!(err.is_application(), "{status} should be an application failure");
        }

        for status in [100, 501, 502, 503, 504] {
            let err = DeliveryError::from_status(Tier::Fallback, status).unwrap_err();
            assert!(err.is_connection(), "{status} should be a connection failure");
            assert_eq!(err.tier(), Tier::Fallback);
        }
    }

    #[test]
    fn test_relay_errors() {
        let down = DeliveryError::from(RelayError::ConnectionClosed);
        assert!(down.is_connection());
        assert_eq!(down.tier(), Tier::Relay);

        let refused = DeliveryError::from(RelayError::Rejected("queue closed".into()));
        assert!(refused.is_application());
    }

    #[test]
    fn test_display_includes_status() {
        let err = DeliveryError::application(Tier::Primary, Some(404), "nope");
        assert_eq!(err.to_string(), "primary rejected the record (404): nope");
    }
}
