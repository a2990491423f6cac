//! Error types for the nadhi-spool crate.

use std::io;

use thiserror::Error;

use crate::RecordId;

/// Top-level spool error type.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found in the store.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// The store directory is unusable.
    #[error("Invalid spool path: {0}")]
    InvalidPath(String),

    /// The store refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Internal error (identifier generation exhausted, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpoolError {
    /// Whether the record itself is unreadable, as opposed to the store.
    #[must_use]
    pub const fn is_corrupt_record(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
