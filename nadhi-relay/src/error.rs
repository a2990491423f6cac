//! Error types for relay operations

use thiserror::Error;

/// Errors that can occur talking to, serving, or launching the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// I/O error on the relay socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol deserialization error
    #[error("Protocol error: {0}")]
    ProtocolDeserialization(#[from] bincode::error::DecodeError),

    /// Protocol serialization error
    #[error("Protocol error: {0}")]
    ProtocolSerialization(#[from] bincode::error::EncodeError),

    /// A frame exceeded the size limit
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(u32),

    /// Peer speaks a different protocol version
    #[error("Incompatible protocol version: peer={peer}, local={local}")]
    VersionMismatch { peer: u32, local: u32 },

    /// The relay accepted the request but refused it
    #[error("Relay rejected request: {0}")]
    Rejected(String),

    /// Connection closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// The relay agent could not be started
    #[error("Unable to launch relay agent: {0}")]
    Launch(String),
}

impl RelayError {
    /// Whether the relay itself is unreachable or broken, as opposed to
    /// having refused this particular request.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
