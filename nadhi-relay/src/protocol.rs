//! Relay protocol types and framing
//!
//! Every message is a 4-byte big-endian length followed by a bincode
//! body. One request and one response are exchanged per connection.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{RelayError, Result};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame (16 MiB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Request sent to the relay (versioned wrapper)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub version: u32,
    /// Credential forwarded with the record to the primary server
    #[serde(default)]
    pub api_key: String,
    pub command: RelayCommand,
}

impl RelayRequest {
    #[must_use]
    pub fn new(api_key: impl Into<String>, command: RelayCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            api_key: api_key.into(),
            command,
        }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayCommand {
    /// Liveness check, answered by the server without touching the handler
    Ping,
    /// Hand one record to the relay
    SendLog {
        pipelines: Vec<String>,
        /// The record payload, JSON encoded
        json_data: String,
    },
}

/// Response from the relay (versioned wrapper)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub version: u32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Ok,
    Error(String),
}

impl RelayResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }

    /// Convert an `Error` payload into [`RelayError::Rejected`].
    pub fn into_result(self) -> Result<()> {
        match self.payload {
            ResponsePayload::Ok => Ok(()),
            ResponsePayload::Error(message) => Err(RelayError::Rejected(message)),
        }
    }
}

/// Write one length-prefixed frame.
pub async fn write_frame<W, T>(stream: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bincode::serde::encode_to_vec(message, bincode::config::standard())?;
    let len = u32::try_from(bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if len > MAX_FRAME_SIZE {
        return Err(RelayError::FrameTooLarge(len));
    }

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R, T>(stream: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RelayError::ConnectionClosed
        } else {
            RelayError::Io(e)
        }
    })?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(RelayError::FrameTooLarge(len));
    }

    let mut bytes = vec![0u8; len as usize];
    stream.read_exact(&mut bytes).await?;

    let (message, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(message)
}
