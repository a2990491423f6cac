//! Client for the relay socket

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::{
    RelayCommand, RelayError, RelayRequest, RelayResponse, Result,
    protocol::{read_frame, write_frame},
};

/// Client for handing records to a relay agent
#[derive(Debug, Clone)]
pub struct RelayClient {
    socket_path: PathBuf,
    api_key: String,
    timeout: Duration,
}

impl RelayClient {
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            api_key: String::new(),
            timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the timeout for a full request/response exchange
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and receive a response
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection fails
    /// - Protocol error occurs
    /// - Request times out
    pub async fn send_request(&self, request: RelayRequest) -> Result<RelayResponse> {
        tokio::time::timeout(self.timeout, self.send_request_internal(request))
            .await
            .map_err(|_| RelayError::Timeout)?
    }

    async fn send_request_internal(&self, request: RelayRequest) -> Result<RelayResponse> {
        debug!("Connecting to relay socket: {}", self.socket_path.display());
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        write_frame(&mut stream, &request).await?;
        trace!("Sent relay request: {:?}", request.command);

        let response: RelayResponse = read_frame(&mut stream).await?;

        if !response.is_version_compatible() {
            return Err(RelayError::VersionMismatch {
                peer: response.version,
                local: crate::PROTOCOL_VERSION,
            });
        }

        Ok(response)
    }

    /// Hand a single JSON-encoded record to the relay.
    pub async fn send_log(&self, pipelines: Vec<String>, json_data: String) -> Result<()> {
        let request = RelayRequest::new(
            self.api_key.clone(),
            RelayCommand::SendLog {
                pipelines,
                json_data,
            },
        );

        self.send_request(request).await?.into_result()
    }

    /// Check that the relay is up and answering.
    pub async fn ping(&self) -> Result<()> {
        let request = RelayRequest::new(self.api_key.clone(), RelayCommand::Ping);
        self.send_request(request).await?.into_result()
    }
}
