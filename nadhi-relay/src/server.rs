//! Relay server implementation

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use nadhi_common::Signal;
use tokio::{
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    RelayCommand, RelayError, RelayRequest, RelayResponse, Result,
    protocol::{read_frame, write_frame},
};

/// Handler trait for records arriving at the relay
///
/// `Ping` and version checks are answered by the server; only requests
/// that carry a record reach the handler.
#[async_trait]
pub trait RelayHandler: Send + Sync {
    /// Accept a request and return a response
    ///
    /// # Errors
    ///
    /// Errors are reported back to the client as an `Error` response.
    async fn handle_request(&self, request: RelayRequest) -> Result<RelayResponse>;
}

/// Relay server listening on a Unix domain socket
pub struct RelayServer {
    socket_path: PathBuf,
    handler: Arc<dyn RelayHandler>,
}

impl RelayServer {
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn RelayHandler>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
        }
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Run the relay server until a shutdown signal is received.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another relay is already serving on the socket
    /// - The socket cannot be bound
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<()> {
        let socket_path = self.socket_path.as_path();

        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(RelayError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!(
                        "Socket already in use by running relay: {}",
                        socket_path.display()
                    ),
                )));
            }
            info!("Removing stale socket file: {}", socket_path.display());
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;

        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(socket_path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(socket_path, perms).await?;
        }
        info!("Relay listening on {}", socket_path.display());

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    error!("Error handling relay connection: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting relay connection: {e}");
                        }
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            info!("Relay server shutting down");
                        }
                        Err(e) => {
                            error!("Relay server shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        if socket_path.exists() {
            debug!("Removing socket file: {}", socket_path.display());
            let _ = tokio::fs::remove_file(socket_path).await;
        }

        Ok(())
    }

    async fn handle_connection(
        mut stream: UnixStream,
        handler: Arc<dyn RelayHandler>,
    ) -> Result<()> {
        let timeout = Duration::from_secs(30);

        let request: RelayRequest = tokio::time::timeout(timeout, read_frame(&mut stream))
            .await
            .map_err(|_| RelayError::Timeout)??;

        trace!("Received relay request: {:?}", request.command);

        let response = if !request.is_version_compatible() {
            RelayResponse::error(format!(
                "Incompatible protocol version: client={}, server={}",
                request.version,
                crate::PROTOCOL_VERSION
            ))
        } else if request.command == RelayCommand::Ping {
            RelayResponse::ok()
        } else {
            match handler.handle_request(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Error handling relay request: {e}");
                    RelayResponse::error(e.to_string())
                }
            }
        };

        tokio::time::timeout(timeout, write_frame(&mut stream, &response))
            .await
            .map_err(|_| RelayError::Timeout)??;

        Ok(())
    }
}
