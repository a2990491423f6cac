//! Local relay channel (EchoPost)
//!
//! The relay is a separate buffering process reached over a Unix domain
//! socket. From the pipeline's point of view it is the second delivery
//! tier. This crate provides:
//! - the framed request/response protocol
//! - a client used by the delivery tier
//! - a server the relay agent runs
//! - a launcher that starts the agent when its socket is missing

pub mod client;
pub mod error;
pub mod launcher;
pub mod protocol;
pub mod server;

use std::path::{Path, PathBuf};

pub use client::RelayClient;
pub use error::{RelayError, Result};
pub use launcher::{RelayLauncher, wait_for_socket};
pub use protocol::{PROTOCOL_VERSION, RelayCommand, RelayRequest, RelayResponse, ResponsePayload};
pub use server::{RelayHandler, RelayServer};

/// Directory, relative to a pipeline directory, holding the relay socket
pub const RELAY_DIR: &str = "echopost";

/// File name of the relay socket
pub const SOCKET_NAME: &str = "data-nadhi-agent.sock";

/// Where a pipeline rooted at `dir` expects its relay socket.
#[must_use]
pub fn default_socket_path(dir: &Path) -> PathBuf {
    dir.join(RELAY_DIR).join(SOCKET_NAME)
}
