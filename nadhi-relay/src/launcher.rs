//! Start the relay agent on demand.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{RelayError, Result};

/// How long a freshly started agent gets to create its socket
const STARTUP_WAIT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Minimum gap between two launch attempts
const LAUNCH_COOLDOWN: Duration = Duration::from_secs(10);

/// Wait until `path` exists, polling every 50ms.
pub async fn wait_for_socket(path: &Path, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if path.exists() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Spawns the relay agent binary when its socket is missing.
///
/// Launches are serialised per launcher, and a failed launch is not retried
/// until the cooldown has passed.
#[derive(Debug)]
pub struct RelayLauncher {
    binary: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    socket_path: PathBuf,
    last_attempt: Mutex<Option<Instant>>,
}

impl RelayLauncher {
    pub fn new(binary: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            envs: Vec::new(),
            socket_path: socket_path.into(),
            last_attempt: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set an environment variable for the agent, keeping secrets off its
    /// command line.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Make sure the agent's socket exists, starting the agent if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Launch`] if the binary cannot be spawned, the
    /// socket does not appear in time, or a recent attempt already failed.
    pub async fn ensure_running(&self) -> Result<()> {
        if self.socket_path.exists() {
            return Ok(());
        }

        let mut last_attempt = self.last_attempt.lock().await;

        // Another caller may have launched it while we waited on the lock
        if self.socket_path.exists() {
            return Ok(());
        }

        if let Some(at) = *last_attempt
            && at.elapsed() < LAUNCH_COOLDOWN
        {
            return Err(RelayError::Launch(format!(
                "last launch attempt was {}ms ago",
                at.elapsed().as_millis()
            )));
        }
        *last_attempt = Some(Instant::now());

        self.spawn()?;

        if wait_for_socket(&self.socket_path, STARTUP_WAIT).await {
            info!(
                "Relay agent started, socket at {}",
                self.socket_path.display()
            );
            Ok(())
        } else {
            warn!(
                "Relay agent did not create {} within {STARTUP_WAIT:?}",
                self.socket_path.display()
            );
            Err(RelayError::Launch(format!(
                "socket {} did not appear",
                self.socket_path.display()
            )))
        }
    }

    fn spawn(&self) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| {
            RelayError::Launch(format!("{}: {e}", self.binary.display()))
        })?;

        info!(
            "Spawned relay agent {} (pid {})",
            self.binary.display(),
            child.id()
        );

        // Reap the agent when it eventually exits
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(())
    }
}
