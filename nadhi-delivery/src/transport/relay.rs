use std::sync::Arc;

use async_trait::async_trait;
use nadhi_common::{LogItem, Tier, outgoing};
use nadhi_relay::{RelayClient, RelayLauncher};
use tracing::debug;

use crate::{DeliveryError, Transport};

/// The local relay agent, reached over its Unix socket.
///
/// When a launcher is attached, a missing socket triggers an attempt to
/// start the agent before the request is sent.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    client: RelayClient,
    launcher: Option<Arc<RelayLauncher>>,
}

impl RelayTransport {
    #[must_use]
    pub const fn new(client: RelayClient) -> Self {
        Self {
            client,
            launcher: None,
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: RelayLauncher) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    async fn ensure_running(&self) -> Result<(), DeliveryError> {
        match &self.launcher {
            Some(launcher) => Ok(launcher.ensure_running().await?),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn tier(&self) -> Tier {
        Tier::Relay
    }

    async fn deliver(&self, items: &[LogItem]) -> Result<(), DeliveryError> {
        self.ensure_running().await?;

        for item in items {
            let json_data = serde_json::to_string(&item.record.payload).map_err(|e| {
                DeliveryError::application(Tier::Relay, None, format!("encoding record: {e}"))
            })?;
            let pipelines = item.record.pipelines.iter().cloned().collect();

            outgoing!(
                level = DEBUG,
                item = %item.id,
                "Handing record to relay at {}",
                self.client.socket_path().display()
            );
            self.client.send_log(pipelines, json_data).await?;
        }

        Ok(())
    }

    async fn probe(&self) -> bool {
        if let Err(e) = self.ensure_running().await {
            debug!(error = %e, "Relay agent not running");
            return false;
        }

        self.client.ping().await.is_ok()
    }
}
