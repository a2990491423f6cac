//! Delivery channels for the remote tiers

mod http;
mod relay;

use std::{ffi::OsString, fmt::Debug, path::Path, sync::Arc};

use async_trait::async_trait;
use nadhi_common::{LogItem, ResolvedConfig, Tier, config::ENV_API_KEY};
use nadhi_relay::{RelayClient, RelayLauncher};

pub use http::{API_KEY_HEADER, FallbackTransport, PrimaryTransport, encode_batch};
pub use relay::RelayTransport;

use crate::{DeliveryError, ProcessorError};

/// One remote delivery tier.
///
/// Implementations report every failure as a [`DeliveryError`] so the
/// caller can decide between demoting the tier and just moving on.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    fn tier(&self) -> Tier;

    /// Largest number of items a single [`deliver`](Self::deliver) accepts.
    fn max_batch(&self) -> usize {
        1
    }

    /// Deliver `items`. Either all of them are accepted or the call fails.
    async fn deliver(&self, items: &[LogItem]) -> Result<(), DeliveryError>;

    /// Lightweight reachability check used by the health prober.
    async fn probe(&self) -> bool;
}

/// The transports in use, at most one per remote tier.
#[derive(Debug, Clone, Default)]
pub struct TransportSet {
    slots: [Option<Arc<dyn Transport>>; 3],
}

impl TransportSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard set for `config`: primary and fallback over HTTP, plus
    /// the relay at `relay_socket` unless it is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Transport`] if an HTTP client cannot be built.
    pub fn from_config(
        config: &ResolvedConfig,
        relay_socket: Option<&Path>,
    ) -> Result<Self, ProcessorError> {
        let probe_timeout = config.health.probe_timeout();
        let mut set = Self::new();

        set.insert(Arc::new(PrimaryTransport::new(
            &config.primary_endpoint,
            &config.api_key,
            config.timeouts.primary(),
            probe_timeout,
        )?));

        if !config.echopost_disabled
            && let Some(socket) = relay_socket
        {
            let client = RelayClient::new(socket)
                .with_api_key(config.api_key.clone())
                .with_timeout(config.timeouts.relay());
            let mut relay = RelayTransport::new(client);
            if let Some(binary) = &config.relay_binary {
                relay = relay.with_launcher(relay_launcher(config, binary, socket));
            }
            set.insert(Arc::new(relay));
        }

        set.insert(Arc::new(FallbackTransport::new(
            &config.fallback_endpoint,
            &config.api_key,
            config.timeouts.fallback(),
            probe_timeout,
            config.fallback_batch_size,
        )?));

        Ok(set)
    }

    /// Install `transport` in the slot for its tier, replacing any previous one.
    #[must_use]
    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.insert(transport);
        self
    }

    pub fn insert(&mut self, transport: Arc<dyn Transport>) {
        if let Some(slot) = self.slots.get_mut(transport.tier().index()) {
            *slot = Some(transport);
        }
    }

    #[must_use]
    pub fn get(&self, tier: Tier) -> Option<&Arc<dyn Transport>> {
        self.slots.get(tier.index()).and_then(Option::as_ref)
    }

    /// Tiers with a transport installed, in hierarchy order.
    pub fn tiers(&self) -> impl Iterator<Item = Tier> + '_ {
        Tier::REMOTE
            .into_iter()
            .filter(|tier| self.get(*tier).is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.slots.iter().flatten()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Launcher for an `echopost` agent serving `socket`.
///
/// The agent spools next to its socket and forwards to the same servers.
/// The API key travels through the environment.
fn relay_launcher(config: &ResolvedConfig, binary: &Path, socket: &Path) -> RelayLauncher {
    let agent_dir = socket.parent().unwrap_or(socket);

    let args: [OsString; 10] = [
        "--dir".into(),
        agent_dir.into(),
        "--socket".into(),
        socket.into(),
        "--primary".into(),
        (&config.primary_endpoint).into(),
        "--fallback".into(),
        (&config.fallback_endpoint).into(),
        "--queue-size".into(),
        config.queue_size.to_string().into(),
    ];

    let launcher = RelayLauncher::new(binary, socket).with_args(args);
    if config.api_key.is_empty() {
        launcher
    } else {
        launcher.with_env(ENV_API_KEY, &config.api_key)
    }
}
