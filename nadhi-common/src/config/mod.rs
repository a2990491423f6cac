//! Configuration for a pipeline.
//!
//! A pipeline directory may carry a `config.ron` file. Every key in it is
//! optional; keys the file leaves unset are filled from the environment and
//! then from built-in defaults. The result is a [`ResolvedConfig`], which is
//! what the delivery subsystem consumes.
//!
//! ## Modules
//!
//! - [`timeouts`]: per-call and loop timing
//! - [`tuning`]: health monitor hysteresis and drain watermarks

pub mod timeouts;
pub mod tuning;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use timeouts::DeliveryTimeouts;
pub use tuning::{DrainConfig, HealthConfig, OverflowPolicy};

pub const CONFIG_FILE: &str = "config.ron";

pub const ENV_SERVER_HOST: &str = "DATANADHI_SERVER_HOST";
pub const ENV_FALLBACK_SERVER_HOST: &str = "DATANADHI_FALLBACK_SERVER_HOST";
pub const ENV_QUEUE_SIZE: &str = "DATANADHI_QUEUE_SIZE";
pub const ENV_WORKERS: &str = "DATANADHI_WORKERS";
pub const ENV_EXIT_TIMEOUT: &str = "DATANADHI_EXIT_TIMEOUT";
pub const ENV_API_KEY: &str = "DATANADHI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("Invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The on-disk shape of `config.ron`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub queue_size: Option<usize>,
    pub workers: Option<usize>,
    pub exit_timeout: Option<u64>,
    pub primary_endpoint: Option<String>,
    pub fallback_endpoint: Option<String>,
    pub relay_endpoint: Option<PathBuf>,
    pub relay_binary: Option<PathBuf>,
    pub echopost_disabled: bool,
    pub fallback_batch_size: Option<usize>,
    pub log_level: Option<Level>,
    pub overflow: OverflowPolicy,
    pub health: HealthConfig,
    pub drain: DrainConfig,
    pub timeouts: DeliveryTimeouts,
}

impl ConfigFile {
    /// Read `<dir>/config.ron`, or an empty file if there is none.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        Self::parse(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, ron::error::SpannedError> {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(contents)
    }

    /// Fill unset keys from `env`, then from defaults, and validate the result.
    pub fn resolve<F>(self, env: F) -> Result<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ResolvedConfig::default();

        let config = ResolvedConfig {
            api_key: self
                .api_key
                .or_else(|| env(ENV_API_KEY))
                .unwrap_or(defaults.api_key),
            queue_size: pick(self.queue_size, &env, ENV_QUEUE_SIZE)?
                .unwrap_or(defaults.queue_size),
            workers: pick(self.workers, &env, ENV_WORKERS)?.unwrap_or(defaults.workers),
            exit_timeout: pick(self.exit_timeout, &env, ENV_EXIT_TIMEOUT)?
                .unwrap_or(defaults.exit_timeout),
            primary_endpoint: strip_trailing_slash(
                self.primary_endpoint
                    .or_else(|| env(ENV_SERVER_HOST))
                    .unwrap_or(defaults.primary_endpoint),
            ),
            fallback_endpoint: strip_trailing_slash(
                self.fallback_endpoint
                    .or_else(|| env(ENV_FALLBACK_SERVER_HOST))
                    .unwrap_or(defaults.fallback_endpoint),
            ),
            relay_endpoint: self.relay_endpoint,
            relay_binary: self.relay_binary,
            echopost_disabled: self.echopost_disabled,
            fallback_batch_size: self
                .fallback_batch_size
                .unwrap_or(defaults.fallback_batch_size),
            log_level: self.log_level.unwrap_or(defaults.log_level),
            overflow: self.overflow,
            health: self.health,
            drain: self.drain,
            timeouts: self.timeouts,
        };

        config.validate()?;
        Ok(config)
    }
}

fn pick<T, F>(value: Option<T>, env: &F, key: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    if value.is_some() {
        return Ok(value);
    }

    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Env { key, value: raw })
        })
        .transpose()
}

fn strip_trailing_slash(mut endpoint: String) -> String {
    while endpoint.ends_with('/') {
        endpoint.pop();
    }
    endpoint
}

/// Fully resolved settings for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Credential sent with every primary and fallback call
    #[serde(default)]
    pub api_key: String,

    /// In-memory queue capacity
    ///
    /// Default: 1000
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Number of delivery workers
    ///
    /// Default: 2
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on `flush`, in seconds
    ///
    /// Default: 5
    #[serde(default = "default_exit_timeout")]
    pub exit_timeout: u64,

    #[serde(default = "default_primary_endpoint")]
    pub primary_endpoint: String,

    #[serde(default = "default_fallback_endpoint")]
    pub fallback_endpoint: String,

    /// Relay socket; `<dir>/echopost/data-nadhi-agent.sock` when unset
    #[serde(default)]
    pub relay_endpoint: Option<PathBuf>,

    /// Relay agent executable, started on demand when the socket is missing
    #[serde(default)]
    pub relay_binary: Option<PathBuf>,

    #[serde(default)]
    pub echopost_disabled: bool,

    #[serde(default = "default_fallback_batch_size")]
    pub fallback_batch_size: usize,

    /// Records below this level are ignored by the logger surface
    #[serde(default)]
    pub log_level: Level,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub drain: DrainConfig,

    #[serde(default)]
    pub timeouts: DeliveryTimeouts,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            queue_size: default_queue_size(),
            workers: default_workers(),
            exit_timeout: default_exit_timeout(),
            primary_endpoint: default_primary_endpoint(),
            fallback_endpoint: default_fallback_endpoint(),
            relay_endpoint: None,
            relay_binary: None,
            echopost_disabled: false,
            fallback_batch_size: default_fallback_batch_size(),
            log_level: Level::default(),
            overflow: OverflowPolicy::default(),
            health: HealthConfig::default(),
            drain: DrainConfig::default(),
            timeouts: DeliveryTimeouts::default(),
        }
    }
}

const fn default_queue_size() -> usize {
    1000
}

const fn default_workers() -> usize {
    2
}

const fn default_exit_timeout() -> u64 {
    5
}

fn default_primary_endpoint() -> String {
    String::from("http://data-nadhi-server:5000")
}

fn default_fallback_endpoint() -> String {
    String::from("http://datanadhi-fallback-server:5001")
}

const fn default_fallback_batch_size() -> usize {
    100
}

impl ResolvedConfig {
    /// Load `<dir>/config.ron` and resolve it against the process environment.
    pub fn load(dir: &Path) -> Result<Self> {
        ConfigFile::load(dir)?.resolve(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub const fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(ConfigError::Invalid("queue_size must be greater than 0".into()));
        }

        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be greater than 0".into()));
        }

        if self.fallback_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "fallback_batch_size must be greater than 0".into(),
            ));
        }

        let DrainConfig {
            high_watermark,
            low_watermark,
            batch_size,
            ..
        } = self.drain;
        if !(low_watermark > 0.0 && low_watermark < high_watermark && high_watermark <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "drain watermarks must satisfy 0 < low ({low_watermark}) < high ({high_watermark}) <= 1"
            )));
        }

        if batch_size == 0 {
            return Err(ConfigError::Invalid("drain batch_size must be greater than 0".into()));
        }

        if self.health.failure_threshold == 0 || self.health.success_threshold == 0 {
            return Err(ConfigError::Invalid(
                "health thresholds must be greater than 0".into(),
            ));
        }

        if self.health.probe_interval_ms == 0
            || self.drain.sample_interval_ms == 0
            || self.timeouts.replay_interval_secs == 0
        {
            return Err(ConfigError::Invalid(
                "probe, sample and replay intervals must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
