//! Per-directory pipeline: configuration, rules and a delivery processor.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use nadhi_common::{EvaluatedRecord, ResolvedConfig, internal};
use nadhi_delivery::{AsyncProcessor, Enqueued, FlushReport, StatsSnapshot, TransportSet};
use nadhi_relay::{RELAY_DIR, default_socket_path};
use nadhi_rules::{Evaluation, RuleSet};
use nadhi_spool::{DiskStore, FileStore};
use serde_json::Value;

use crate::Result;

/// Directory used when none is given, relative to the working directory
pub const DEFAULT_DIR: &str = ".datanadhi";

/// Spool directory, relative to the pipeline directory
pub const SPOOL_DIR: &str = "spool";

/// File name of the relay agent looked up under `<dir>/echopost`
const RELAY_BINARY: &str = "echopost";

/// An independent logging pipeline rooted at one directory.
///
/// Nothing is shared between pipelines: each owns its rules, queue,
/// health monitor, transports and disk store.
#[derive(Debug)]
pub struct Pipeline {
    dir: PathBuf,
    config: ResolvedConfig,
    rules: RuleSet,
    processor: AsyncProcessor,
}

impl Pipeline {
    /// Open the pipeline rooted at `dir` with everything loaded from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `config.ron` or a rule file cannot be read or is invalid
    /// - The spool directory cannot be created
    /// - There is no tokio runtime
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().dir(dir).build()
    }

    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub const fn processor(&self) -> &AsyncProcessor {
        &self.processor
    }

    /// Route `payload` through the rule set.
    #[must_use]
    pub fn evaluate(&self, payload: &Value) -> Evaluation {
        self.rules.evaluate(payload)
    }

    /// Hand an evaluated record to the delivery processor. Never blocks on
    /// the network.
    pub fn submit(&self, record: EvaluatedRecord) -> Enqueued {
        self.processor.submit(record)
    }

    /// Settle every accepted record, see [`AsyncProcessor::flush`].
    pub async fn flush(&self) -> FlushReport {
        self.processor.flush().await
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.processor.stats()
    }
}

/// Builder for [`Pipeline`]. Anything not injected is loaded from `dir`.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    dir: Option<PathBuf>,
    config: Option<ResolvedConfig>,
    rules: Option<RuleSet>,
    store: Option<Arc<dyn DiskStore>>,
    transports: Option<TransportSet>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: ResolvedConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn DiskStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn transports(mut self, transports: TransportSet) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Load whatever was not injected and start the delivery processor.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::open`].
    pub fn build(self) -> Result<Pipeline> {
        let dir = self.dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));

        let mut config = match self.config {
            Some(config) => config,
            None => ResolvedConfig::load(&dir)?,
        };
        if config.relay_binary.is_none() {
            let bundled = dir.join(RELAY_DIR).join(RELAY_BINARY);
            if bundled.is_file() {
                config.relay_binary = Some(bundled);
            }
        }

        let rules = match self.rules {
            Some(rules) => rules,
            None => RuleSet::load(&dir)?,
        };

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::builder().path(dir.join(SPOOL_DIR)).build()?),
        };

        let transports = match self.transports {
            Some(transports) => transports,
            None => {
                let socket = config
                    .relay_endpoint
                    .clone()
                    .unwrap_or_else(|| default_socket_path(&dir));
                TransportSet::from_config(&config, Some(&socket))?
            }
        };

        let processor = AsyncProcessor::builder()
            .config(config.clone())
            .store(store)
            .transports(transports)
            .build()?;

        internal!(
            level = INFO,
            "Pipeline opened at {} with {} rules",
            dir.display(),
            rules.len()
        );

        Ok(Pipeline {
            dir,
            config,
            rules,
            processor,
        })
    }
}

#[cfg(test)]
mod tests {
    use nadhi_spool::MemoryStore;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_open_creates_spool_under_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::builder()
            .dir(dir.path())
            .transports(TransportSet::new())
            .build()
            .unwrap();

        assert!(dir.path().join(SPOOL_DIR).is_dir());
        assert!(pipeline.rules().is_empty());
        assert_eq!(pipeline.config().queue_size, 1000);
    }

    #[tokio::test]
    async fn test_without_transports_everything_lands_on_disk() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::builder()
            .config(ResolvedConfig::default())
            .rules(RuleSet::empty())
            .store(Arc::clone(&store) as Arc<dyn DiskStore>)
            .transports(TransportSet::new())
            .build()
            .unwrap();

        pipeline.submit(EvaluatedRecord::new(json!({"message": "hi"}), ["p"]));
        let report = pipeline.flush().await;

        assert_eq!(report.stats.persisted, 1);
        assert_eq!(store.items().len(), 1);
    }

    #[test]
    fn test_build_needs_runtime() {
        let result = Pipeline::builder()
            .config(ResolvedConfig::default())
            .rules(RuleSet::empty())
            .store(Arc::new(MemoryStore::new()))
            .transports(TransportSet::new())
            .build();

        assert!(matches!(result, Err(crate::Error::Processor(_))));
    }
}
