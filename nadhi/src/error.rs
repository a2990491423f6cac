use nadhi_common::config::ConfigError;
use nadhi_delivery::ProcessorError;
use nadhi_rules::RuleError;
use nadhi_spool::SpoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    /// The caller's context could not be turned into JSON
    #[error("Unable to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Spool(#[from] SpoolError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

pub type Result<T> = std::result::Result<T, Error>;
