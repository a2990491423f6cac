use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid regex {pattern:?} for key {key}: {source}")]
    InvalidRegex {
        key: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Condition key must not be empty")]
    EmptyPath,

    #[error("Unable to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse rules from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

pub type Result<T> = std::result::Result<T, RuleError>;
