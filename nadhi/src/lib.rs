//! Rule-routed structured logging with tiered delivery.
//!
//! A [`Pipeline`] is rooted at a directory holding `config.ron` and its
//! rule files (`rules/*.ron`, or a single `rules.ron`). Records are routed by the rule engine and then delivered,
//! in order of preference, to the primary server, the local relay agent,
//! the fallback server, or the pipeline's disk spool.
//!
//! ```no_run
//! # async fn run() -> nadhi::Result<()> {
//! use std::sync::Arc;
//!
//! let pipeline = Arc::new(nadhi::Pipeline::open(".datanadhi")?);
//! let logger = nadhi::Logger::new(Arc::clone(&pipeline), "billing");
//!
//! logger.info("invoice sent", serde_json::json!({"user": {"type": "admin"}}))?;
//! pipeline.flush().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod logger;
mod pipeline;
mod relay;

pub use error::{Error, Result};
pub use logger::Logger;
pub use nadhi_common::{EvaluatedRecord, Level, ResolvedConfig, Tier};
pub use nadhi_delivery::{Enqueued, FlushReport, StatsSnapshot};
pub use nadhi_rules::{Rule, RuleSet};
pub use pipeline::{DEFAULT_DIR, Pipeline, PipelineBuilder, SPOOL_DIR};
pub use relay::PipelineRelay;
