//! Call surface producing records for a [`Pipeline`].

use std::{io::Write, panic::Location, sync::Arc};

use chrono::{SecondsFormat, Utc};
use nadhi_common::{EvaluatedRecord, Level, internal};
use nadhi_delivery::Enqueued;
use serde::Serialize;
use serde_json::{Value, json};
use ulid::Ulid;

use crate::{Pipeline, Result};

/// Emits records tagged with a module name into a pipeline.
///
/// Every call builds a JSON payload, routes it with the pipeline's rules,
/// prints it to stdout when a rule asks for that, and submits it when any
/// rule names a pipeline. Calls never wait on the network.
#[derive(Debug, Clone)]
pub struct Logger {
    pipeline: Arc<Pipeline>,
    module_name: String,
    trace_id: String,
}

impl Logger {
    pub fn new(pipeline: Arc<Pipeline>, module_name: impl Into<String>) -> Self {
        Self {
            pipeline,
            module_name: module_name.into(),
            trace_id: Ulid::new().to_string(),
        }
    }

    /// Tag every record with `trace_id` instead of the generated one.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Shared by every record this logger (and its clones) emits.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    #[track_caller]
    pub fn debug(&self, message: &str, context: impl Serialize) -> Result<Option<Enqueued>> {
        self.emit(Level::Debug, message, &context, Location::caller())
    }

    #[track_caller]
    pub fn info(&self, message: &str, context: impl Serialize) -> Result<Option<Enqueued>> {
        self.emit(Level::Info, message, &context, Location::caller())
    }

    #[track_caller]
    pub fn warning(&self, message: &str, context: impl Serialize) -> Result<Option<Enqueued>> {
        self.emit(Level::Warning, message, &context, Location::caller())
    }

    #[track_caller]
    pub fn error(&self, message: &str, context: impl Serialize) -> Result<Option<Enqueued>> {
        self.emit(Level::Error, message, &context, Location::caller())
    }

    #[track_caller]
    pub fn critical(&self, message: &str, context: impl Serialize) -> Result<Option<Enqueued>> {
        self.emit(Level::Critical, message, &context, Location::caller())
    }

    /// Log at `level`.
    ///
    /// Returns `None` when the record was below the configured level or no
    /// rule routed it to a pipeline.
    ///
    /// # Errors
    ///
    /// Fails only if `context` cannot be serialized to JSON. Nothing is
    /// printed or queued in that case.
    #[track_caller]
    pub fn log(
        &self,
        level: Level,
        message: &str,
        context: impl Serialize,
    ) -> Result<Option<Enqueued>> {
        self.emit(level, message, &context, Location::caller())
    }

    fn emit<C: Serialize + ?Sized>(
        &self,
        level: Level,
        message: &str,
        context: &C,
        location: &Location<'_>,
    ) -> Result<Option<Enqueued>> {
        if level < self.pipeline.config().log_level {
            return Ok(None);
        }

        let payload = self.payload(level, message, serde_json::to_value(context)?, location);
        let evaluation = self.pipeline.evaluate(&payload);
        if !evaluation.is_routed() {
            internal!("No rule matched record from {}", self.module_name);
            return Ok(None);
        }

        let record = evaluation.into_record(payload);
        if record.stdout {
            print_line(&record)?;
        }

        if record.pipelines.is_empty() {
            return Ok(None);
        }

        Ok(Some(self.pipeline.submit(record)))
    }

    fn payload(&self, level: Level, message: &str, context: Value, location: &Location<'_>) -> Value {
        json!({
            "message": message,
            "trace_id": self.trace_id,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            "module_name": self.module_name,
            "log_record": {
                "filename": location.file(),
                "line_number": location.line(),
                "level": level.as_str(),
                "module_name": self.module_name,
            },
            "context": context,
        })
    }
}

/// The flattened line written to stdout for `record`.
fn stdout_line(record: &EvaluatedRecord) -> Value {
    let payload = &record.payload;
    let log_record = &payload["log_record"];

    json!({
        "timestamp": payload["timestamp"],
        "module_name": log_record["module_name"],
        "filename": log_record["filename"],
        "line_number": log_record["line_number"],
        "level": log_record["level"],
        "message": payload["message"],
        "trace_id": payload["trace_id"],
        "context": payload["context"],
    })
}

fn print_line(record: &EvaluatedRecord) -> Result<()> {
    let line = serde_json::to_string(&stdout_line(record))?;

    // A closed stdout must not fail the caller's log call
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use nadhi_common::ResolvedConfig;
    use nadhi_delivery::TransportSet;
    use nadhi_rules::{Condition, ConditionType, Rule, RuleSet};
    use nadhi_spool::{DiskStore, MemoryStore};
    use pretty_assertions::assert_eq;

    use super::*;

    fn pipeline(rules: Vec<Rule>, log_level: Level) -> (Arc<Pipeline>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = ResolvedConfig {
            log_level,
            ..ResolvedConfig::default()
        };

        let pipeline = Pipeline::builder()
            .config(config)
            .rules(RuleSet::new(rules).unwrap())
            .store(Arc::clone(&store) as Arc<dyn DiskStore>)
            .transports(TransportSet::new())
            .build()
            .unwrap();

        (Arc::new(pipeline), store)
    }

    fn admin_rule(stdout: bool) -> Rule {
        Rule {
            name: Some("admins".into()),
            conditions: vec![Condition::new(
                "context.user.type",
                ConditionType::Exact,
                "admin",
            )],
            pipelines: vec!["audit".into()],
            stdout,
            ..Rule::default()
        }
    }

    #[tokio::test]
    async fn test_payload_shape() {
        let (pipeline, store) = pipeline(vec![admin_rule(false)], Level::Info);
        let logger = Logger::new(Arc::clone(&pipeline), "billing").with_trace_id("t-42");

        let outcome = logger
            .info("invoice sent", json!({"user": {"type": "admin"}}))
            .unwrap();
        assert_eq!(outcome, Some(Enqueued::Accepted));

        pipeline.flush().await;
        let items = store.items();
        let payload = &items[0].record.payload;

        assert_eq!(payload["message"], "invoice sent");
        assert_eq!(payload["trace_id"], "t-42");
        assert_eq!(payload["module_name"], "billing");
        assert_eq!(payload["log_record"]["level"], "INFO");
        assert_eq!(payload["log_record"]["filename"], file!());
        assert!(payload["log_record"]["line_number"].as_u64().unwrap() > 0);
        assert!(payload["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(payload["context"], json!({"user": {"type": "admin"}}));
        assert_eq!(
            items[0].record.pipelines.iter().collect::<Vec<_>>(),
            vec!["audit"]
        );
    }

    #[tokio::test]
    async fn test_trace_id_is_shared_across_calls() {
        let (pipeline, store) = pipeline(vec![admin_rule(false)], Level::Info);
        let logger = Logger::new(Arc::clone(&pipeline), "billing");
        let clone = logger.clone();
        let other = Logger::new(Arc::clone(&pipeline), "billing");

        let context = json!({"user": {"type": "admin"}});
        logger.info("first", &context).unwrap();
        clone.info("second", &context).unwrap();
        other.info("third", &context).unwrap();

        pipeline.flush().await;
        let ids: Vec<String> = store
            .items()
            .iter()
            .map(|item| item.record.payload["trace_id"].as_str().unwrap().to_owned())
            .collect();

        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&logger.trace_id().to_owned()));
        assert_eq!(ids.iter().filter(|id| *id == logger.trace_id()).count(), 2);
        assert!(ids.contains(&other.trace_id().to_owned()));
        assert_ne!(logger.trace_id(), other.trace_id());
    }

    #[tokio::test]
    async fn test_below_level_is_ignored() {
        let (pipeline, _store) = pipeline(vec![admin_rule(false)], Level::Warning);
        let logger = Logger::new(Arc::clone(&pipeline), "billing");

        let context = json!({"user": {"type": "admin"}});
        assert_eq!(logger.info("quiet", &context).unwrap(), None);
        assert_eq!(logger.debug("quieter", &context).unwrap(), None);
        assert!(logger.error("loud", &context).unwrap().is_some());
        assert_eq!(pipeline.flush().await.stats.persisted, 1);
    }

    #[tokio::test]
    async fn test_unmatched_record_is_not_queued() {
        let (pipeline, _store) = pipeline(vec![admin_rule(false)], Level::Debug);
        let logger = Logger::new(Arc::clone(&pipeline), "billing");

        let outcome = logger
            .critical("guest", json!({"user": {"type": "guest"}}))
            .unwrap();
        assert_eq!(outcome, None);
        assert_eq!(pipeline.flush().await.stats.persisted, 0);
    }

    #[tokio::test]
    async fn test_unserializable_context_fails_before_enqueue() {
        let (pipeline, _store) = pipeline(vec![admin_rule(false)], Level::Debug);
        let logger = Logger::new(Arc::clone(&pipeline), "billing");

        // Non-string map keys have no JSON representation
        let mut context = BTreeMap::new();
        context.insert((1, 2), "pair");

        let result = logger.warning("bad context", context);
        assert!(matches!(result, Err(crate::Error::Serialize(_))));
        assert_eq!(pipeline.flush().await.stats.persisted, 0);
    }

    #[test]
    fn test_stdout_line_is_flat() {
        let record = EvaluatedRecord::new(
            json!({
                "message": "m",
                "trace_id": "t",
                "timestamp": "2026-01-01T00:00:00.000000Z",
                "module_name": "billing",
                "log_record": {
                    "filename": "src/main.rs",
                    "line_number": 7,
                    "level": "ERROR",
                    "module_name": "billing",
                },
                "context": {"k": 1},
            }),
            Vec::<String>::new(),
        );

        assert_eq!(
            stdout_line(&record),
            json!({
                "timestamp": "2026-01-01T00:00:00.000000Z",
                "module_name": "billing",
                "filename": "src/main.rs",
                "line_number": 7,
                "level": "ERROR",
                "message": "m",
                "trace_id": "t",
                "context": {"k": 1},
            })
        );
    }
}
