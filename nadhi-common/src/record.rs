use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A log event after rule evaluation.
///
/// `payload` is the structured record (message, level, context, trace id,
/// timestamp). `pipelines` and `stdout` are the union of every rule that
/// fired for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedRecord {
    pub payload: Value,
    #[serde(default)]
    pub pipelines: BTreeSet<String>,
    #[serde(default)]
    pub stdout: bool,
}

impl EvaluatedRecord {
    #[must_use]
    pub fn new<I, S>(payload: Value, pipelines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            payload,
            pipelines: pipelines.into_iter().map(Into::into).collect(),
            stdout: false,
        }
    }

    #[must_use]
    pub const fn with_stdout(mut self, stdout: bool) -> Self {
        self.stdout = stdout;
        self
    }

    /// The trace identifier carried in the payload, if any.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.payload.get("trace_id").and_then(Value::as_str)
    }

    /// The body sent to the primary and fallback servers for this record.
    #[must_use]
    pub fn wire_body(&self) -> Value {
        serde_json::json!({
            "pipelines": self.pipelines,
            "log_data": self.payload,
        })
    }
}
