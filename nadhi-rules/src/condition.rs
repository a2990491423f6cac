use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    RuleError,
    lookup::{as_text, lookup, split_path},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    /// The resolved value equals `value`.
    Exact,
    /// `value` occurs somewhere in the resolved value.
    Partial,
    /// `value` is a pattern matching from the start of the resolved value.
    Regex,
}

/// A single test against one key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the record, e.g. `context.user.type`
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub value: String,
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    pub fn new(key: impl Into<String>, kind: ConditionType, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            value: value.into(),
            negate: false,
        }
    }

    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub(crate) fn compile(&self) -> crate::Result<CompiledCondition> {
        if self.key.trim().is_empty() {
            return Err(RuleError::EmptyPath);
        }

        let matcher = match self.kind {
            ConditionType::Exact => Matcher::Exact(self.value.clone()),
            ConditionType::Partial => Matcher::Partial(self.value.clone()),
            ConditionType::Regex => {
                let anchored = format!("^(?:{})", self.value);
                Matcher::Regex(Regex::new(&anchored).map_err(|source| {
                    RuleError::InvalidRegex {
                        key: self.key.clone(),
                        pattern: self.value.clone(),
                        source,
                    }
                })?)
            }
        };

        Ok(CompiledCondition {
            path: split_path(&self.key),
            matcher,
            negate: self.negate,
        })
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Partial(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledCondition {
    path: Vec<String>,
    matcher: Matcher,
    negate: bool,
}

impl CompiledCondition {
    /// Unresolvable keys never match, negated or not.
    pub(crate) fn matches(&self, record: &Value) -> bool {
        let Some(value) = lookup(record, &self.path) else {
            return false;
        };

        let hit = match &self.matcher {
            Matcher::Exact(expected) => {
                !matches!(value, Value::Object(_) | Value::Array(_))
                    && as_text(value) == expected.as_str()
            }
            Matcher::Partial(needle) => as_text(value).contains(needle.as_str()),
            Matcher::Regex(pattern) => pattern.is_match(&as_text(value)),
        };

        hit != self.negate
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn check(condition: &Condition, record: &Value) -> bool {
        condition.compile().unwrap().matches(record)
    }

    #[test]
    fn test_exact() {
        let record = json!({"level": "ERROR", "context": {"code": 42, "tags": ["a"]}});

        assert!(check(&Condition::new("level", ConditionType::Exact, "ERROR"), &record));
        assert!(!check(&Condition::new("level", ConditionType::Exact, "ERR"), &record));
        assert!(check(&Condition::new("context.code", ConditionType::Exact, "42"), &record));
        assert!(!check(
            &Condition::new("context.tags", ConditionType::Exact, r#"["a"]"#),
            &record
        ));
    }

    #[test]
    fn test_partial() {
        let record = json!({"message": "payment failed for order 17"});

        assert!(check(
            &Condition::new("message", ConditionType::Partial, "failed"),
            &record
        ));
        assert!(!check(
            &Condition::new("message", ConditionType::Partial, "succeeded"),
            &record
        ));
    }

    #[test]
    fn test_regex_is_anchored_at_start() {
        let record = json!({"message": "user-1234 logged in"});

        assert!(check(
            &Condition::new("message", ConditionType::Regex, r"user-\d+"),
            &record
        ));
        assert!(!check(
            &Condition::new("message", ConditionType::Regex, r"logged"),
            &record
        ));
        assert!(check(
            &Condition::new("message", ConditionType::Regex, r".*logged"),
            &record
        ));
    }

    #[test]
    fn test_negate() {
        let record = json!({"level": "INFO"});

        assert!(check(
            &Condition::new("level", ConditionType::Exact, "ERROR").negated(),
            &record
        ));
        assert!(!check(
            &Condition::new("level", ConditionType::Exact, "INFO").negated(),
            &record
        ));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let record = json!({"level": "INFO"});

        assert!(!check(&Condition::new("context.user", ConditionType::Exact, "x"), &record));
        assert!(!check(
            &Condition::new("context.user", ConditionType::Exact, "x").negated(),
            &record
        ));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = Condition::new("message", ConditionType::Regex, "(unclosed")
            .compile()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidRegex { .. }));

        assert!(matches!(
            Condition::new(" ", ConditionType::Exact, "x").compile(),
            Err(RuleError::EmptyPath)
        ));
    }
}
