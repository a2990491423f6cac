use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use nadhi_common::{EvaluatedRecord, internal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Result, RuleError,
    condition::{CompiledCondition, Condition},
};

pub const RULES_FILE: &str = "rules.ron";

/// Directory whose `*.ron` files are merged into one rule set
pub const RULES_DIR: &str = "rules";

/// A routing rule as written in a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// OR the conditions together instead of AND
    #[serde(default)]
    pub any_condition_match: bool,
    /// Invert the combined result of the conditions
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub stdout: bool,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    conditions: Vec<CompiledCondition>,
    any: bool,
    negate: bool,
    pipelines: Vec<String>,
    stdout: bool,
}

impl CompiledRule {
    fn fires(&self, record: &Value) -> bool {
        let combined = if self.any {
            self.conditions.iter().any(|c| c.matches(record))
        } else {
            self.conditions.iter().all(|c| c.matches(record))
        };

        combined != self.negate
    }
}

/// Outcome of evaluating a record against a [`RuleSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub pipelines: BTreeSet<String>,
    pub stdout: bool,
}

impl Evaluation {
    /// Whether any rule asked for this record to go anywhere.
    #[must_use]
    pub fn is_routed(&self) -> bool {
        self.stdout || !self.pipelines.is_empty()
    }

    #[must_use]
    pub fn into_record(self, payload: Value) -> EvaluatedRecord {
        EvaluatedRecord {
            payload,
            pipelines: self.pipelines,
            stdout: self.stdout,
        }
    }
}

/// An immutable, compiled set of rules.
///
/// Evaluation takes `&self` and touches no shared state, so a single set can
/// be shared across threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile `rules`, discarding rules that can never have an effect.
    ///
    /// # Errors
    ///
    /// Fails on the first condition with an empty key or an invalid pattern.
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Result<Self> {
        let mut compiled = Vec::new();

        for (index, rule) in rules.into_iter().enumerate() {
            let name = rule.name.as_deref().unwrap_or("<unnamed>");

            if rule.conditions.is_empty() {
                internal!(level = DEBUG, "Skipping rule {index} ({name}): no conditions");
                continue;
            }

            if rule.pipelines.is_empty() && !rule.stdout {
                internal!(level = DEBUG, "Skipping rule {index} ({name}): no pipelines and no stdout");
                continue;
            }

            let conditions = rule
                .conditions
                .iter()
                .map(Condition::compile)
                .collect::<Result<Vec<_>>>()?;

            compiled.push(CompiledRule {
                any: rule.any_condition_match || conditions.len() == 1,
                conditions,
                negate: rule.negate,
                pipelines: rule.pipelines,
                stdout: rule.stdout,
            });
        }

        Ok(Self { rules: compiled })
    }

    /// Load and compile every `*.ron` file under `<dir>/rules/`, in file
    /// name order, into one set. Without any such file `<dir>/rules.ron`
    /// is used; with neither the set is empty.
    ///
    /// # Errors
    ///
    /// Fails if a rule file cannot be read or parsed, or holds an invalid
    /// regex.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut files = rule_files(&dir.join(RULES_DIR))?;
        if files.is_empty() {
            let single = dir.join(RULES_FILE);
            if !single.is_file() {
                internal!(level = DEBUG, "No rules under {}", dir.display());
                return Ok(Self::empty());
            }
            files.push(single);
        }

        let mut rules = Vec::new();
        for path in &files {
            rules.extend(read_rules(path)?);
        }

        let set = Self::new(rules)?;
        internal!(
            level = INFO,
            "Loaded {} rules from {} files under {}",
            set.len(),
            files.len(),
            dir.display()
        );

        Ok(set)
    }

    /// Route `record`: the union of every firing rule's pipelines, and
    /// `stdout` if any firing rule asks for it.
    #[must_use]
    pub fn evaluate(&self, record: &Value) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for rule in self.rules.iter().filter(|rule| rule.fires(record)) {
            evaluation.pipelines.extend(rule.pipelines.iter().cloned());
            evaluation.stdout |= rule.stdout;
        }

        evaluation
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// `*.ron` files directly under `dir`, sorted by name.
fn rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let io_error = |source: std::io::Error| RuleError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "ron") {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn read_rules(path: &Path) -> Result<Vec<Rule>> {
    let contents = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    ron::Options::default()
        .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
        .from_str(&contents)
        .map_err(|source| RuleError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ConditionType;

    #[test]
    fn test_rules_without_effect_are_discarded() {
        let set = RuleSet::new([
            Rule {
                pipelines: vec!["p".into()],
                ..Rule::default()
            },
            Rule {
                conditions: vec![Condition::new("level", ConditionType::Exact, "INFO")],
                ..Rule::default()
            },
        ])
        .unwrap();

        assert!(set.is_empty());
        assert_eq!(set.evaluate(&json!({"level": "INFO"})), Evaluation::default());
    }

    #[test]
    fn test_whole_rule_negate() {
        let set = RuleSet::new([Rule {
            conditions: vec![Condition::new("level", ConditionType::Exact, "DEBUG")],
            negate: true,
            pipelines: vec!["non-debug".into()],
            ..Rule::default()
        }])
        .unwrap();

        assert!(set.evaluate(&json!({"level": "INFO"})).pipelines.contains("non-debug"));
        assert!(set.evaluate(&json!({"level": "DEBUG"})).pipelines.is_empty());
    }
}
