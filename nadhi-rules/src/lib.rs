//! Rule engine deciding which pipelines receive a log record.
//!
//! Rules are loaded once, compiled (regex patterns, dotted key paths) and
//! then evaluated as a pure function of the record. Every firing rule
//! contributes its pipelines; there is no first-match-wins.

pub mod condition;
pub mod engine;
pub mod error;
pub mod lookup;

pub use condition::{Condition, ConditionType};
pub use engine::{Evaluation, Rule, RuleSet};
pub use error::{Result, RuleError};
