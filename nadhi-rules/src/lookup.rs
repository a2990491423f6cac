//! Dotted-path traversal over structured records.

use std::borrow::Cow;

use serde_json::Value;

/// Split a dotted key such as `context.user.type` into its segments.
#[must_use]
pub fn split_path(key: &str) -> Vec<String> {
    key.split('.').map(str::to_owned).collect()
}

/// Resolve `path` inside `value`.
///
/// Mappings are indexed by key and sequences by a numeric segment. A path
/// that runs into a scalar, a missing key or an explicit `null` resolves to
/// `None`.
pub fn lookup<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = value;

    for segment in path {
        let segment = segment.as_ref();
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    (!current.is_null()).then_some(current)
}

/// The text a condition compares against.
///
/// Strings are used as-is; everything else is rendered as JSON.
#[must_use]
pub fn as_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_nested_mapping() {
        let record = json!({"context": {"user": {"type": "admin"}}});

        assert_eq!(
            lookup(&record, &split_path("context.user.type")),
            Some(&json!("admin"))
        );
        assert_eq!(lookup(&record, &split_path("context.user.name")), None);
        assert_eq!(lookup(&record, &split_path("context.user.type.deeper")), None);
    }

    #[test]
    fn test_sequence_index() {
        let record = json!({"tags": [{"name": "a"}, {"name": "b"}]});

        assert_eq!(lookup(&record, &split_path("tags.1.name")), Some(&json!("b")));
        assert_eq!(lookup(&record, &split_path("tags.7.name")), None);
        assert_eq!(lookup(&record, &split_path("tags.first.name")), None);
    }

    #[test]
    fn test_null_is_missing() {
        let record = json!({"context": {"user": null}});
        assert_eq!(lookup(&record, &split_path("context.user")), None);
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(as_text(&json!("plain")), "plain");
        assert_eq!(as_text(&json!(42)), "42");
        assert_eq!(as_text(&json!(true)), "true");
        assert_eq!(as_text(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
