//! Request body patterns.
//!
//! A declared contents pattern takes one of two shapes:
//!
//! - **Text**: the body satisfies it when it contains the pattern literally or
//!   when the pattern, read as a regex, matches somewhere in the body.
//! - **Fields**: a JSON object whose values are all strings, e.g.
//!   `{"user.name": "^[a-z]+$", "$.items[*].sku": "\\d{4}"}`. The body must be
//!   JSON, and every field the body carries under a listed key must match that
//!   key's regex. Plain keys are dotted paths through objects, where array
//!   elements share their parent's key; keys starting with `$` are JSONPath
//!   queries.

use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while compiling a declared pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex for field '{field}': {source}")]
    FieldRegex {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid JSONPath '{expression}': {source}")]
    JsonPath {
        expression: String,
        #[source]
        source: serde_json_path::ParseError,
    },

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Clone)]
enum FieldSelector {
    Dotted(String),
    Query(Arc<JsonPath>),
}

/// One compiled entry of a field-mode pattern.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    key: String,
    selector: FieldSelector,
    regex: Arc<Regex>,
}

/// Compiled contents pattern.
#[derive(Debug, Clone)]
pub enum ContentsPattern {
    Text { raw: String, regex: Arc<Regex> },
    Fields { raw: String, fields: Vec<FieldPattern> },
}

/// Why a body did not satisfy a contents pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentsMismatch {
    /// Pattern or field regex that failed.
    pub expected: String,
    /// Offending value, `None` when the body was empty.
    pub actual: Option<String>,
}

impl ContentsPattern {
    pub fn compile(raw: &str) -> Result<Self, PatternError> {
        if let Some(map) = field_map(raw) {
            let mut fields = Vec::with_capacity(map.len());
            for (key, pattern) in map {
                let regex = Regex::new(&pattern).map_err(|source| {
                    PatternError::FieldRegex {
                        field: key.clone(),
                        source,
                    }
                })?;
                let selector = if key.starts_with('$') {
                    let path = JsonPath::parse(&key).map_err(|source| {
                        PatternError::JsonPath {
                            expression: key.clone(),
                            source,
                        }
                    })?;
                    FieldSelector::Query(Arc::new(path))
                } else {
                    FieldSelector::Dotted(key.clone())
                };
                fields.push(FieldPattern {
                    key,
                    selector,
                    regex: Arc::new(regex),
                });
            }
            fields.sort_by(|a, b| a.key.cmp(&b.key));
            return Ok(ContentsPattern::Fields {
                raw: raw.to_string(),
                fields,
            });
        }

        let regex = Regex::new(raw)?;
        Ok(ContentsPattern::Text {
            raw: raw.to_string(),
            regex: Arc::new(regex),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentsPattern::Text { raw, .. } | ContentsPattern::Fields { raw, .. } => raw,
        }
    }

    pub fn is_fields(&self) -> bool {
        matches!(self, ContentsPattern::Fields { .. })
    }

    /// Check a raw request body against this pattern.
    pub fn check(&self, body: &[u8]) -> Result<(), ContentsMismatch> {
        if body.is_empty() {
            return Err(ContentsMismatch {
                expected: self.as_str().to_string(),
                actual: None,
            });
        }
        let text = String::from_utf8_lossy(body);

        match self {
            ContentsPattern::Text { raw, regex } => {
                if text.contains(raw.as_str()) || regex.is_match(&text) {
                    Ok(())
                } else {
                    Err(ContentsMismatch {
                        expected: raw.clone(),
                        actual: Some(text.into_owned()),
                    })
                }
            }
            ContentsPattern::Fields { raw, fields } => {
                let json: Value = serde_json::from_slice(body).map_err(|_| ContentsMismatch {
                    expected: raw.clone(),
                    actual: Some(text.to_string()),
                })?;
                for field in fields {
                    check_field(field, &json)?;
                }
                Ok(())
            }
        }
    }
}

fn check_field(field: &FieldPattern, json: &Value) -> Result<(), ContentsMismatch> {
    let mut values = Vec::new();
    match &field.selector {
        FieldSelector::Dotted(key) => collect_dotted(json, key, "", &mut values),
        FieldSelector::Query(path) => {
            for node in path.query(json).all() {
                flatten_scalars(node, &mut values);
            }
        }
    }

    for value in values {
        let rendered = scalar_text(value);
        if !field.regex.is_match(&rendered) {
            return Err(ContentsMismatch {
                expected: format!("{} ~ {}", field.key, field.regex.as_str()),
                actual: Some(rendered),
            });
        }
    }
    Ok(())
}

/// Collect every scalar stored under `target` when the document is flattened
/// into dotted keys. Array elements inherit the key of their array.
fn collect_dotted<'a>(value: &'a Value, target: &str, prefix: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                // Skip subtrees that cannot lead to the target key
                if key == target || target.starts_with(&format!("{key}.")) {
                    collect_dotted(v, target, &key, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_dotted(item, target, prefix, out);
            }
        }
        Value::Null => {}
        scalar => {
            if prefix == target {
                out.push(scalar);
            }
        }
    }
}

fn flatten_scalars<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_scalars(item, out)),
        Value::Null => {}
        other => out.push(other),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// A pattern selects field mode when it is a non-empty JSON object whose
/// values are all strings.
fn field_map(raw: &str) -> Option<Vec<(String, String)>> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let Value::Object(map) = serde_json::from_str::<Value>(trimmed).ok()? else {
        return None;
    };
    if map.is_empty() {
        return None;
    }
    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_containment() {
        let pattern = ContentsPattern::compile("hello").unwrap();
        assert!(!pattern.is_fields());
        assert!(pattern.check(b"say hello world").is_ok());
        assert!(pattern.check(b"goodbye").is_err());
    }

    #[test]
    fn test_text_regex() {
        let pattern = ContentsPattern::compile(r"order-\d{3}").unwrap();
        assert!(pattern.check(b"id=order-123").is_ok());
        let err = pattern.check(b"id=order-12").unwrap_err();
        assert_eq!(err.actual.as_deref(), Some("id=order-12"));
    }

    #[test]
    fn test_empty_body_mismatches() {
        let pattern = ContentsPattern::compile("x").unwrap();
        let err = pattern.check(b"").unwrap_err();
        assert_eq!(err.actual, None);
        assert_eq!(err.expected, "x");
    }

    #[test]
    fn test_field_mode_dotted_keys() {
        let pattern =
            ContentsPattern::compile(r#"{"user.name": "^[a-z]+$", "user.age": "^\\d+$"}"#).unwrap();
        assert!(pattern.is_fields());
        assert!(pattern
            .check(br#"{"user": {"name": "alice", "age": 31}}"#)
            .is_ok());

        let err = pattern
            .check(br#"{"user": {"name": "Alice", "age": 31}}"#)
            .unwrap_err();
        assert_eq!(err.actual.as_deref(), Some("Alice"));
        assert!(err.expected.starts_with("user.name"));
    }

    #[test]
    fn test_field_mode_absent_fields_are_not_checked() {
        let pattern = ContentsPattern::compile(r#"{"user.email": "@"}"#).unwrap();
        assert!(pattern.check(br#"{"user": {"name": "bob"}}"#).is_ok());
    }

    #[test]
    fn test_field_mode_arrays_share_key() {
        let pattern = ContentsPattern::compile(r#"{"items.sku": "^\\d{4}$"}"#).unwrap();
        assert!(pattern
            .check(br#"{"items": [{"sku": "1234"}, {"sku": "5678"}]}"#)
            .is_ok());
        let err = pattern
            .check(br#"{"items": [{"sku": "1234"}, {"sku": "x"}]}"#)
            .unwrap_err();
        assert_eq!(err.actual.as_deref(), Some("x"));
    }

    #[test]
    fn test_field_mode_jsonpath_keys() {
        let pattern = ContentsPattern::compile(r#"{"$.order.id": "^ord-"}"#).unwrap();
        assert!(pattern.check(br#"{"order": {"id": "ord-9"}}"#).is_ok());
        assert!(pattern.check(br#"{"order": {"id": "x-9"}}"#).is_err());
    }

    #[test]
    fn test_field_mode_requires_json_body() {
        let pattern = ContentsPattern::compile(r#"{"a": "1"}"#).unwrap();
        assert!(pattern.check(b"not json").is_err());
    }

    #[test]
    fn test_json_object_with_non_string_values_is_not_field_mode() {
        assert!(field_map(r#"{"a": 1}"#).is_none());
        assert!(field_map("{}").is_none());
        assert!(field_map(r#"{"a": "1"}"#).is_some());
    }

    #[test]
    fn test_invalid_field_regex_rejected() {
        let err = ContentsPattern::compile(r#"{"a": "([a-z"}"#).unwrap_err();
        assert!(matches!(err, PatternError::FieldRegex { ref field, .. } if field == "a"));
    }

    #[test]
    fn test_invalid_jsonpath_rejected() {
        let err = ContentsPattern::compile(r#"{"$[": ".*"}"#).unwrap_err();
        assert!(matches!(err, PatternError::JsonPath { .. }));
    }
}
