//! Response body rendering.
//!
//! Rendering sits behind the [`BodyRenderer`] trait so lookups do not depend
//! on a particular template engine. The bundled [`PlaceholderRenderer`]
//! substitutes `${name}` placeholders from the lookup's binding data.
//!
//! # Bindings
//!
//! - path segments declared as `:id` or `{id}` are available as `${id}`
//! - query parameters and form fields by name, e.g. `${page}`
//! - caller overrides, which win over request-derived values
//! - `${_RequestCount}`, the aggregate selection count for the endpoint
//!
//! Object-valued bindings can be navigated with dots: `${user.name}`.
//!
//! # Example
//!
//! ```yaml
//! response:
//!   contents: '{"id": "${id}", "served": ${_RequestCount}}'
//! ```

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::scenario::BindingData;

/// Regex for placeholders: ${name}, ${user.name}, ${_RequestCount}
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\}").unwrap()
    })
}

/// Rendering failures.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no binding for placeholder '{0}'")]
    MissingBinding(String),
}

/// Turns a stored body template into response bytes.
pub trait BodyRenderer: Send + Sync {
    fn render(&self, template: &[u8], bindings: &BindingData) -> Result<Vec<u8>, RenderError>;
}

/// Substitutes `${name}` placeholders.
///
/// Templates that are not UTF-8 are passed through untouched. Unknown
/// placeholders are left as written unless `strict` is set.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderRenderer {
    pub strict: bool,
}

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }
}

impl BodyRenderer for PlaceholderRenderer {
    fn render(&self, template: &[u8], bindings: &BindingData) -> Result<Vec<u8>, RenderError> {
        let Ok(text) = std::str::from_utf8(template) else {
            return Ok(template.to_vec());
        };
        if !has_placeholders(text) {
            return Ok(template.to_vec());
        }

        let mut missing = None;
        let rendered = placeholder_regex().replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            match resolve(bindings, name) {
                Some(value) => value,
                None => {
                    if missing.is_none() {
                        missing = Some(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });

        if let (true, Some(name)) = (self.strict, missing) {
            return Err(RenderError::MissingBinding(name));
        }
        Ok(rendered.into_owned().into_bytes())
    }
}

/// Resolve a placeholder name, preferring an exact binding over navigation.
fn resolve(bindings: &BindingData, name: &str) -> Option<String> {
    if let Some(value) = bindings.get(name) {
        return Some(value_text(value));
    }
    let mut parts = name.split('.');
    let mut current = bindings.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value_text(current))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Check if a string contains placeholders
pub fn has_placeholders(s: &str) -> bool {
    placeholder_regex().is_match(s)
}

/// Parse a query string (or form body) into a map; later keys win.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(decode_component(key), decode_component(value));
            } else if !pair.is_empty() {
                params.insert(decode_component(pair), String::new());
            }
        }
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
