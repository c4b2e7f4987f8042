//! Type definitions for scenarios and lookups.
//!
//! A [`Scenario`] is the full stored document: match criteria, response
//! definition and artificial delay. A [`MatchTarget`] is the request-shaped
//! projection of an inbound call that lookups are evaluated against.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::descriptor::{ScenarioDescriptor, ScenarioKey};

/// Binding name carrying the aggregate request count of compatible candidates.
pub const REQUEST_COUNT_BINDING: &str = "_RequestCount";

/// Values made available to the body renderer.
pub type BindingData = BTreeMap<String, serde_json::Value>;

/// Caller-supplied values that take precedence over request-derived bindings.
pub type Overrides = HashMap<String, serde_json::Value>;

// ============================================================================
// HTTP Method
// ============================================================================

/// HTTP verb a scenario answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodType {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl MethodType {
    pub const ALL: [MethodType; 9] = [
        MethodType::Get,
        MethodType::Post,
        MethodType::Put,
        MethodType::Delete,
        MethodType::Patch,
        MethodType::Head,
        MethodType::Options,
        MethodType::Connect,
        MethodType::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodType::Get => "GET",
            MethodType::Post => "POST",
            MethodType::Put => "PUT",
            MethodType::Delete => "DELETE",
            MethodType::Patch => "PATCH",
            MethodType::Head => "HEAD",
            MethodType::Options => "OPTIONS",
            MethodType::Connect => "CONNECT",
            MethodType::Trace => "TRACE",
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        MethodType::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| format!("unsupported HTTP method '{s}'"))
    }
}

impl TryFrom<&hyper::Method> for MethodType {
    type Error = String;

    fn try_from(method: &hyper::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl Serialize for MethodType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MethodType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Stored Scenario
// ============================================================================

/// Request match criteria of a stored scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioRequest {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_query_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_headers: BTreeMap<String, String>,
    /// Fields of an `application/x-www-form-urlencoded` body.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_post_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_contents: Option<String>,
}

/// Response returned when a scenario is selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Inline body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    /// Fixture holding the body template; takes precedence over `contents`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents_file: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl Default for ScenarioResponse {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: BTreeMap::new(),
            contents: None,
            contents_file: None,
        }
    }
}

/// A stored scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub method: MethodType,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Traffic-share weight: `0.7`, `70%` or `70`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default)]
    pub request: ScenarioRequest,
    #[serde(default)]
    pub response: ScenarioResponse,
    #[serde(
        default,
        with = "duration_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub wait_before_reply: Option<Duration>,
}

impl Scenario {
    pub fn new(method: MethodType, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            name: name.into(),
            path: path.into(),
            group: None,
            description: None,
            predicate: None,
            request: ScenarioRequest::default(),
            response: ScenarioResponse::default(),
            wait_before_reply: None,
        }
    }

    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(self.method, &self.name, &self.path)
    }

    /// Project the scenario onto its indexable descriptor.
    pub fn to_descriptor(&self) -> ScenarioDescriptor {
        ScenarioDescriptor {
            method: self.method,
            name: self.name.clone(),
            path: self.path.clone(),
            group: self.group.clone(),
            match_query_params: self.request.match_query_params.clone(),
            match_headers: self.request.match_headers.clone(),
            match_post_params: self.request.match_post_params.clone(),
            match_content_type: self.request.match_content_type.clone(),
            match_contents: self.request.match_contents.clone(),
            predicate: self.predicate.clone(),
            request_count: 0,
            last_usage_time: None,
        }
    }

    /// Builder-style helpers used by the recorder and tests.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_predicate(mut self, weight: impl Into<String>) -> Self {
        self.predicate = Some(weight.into());
        self
    }

    pub fn with_contents(mut self, contents: impl Into<String>) -> Self {
        self.response.contents = Some(contents.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.response.status = status;
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.request
            .match_query_params
            .insert(name.into(), pattern.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.request.match_headers.insert(name.into(), pattern.into());
        self
    }

    pub fn with_post_param(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.request
            .match_post_params
            .insert(name.into(), pattern.into());
        self
    }
}

/// Serde helper for `250ms` / `1s` style durations.
mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => humantime::parse_duration(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// Lookup Input / Output
// ============================================================================

/// Request-shaped projection of an inbound call.
#[derive(Debug, Clone)]
pub struct MatchTarget {
    pub method: MethodType,
    /// Concrete request path, without query string.
    pub path: String,
    pub query_params: HashMap<String, String>,
    /// Header names are stored lowercased.
    pub headers: HashMap<String, String>,
    /// Decoded fields of a form-encoded body.
    pub post_params: HashMap<String, String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Restricts candidates to one group when set.
    pub group: Option<String>,
}

impl MatchTarget {
    pub fn new(method: MethodType, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            post_params: HashMap::new(),
            content_type: None,
            body: Vec::new(),
            group: None,
        }
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "content-type" {
            self.content_type = Some(value.clone());
        }
        self.headers.insert(name, value);
        self
    }

    pub fn with_post_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.post_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone)]
pub struct ResolvedScenario {
    pub scenario: Scenario,
    /// Rendered response body.
    pub body: Vec<u8>,
    pub bindings: BindingData,
    /// Sum of request counts across all compatible candidates, after selection.
    pub request_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<MethodType>().unwrap(), MethodType::Get);
        assert_eq!("Patch".parse::<MethodType>().unwrap(), MethodType::Patch);
        assert!("FETCH".parse::<MethodType>().is_err());
    }

    #[test]
    fn test_method_serde_uppercase() {
        let json = serde_json::to_string(&MethodType::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
        let parsed: MethodType = serde_json::from_str("\"post\"").unwrap();
        assert_eq!(parsed, MethodType::Post);
    }

    #[test]
    fn test_scenario_yaml_defaults() {
        let yaml = r#"
method: GET
name: todo-ok
path: /api/todos/:id
response:
  contents: '{"id": "${id}"}'
wait_before_reply: 250ms
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.response.status, 200);
        assert_eq!(scenario.wait_before_reply, Some(Duration::from_millis(250)));
        assert!(scenario.request.match_headers.is_empty());

        let out = serde_yaml::to_string(&scenario).unwrap();
        assert!(out.contains("wait_before_reply: 250ms"));
    }

    #[test]
    fn test_target_header_names_lowercased() {
        let target = MatchTarget::new(MethodType::Post, "/x")
            .with_header("Content-Type", "application/json")
            .with_header("X-Api-Key", "k");
        assert_eq!(target.header("x-api-key"), Some("k"));
        assert_eq!(target.header("X-API-KEY"), Some("k"));
        assert_eq!(target.content_type.as_deref(), Some("application/json"));
    }
}
