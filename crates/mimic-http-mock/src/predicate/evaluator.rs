//! Candidate evaluation against a match target.
//!
//! Evaluation short-circuits in a fixed order. Method, group scope and path
//! are *structural*: a failure there means the candidate is simply absent for
//! this request and nothing is reported. Query parameters, headers, content
//! type and body are *validations*: the candidate addresses this endpoint but
//! the request is not acceptable to it, and the first failing field is
//! reported with its expected pattern and observed value.

use serde::Serialize;
use std::fmt;
use tracing::debug;

use super::contents::{ContentsPattern, PatternError};
use super::path_template::{PathParams, PathTemplate};
use super::value_pattern::ValuePattern;
use crate::scenario::{MatchTarget, MethodType, ScenarioDescriptor, ScenarioError};

/// Request part a validation mismatch was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    QueryParam,
    Header,
    PostParam,
    ContentType,
    Contents,
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchField::QueryParam => "query parameter",
            MatchField::Header => "header",
            MatchField::PostParam => "form field",
            MatchField::ContentType => "content type",
            MatchField::Contents => "contents",
        };
        f.write_str(label)
    }
}

/// Structured detail of a validation mismatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MismatchReason {
    /// Scenario that rejected the request.
    pub scenario: String,
    pub field: MatchField,
    /// Parameter or header name, when the field has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub expected: String,
    pub actual: Option<String>,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.field)?;
        if let Some(name) = &self.name {
            write!(f, " '{name}'")?;
        }
        match &self.actual {
            Some(actual) => write!(f, " expected '{}' but was '{}'", self.expected, actual),
            None => write!(f, " expected '{}' but was absent", self.expected),
        }
    }
}

/// Result of evaluating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Candidate accepts the request; carries extracted path parameters.
    Compatible(PathParams),
    /// Candidate does not address this request at all.
    Absent,
    /// Candidate addresses this endpoint but rejects the request.
    Mismatch(MismatchReason),
}

impl Evaluation {
    pub fn is_compatible(&self) -> bool {
        matches!(self, Evaluation::Compatible(_))
    }
}

/// Compiled match criteria of a descriptor.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    name: String,
    method: MethodType,
    group: Option<String>,
    path: PathTemplate,
    query_params: Vec<(String, ValuePattern)>,
    /// Header names lowercased.
    headers: Vec<(String, ValuePattern)>,
    post_params: Vec<(String, ValuePattern)>,
    content_type: Option<ValuePattern>,
    contents: Option<ContentsPattern>,
}

impl CompiledMatcher {
    /// Compile every pattern-bearing field, failing on the first invalid one.
    pub fn compile(descriptor: &ScenarioDescriptor) -> Result<Self, ScenarioError> {
        let invalid = |field: String, pattern: &str, source: PatternError| {
            ScenarioError::InvalidPattern {
                field,
                pattern: pattern.to_string(),
                source,
            }
        };

        let mut query_params = Vec::with_capacity(descriptor.match_query_params.len());
        for (name, raw) in &descriptor.match_query_params {
            let pattern = ValuePattern::compile(raw).map_err(|e| {
                invalid(format!("match_query_params.{name}"), raw, e.into())
            })?;
            query_params.push((name.clone(), pattern));
        }

        let mut headers = Vec::with_capacity(descriptor.match_headers.len());
        for (name, raw) in &descriptor.match_headers {
            let pattern = ValuePattern::compile(raw)
                .map_err(|e| invalid(format!("match_headers.{name}"), raw, e.into()))?;
            headers.push((name.to_ascii_lowercase(), pattern));
        }

        let mut post_params = Vec::with_capacity(descriptor.match_post_params.len());
        for (name, raw) in &descriptor.match_post_params {
            let pattern = ValuePattern::compile(raw).map_err(|e| {
                invalid(format!("match_post_params.{name}"), raw, e.into())
            })?;
            post_params.push((name.clone(), pattern));
        }

        let content_type = descriptor
            .match_content_type
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                ValuePattern::compile(raw)
                    .map_err(|e| invalid("match_content_type".to_string(), raw, e.into()))
            })
            .transpose()?;

        let contents = descriptor
            .match_contents
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                ContentsPattern::compile(raw)
                    .map_err(|e| invalid("match_contents".to_string(), raw, e))
            })
            .transpose()?;

        Ok(Self {
            name: descriptor.name.clone(),
            method: descriptor.method,
            group: descriptor.group.clone(),
            path: PathTemplate::parse(&descriptor.path),
            query_params,
            headers,
            post_params,
            content_type,
            contents,
        })
    }

    pub fn path(&self) -> &PathTemplate {
        &self.path
    }

    /// Evaluate this candidate against a target.
    pub fn evaluate(&self, target: &MatchTarget) -> Evaluation {
        if self.method != target.method {
            return Evaluation::Absent;
        }
        if let (Some(ours), Some(theirs)) = (&self.group, &target.group) {
            if ours != theirs {
                return Evaluation::Absent;
            }
        }
        let Some(params) = self.path.matches(&target.path) else {
            return Evaluation::Absent;
        };

        match self.validate(target) {
            Some(reason) => {
                debug!(
                    scenario = %self.name,
                    field = %reason.field,
                    expected = %reason.expected,
                    "candidate rejected request"
                );
                Evaluation::Mismatch(reason)
            }
            None => Evaluation::Compatible(params),
        }
    }

    fn validate(&self, target: &MatchTarget) -> Option<MismatchReason> {
        for (name, pattern) in &self.query_params {
            let observed = target.query_params.get(name).map(String::as_str);
            if !observed.is_some_and(|v| pattern.matches(v)) {
                return Some(self.reason(MatchField::QueryParam, Some(name), pattern, observed));
            }
        }

        for (name, pattern) in &self.headers {
            let observed = target.headers.get(name).map(String::as_str);
            if !observed.is_some_and(|v| pattern.matches(v)) {
                return Some(self.reason(MatchField::Header, Some(name), pattern, observed));
            }
        }

        for (name, pattern) in &self.post_params {
            let observed = target.post_params.get(name).map(String::as_str);
            if !observed.is_some_and(|v| pattern.matches(v)) {
                return Some(self.reason(MatchField::PostParam, Some(name), pattern, observed));
            }
        }

        if let Some(pattern) = &self.content_type {
            let observed = target.content_type.as_deref();
            if !observed.is_some_and(|v| pattern.matches(v)) {
                return Some(self.reason(MatchField::ContentType, None, pattern, observed));
            }
        }

        if let Some(pattern) = &self.contents {
            if let Err(mismatch) = pattern.check(&target.body) {
                return Some(MismatchReason {
                    scenario: self.name.clone(),
                    field: MatchField::Contents,
                    name: None,
                    expected: mismatch.expected,
                    actual: mismatch.actual,
                });
            }
        }

        None
    }

    fn reason(
        &self,
        field: MatchField,
        name: Option<&str>,
        pattern: &ValuePattern,
        observed: Option<&str>,
    ) -> MismatchReason {
        MismatchReason {
            scenario: self.name.clone(),
            field,
            name: name.map(str::to_string),
            expected: pattern.as_str().to_string(),
            actual: observed.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;

    fn compile(scenario: &Scenario) -> CompiledMatcher {
        CompiledMatcher::compile(&scenario.to_descriptor()).unwrap()
    }

    #[test]
    fn test_method_and_path_are_structural() {
        let matcher = compile(&Scenario::new(MethodType::Get, "ok", "/api/todos/:id"));

        let wrong_method = MatchTarget::new(MethodType::Post, "/api/todos/1");
        assert_eq!(matcher.evaluate(&wrong_method), Evaluation::Absent);

        let wrong_path = MatchTarget::new(MethodType::Get, "/api/todos");
        assert_eq!(matcher.evaluate(&wrong_path), Evaluation::Absent);

        let ok = MatchTarget::new(MethodType::Get, "/api/todos/1");
        match matcher.evaluate(&ok) {
            Evaluation::Compatible(params) => assert_eq!(params["id"], "1"),
            other => panic!("expected compatible, got {other:?}"),
        }
    }

    #[test]
    fn test_group_scope() {
        let matcher = compile(&Scenario::new(MethodType::Get, "ok", "/a").with_group("beta"));

        let other_group = MatchTarget::new(MethodType::Get, "/a").with_group("alpha");
        assert_eq!(matcher.evaluate(&other_group), Evaluation::Absent);

        let same_group = MatchTarget::new(MethodType::Get, "/a").with_group("beta");
        assert!(matcher.evaluate(&same_group).is_compatible());

        let unscoped = MatchTarget::new(MethodType::Get, "/a");
        assert!(matcher.evaluate(&unscoped).is_compatible());
    }

    #[test]
    fn test_missing_header_is_validation_mismatch() {
        let matcher = compile(
            &Scenario::new(MethodType::Get, "versioned", "/api/todos/:id")
                .with_header("X-Version", "v1"),
        );
        let target = MatchTarget::new(MethodType::Get, "/api/todos/1");
        match matcher.evaluate(&target) {
            Evaluation::Mismatch(reason) => {
                assert_eq!(reason.field, MatchField::Header);
                assert_eq!(reason.name.as_deref(), Some("x-version"));
                assert_eq!(reason.expected, "v1");
                assert_eq!(reason.actual, None);
                assert_eq!(reason.scenario, "versioned");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_header_names_case_insensitive() {
        let matcher =
            compile(&Scenario::new(MethodType::Get, "ok", "/a").with_header("X-Api-Key", "^k\\d$"));
        let target = MatchTarget::new(MethodType::Get, "/a").with_header("x-api-key", "k7");
        assert!(matcher.evaluate(&target).is_compatible());
    }

    #[test]
    fn test_query_param_mismatch_reports_observed_value() {
        let matcher =
            compile(&Scenario::new(MethodType::Get, "ok", "/a").with_query_param("page", r"^\d+$"));
        let target = MatchTarget::new(MethodType::Get, "/a").with_query_param("page", "two");
        match matcher.evaluate(&target) {
            Evaluation::Mismatch(reason) => {
                assert_eq!(reason.field, MatchField::QueryParam);
                assert_eq!(reason.actual.as_deref(), Some("two"));
                assert_eq!(
                    reason.to_string(),
                    r"[ok] query parameter 'page' expected '^\d+$' but was 'two'"
                );
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_post_params_checked_after_headers() {
        let matcher = compile(
            &Scenario::new(MethodType::Post, "admin", "/users")
                .with_header("X-Tenant", "acme")
                .with_post_param("role", "^admin$"),
        );

        let no_header = MatchTarget::new(MethodType::Post, "/users").with_post_param("role", "guest");
        match matcher.evaluate(&no_header) {
            Evaluation::Mismatch(reason) => assert_eq!(reason.field, MatchField::Header),
            other => panic!("expected mismatch, got {other:?}"),
        }

        let guest = MatchTarget::new(MethodType::Post, "/users")
            .with_header("X-Tenant", "acme")
            .with_post_param("role", "guest");
        match matcher.evaluate(&guest) {
            Evaluation::Mismatch(reason) => {
                assert_eq!(reason.field, MatchField::PostParam);
                assert_eq!(reason.name.as_deref(), Some("role"));
                assert_eq!(reason.actual.as_deref(), Some("guest"));
                assert_eq!(
                    reason.to_string(),
                    "[admin] form field 'role' expected '^admin$' but was 'guest'"
                );
            }
            other => panic!("expected mismatch, got {other:?}"),
        }

        let admin = MatchTarget::new(MethodType::Post, "/users")
            .with_header("X-Tenant", "acme")
            .with_post_param("role", "admin");
        assert!(matcher.evaluate(&admin).is_compatible());
    }

    #[test]
    fn test_invalid_post_param_pattern_rejected_at_compile() {
        let scenario = Scenario::new(MethodType::Post, "bad", "/a").with_post_param("role", "[");
        let err = CompiledMatcher::compile(&scenario.to_descriptor()).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidPattern { ref field, .. } if field == "match_post_params.role"));
    }

    #[test]
    fn test_content_type_and_contents() {
        let mut scenario = Scenario::new(MethodType::Post, "create", "/orders");
        scenario.request.match_content_type = Some("application/json".to_string());
        scenario.request.match_contents = Some(r#"{"sku": "^\\d+$"}"#.to_string());
        let matcher = compile(&scenario);

        let plain = MatchTarget::new(MethodType::Post, "/orders")
            .with_header("Content-Type", "text/plain")
            .with_body(r#"{"sku": "12"}"#);
        match matcher.evaluate(&plain) {
            Evaluation::Mismatch(reason) => assert_eq!(reason.field, MatchField::ContentType),
            other => panic!("expected mismatch, got {other:?}"),
        }

        let bad_body = MatchTarget::new(MethodType::Post, "/orders")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(r#"{"sku": "abc"}"#);
        match matcher.evaluate(&bad_body) {
            Evaluation::Mismatch(reason) => {
                assert_eq!(reason.field, MatchField::Contents);
                assert_eq!(reason.actual.as_deref(), Some("abc"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }

        let good = MatchTarget::new(MethodType::Post, "/orders")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"sku": "12"}"#);
        assert!(matcher.evaluate(&good).is_compatible());
    }

    #[test]
    fn test_invalid_pattern_rejected_at_compile() {
        let scenario = Scenario::new(MethodType::Get, "bad", "/a").with_query_param("q", "(");
        let err = CompiledMatcher::compile(&scenario.to_descriptor()).unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidPattern { ref field, .. } if field == "match_query_params.q"));
    }
}
