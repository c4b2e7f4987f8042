//! Scenario generation from recorded request/response pairs.

use std::collections::BTreeMap;

use super::types::{RecordedResponse, UpstreamRequest};
use crate::predicate::normalize_path;
use crate::scenario::Scenario;
use crate::template::parse_query_string;

/// Response headers that describe the upstream connection rather than the
/// payload and must not be replayed.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "date",
];

/// Options for [`generate_scenario`].
#[derive(Debug, Clone, Default)]
pub struct GeneratorOptions {
    pub name: String,
    pub group: Option<String>,
    /// Replay the observed upstream latency.
    pub capture_latency: bool,
    /// Where the exchange was recorded from, kept in the description.
    pub source_url: Option<String>,
}

/// Build a scenario that replays `response` for requests shaped like `request`.
///
/// Query parameters become exact (escaped, anchored) patterns so replay only
/// matches the same parameter values.
pub fn generate_scenario(
    request: &UpstreamRequest,
    response: &RecordedResponse,
    options: GeneratorOptions,
) -> Scenario {
    let mut scenario = Scenario::new(
        request.method,
        options.name,
        normalize_path(&request.path),
    );
    scenario.group = options.group;
    scenario.description = options
        .source_url
        .map(|url| format!("Recorded from {url}"));

    for (name, value) in parse_query_string(request.query.as_deref()) {
        scenario
            .request
            .match_query_params
            .insert(name, format!("^{}$", regex::escape(&value)));
    }

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &response.headers {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        headers.entry(name.clone()).or_default().push(value.clone());
    }
    scenario.response.status = response.status;
    scenario.response.headers = headers;
    if !response.body.is_empty() {
        scenario.response.contents = Some(String::from_utf8_lossy(&response.body).into_owned());
    }

    if options.capture_latency {
        scenario.wait_before_reply = Some(response.latency);
    }

    scenario
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::MethodType;
    use bytes::Bytes;
    use std::time::Duration;

    fn request(path: &str, query: Option<&str>) -> UpstreamRequest {
        UpstreamRequest {
            method: MethodType::Get,
            path: path.to_string(),
            query: query.map(str::to_string),
            headers: vec![],
            body: Bytes::new(),
        }
    }

    fn response() -> RecordedResponse {
        RecordedResponse {
            status: 201,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Set-Cookie".to_string(), "a=1".to_string()),
                ("Set-Cookie".to_string(), "b=2".to_string()),
                ("Transfer-Encoding".to_string(), "chunked".to_string()),
                ("content-length".to_string(), "12".to_string()),
            ],
            body: Bytes::from_static(br#"{"ok": true}"#),
            latency: Duration::from_millis(42),
        }
    }

    fn options(name: &str) -> GeneratorOptions {
        GeneratorOptions {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_basic() {
        let scenario = generate_scenario(&request("/api/items/", None), &response(), options("rec"));
        assert_eq!(scenario.method, MethodType::Get);
        assert_eq!(scenario.name, "rec");
        assert_eq!(scenario.path, "/api/items");
        assert_eq!(scenario.response.status, 201);
        assert_eq!(scenario.response.contents.as_deref(), Some(r#"{"ok": true}"#));
        assert!(scenario.wait_before_reply.is_none());
        assert!(scenario.request.match_query_params.is_empty());
    }

    #[test]
    fn test_query_params_become_exact_patterns() {
        let scenario = generate_scenario(
            &request("/search", Some("q=a.b%2Bc&page=2")),
            &response(),
            options("rec"),
        );
        let params = &scenario.request.match_query_params;
        assert_eq!(params["q"], r"^a\.b\+c$");
        assert_eq!(params["page"], "^2$");
    }

    #[test]
    fn test_connection_headers_dropped_and_repeats_kept() {
        let scenario = generate_scenario(&request("/x", None), &response(), options("rec"));
        let headers = &scenario.response.headers;
        assert_eq!(headers["Set-Cookie"], vec!["a=1", "b=2"]);
        assert!(headers.contains_key("Content-Type"));
        assert!(!headers.contains_key("Transfer-Encoding"));
        assert!(!headers.contains_key("content-length"));
    }

    #[test]
    fn test_latency_captured_when_requested() {
        let scenario = generate_scenario(
            &request("/x", None),
            &response(),
            GeneratorOptions {
                name: "rec".to_string(),
                group: Some("recorded".to_string()),
                capture_latency: true,
                source_url: Some("http://upstream:3000/x".to_string()),
            },
        );
        assert_eq!(scenario.wait_before_reply, Some(Duration::from_millis(42)));
        assert_eq!(scenario.group.as_deref(), Some("recorded"));
        assert_eq!(
            scenario.description.as_deref(),
            Some("Recorded from http://upstream:3000/x")
        );
    }

    #[test]
    fn test_empty_body_has_no_contents() {
        let mut empty = response();
        empty.body = Bytes::new();
        let scenario = generate_scenario(&request("/x", None), &empty, options("rec"));
        assert!(scenario.response.contents.is_none());
    }

    #[test]
    fn test_generated_scenario_passes_validation() {
        let mut scenario = generate_scenario(
            &request("/api/v1/items", Some("id=7")),
            &response(),
            options("recorded-201-1700000000000-1"),
        );
        assert!(crate::scenario::validate_scenario(&mut scenario).is_ok());
    }
}
