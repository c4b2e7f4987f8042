//! Request/response bodies and response helpers for the Admin API.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::predicate::MismatchReason;
use crate::scenario::{
    BindingData, LookupError, MatchTarget, MethodType, Overrides, ResolvedScenario, Scenario,
    ScenarioDescriptor,
};

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<MismatchReason>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Response for listing scenarios
#[derive(Debug, Serialize)]
pub struct ListScenariosResponse {
    pub scenarios: Vec<ScenarioDescriptor>,
}

/// Body of `POST /lookup`: a request description plus overrides.
#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub method: MethodType,
    pub path: String,
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub post_params: HashMap<String, String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub contents: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub overrides: Overrides,
}

impl LookupRequest {
    pub fn to_target(&self) -> MatchTarget {
        let mut target = MatchTarget::new(self.method, crate::predicate::strip_query(&self.path));
        for (name, value) in &self.query_params {
            target = target.with_query_param(name.clone(), value.clone());
        }
        for (name, value) in &self.headers {
            target = target.with_header(name, value.clone());
        }
        for (name, value) in &self.post_params {
            target = target.with_post_param(name.clone(), value.clone());
        }
        if let Some(content_type) = &self.content_type {
            target = target.with_header("content-type", content_type.clone());
        }
        if let Some(contents) = &self.contents {
            target = target.with_body(contents.clone().into_bytes());
        }
        if let Some(group) = &self.group {
            target = target.with_group(group.clone());
        }
        target
    }
}

/// Body of a successful `POST /lookup`.
#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub scenario: Scenario,
    pub status: u16,
    pub contents: String,
    pub bindings: BindingData,
    pub request_count: u64,
}

impl From<ResolvedScenario> for LookupResponse {
    fn from(resolved: ResolvedScenario) -> Self {
        Self {
            status: resolved.scenario.response.status,
            contents: String::from_utf8_lossy(&resolved.body).into_owned(),
            scenario: resolved.scenario,
            bindings: resolved.bindings,
            request_count: resolved.request_count,
        }
    }
}

/// Query parameters for `/scenarios` endpoints
#[derive(Debug, Default)]
pub struct ScenarioQueryParams {
    pub group: Option<String>,
    pub path: Option<String>,
}

impl ScenarioQueryParams {
    /// Parse query parameters from query string
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = crate::template::parse_query_string(query);
        Self {
            group: params.remove("group").filter(|g| !g.is_empty()),
            path: params.remove("path").filter(|p| !p.is_empty()),
        }
    }
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with the given status and body.
///
/// Falls back to a bare 500 if the builder rejects its input.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| internal_error_fallback())
}

/// Build an HTTP response with headers.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| internal_error_fallback())
}

fn internal_error_fallback() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    coded_error_response(status, status.as_str(), message)
}

/// Error response with an explicit machine-readable code.
pub fn coded_error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        }],
        mismatches: Vec::new(),
    };
    json_response(status, &error)
}

/// HTTP status for a failed lookup: 404 when nothing was addressed, 400 when
/// candidates were addressed but rejected, 500 otherwise.
pub fn lookup_error_status(error: &LookupError) -> StatusCode {
    match error {
        LookupError::NoMatch { .. } => StatusCode::NOT_FOUND,
        LookupError::ValidationMismatch { .. } => StatusCode::BAD_REQUEST,
        LookupError::StorageInconsistency { .. } | LookupError::Render { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Error response for a failed lookup, carrying the mismatch list.
pub fn lookup_error_response(error: &LookupError) -> Response<Full<Bytes>> {
    let body = ErrorResponse {
        errors: vec![ErrorDetail {
            code: error.kind().as_str().to_string(),
            message: error.to_string(),
        }],
        mismatches: error.mismatches().to_vec(),
    };
    json_response(lookup_error_status(error), &body)
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Extract base URL from request headers for links
pub fn get_base_url(req: &Request<Incoming>) -> String {
    if let Some(host) = req.headers().get("host") {
        if let Ok(host_str) = host.to_str() {
            return format!("http://{}", host_str);
        }
    }
    "http://localhost:9090".to_string()
}
