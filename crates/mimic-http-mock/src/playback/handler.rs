//! Request handling for the playback listener.
//!
//! Turns an inbound request into a [`MatchTarget`], runs the lookup and
//! writes the selected scenario's response. Unmatched requests go upstream
//! when record mode is active.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{HeaderMap, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::controls::*;
use crate::admin_api::types::{
    build_response, build_response_with_headers, coded_error_response, error_response,
    lookup_error_response, lookup_error_status,
};
use crate::metrics;
use crate::recording::{RecordError, RecordOutcome, UpstreamRequest};
use crate::scenario::{LookupError, MatchTarget, MethodType, Overrides, ResolvedScenario};
use crate::state::AppState;
use crate::template::parse_query_string;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Hop-by-hop headers never copied from an upstream response.
const HOP_BY_HOP_HEADERS: &[&str] = &["connection", "keep-alive", "transfer-encoding"];

/// Handle a request to the playback listener
pub async fn handle_playback_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method_label = req.method().to_string();
    let response = serve(req, state).await;
    metrics::record_playback_response(&method_label, response.status().as_u16());
    Ok(response)
}

async fn serve(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let method = match MethodType::try_from(req.method()) {
        Ok(m) => m,
        Err(e) => return error_response(StatusCode::METHOD_NOT_ALLOWED, &e),
    };
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let controls = PlaybackControls::from_headers(req.headers());
    let headers = header_pairs(req.headers());

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Failed to read request body: {e}"),
            )
        }
    };

    let target = build_target(method, &path, query.as_deref(), &headers, &body, &controls);
    let overrides = build_overrides(&target);

    match state.lookup.lookup(&target, &overrides) {
        Ok(resolved) => scenario_response(resolved, &controls).await,
        Err(LookupError::NoMatch { .. }) if state.recorder.is_active(controls.record) => {
            let request = UpstreamRequest {
                method,
                path,
                query,
                headers,
                body,
            };
            record(&state, request, controls).await
        }
        Err(e) => {
            let status = lookup_error_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                warn!(error = %e, "lookup failed");
            } else {
                debug!(error = %e, "no scenario served");
            }
            lookup_error_response(&e)
        }
    }
}

/// Request headers as name/value pairs; non-UTF-8 values are dropped.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect()
}

fn build_target(
    method: MethodType,
    path: &str,
    query: Option<&str>,
    headers: &[(String, String)],
    body: &Bytes,
    controls: &PlaybackControls,
) -> MatchTarget {
    let mut target = MatchTarget::new(method, path).with_body(body.to_vec());
    for (name, value) in parse_query_string(query) {
        target = target.with_query_param(name, value);
    }
    for (name, value) in headers {
        // Repeated headers are folded the way HTTP allows
        let value = match target.header(name) {
            Some(existing) => format!("{existing}, {value}"),
            None => value.clone(),
        };
        target = target.with_header(name, value);
    }
    if let Some(group) = &controls.group {
        target = target.with_group(group.clone());
    }
    if is_form(&target) {
        if let Ok(form) = std::str::from_utf8(body) {
            for (name, value) in parse_query_string(Some(form)) {
                target = target.with_post_param(name, value);
            }
        }
    }
    target
}

fn is_form(target: &MatchTarget) -> bool {
    target
        .content_type
        .as_deref()
        .map(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Query parameters and urlencoded form fields, as overrides. Form fields win.
fn build_overrides(target: &MatchTarget) -> Overrides {
    target
        .query_params
        .iter()
        .chain(target.post_params.iter())
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect()
}

async fn scenario_response(
    resolved: ResolvedScenario,
    controls: &PlaybackControls,
) -> Response<Full<Bytes>> {
    let scenario = &resolved.scenario;
    let status_code = controls.response_status.unwrap_or(scenario.response.status);
    let status = match StatusCode::from_u16(status_code) {
        Ok(s) => s,
        Err(_) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Scenario {} has invalid status {status_code}", scenario.name),
            )
        }
    };

    if let Some(delay) = controls.wait_before_reply.or(scenario.wait_before_reply) {
        if !delay.is_zero() {
            debug!(scenario = %scenario.name, delay_ms = delay.as_millis() as u64, "delaying reply");
            tokio::time::sleep(delay).await;
        }
    }

    let mut builder = Response::builder().status(status);
    for (name, values) in &scenario.response.headers {
        for value in values {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder = builder
        .header(SCENARIO_HEADER, scenario.name.as_str())
        .header(PATH_HEADER, scenario.path.as_str())
        .header(REQUEST_COUNT_HEADER, resolved.request_count.to_string());

    match builder.body(Full::new(Bytes::from(resolved.body))) {
        Ok(response) => response,
        Err(e) => {
            warn!(scenario = %scenario.name, error = %e, "invalid response headers in scenario");
            build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Scenario {} has invalid response headers: {e}", scenario.name),
            )
        }
    }
}

async fn record(
    state: &AppState,
    request: UpstreamRequest,
    controls: PlaybackControls,
) -> Response<Full<Bytes>> {
    let Some(upstream) = state
        .recorder
        .upstream_for(controls.upstream_url.as_deref())
        .map(str::to_string)
    else {
        let e = RecordError::NoUpstream;
        return coded_error_response(StatusCode::BAD_REQUEST, "no_upstream", &e.to_string());
    };

    info!(method = %request.method, path = %request.path, upstream = %upstream, "recording unmatched request");
    match state
        .recorder
        .record(&state.repository, &upstream, request, controls.group)
        .await
    {
        Ok(outcome) => recorded_response(outcome),
        Err(e @ RecordError::InvalidUpstream { .. }) | Err(e @ RecordError::NoUpstream) => {
            coded_error_response(StatusCode::BAD_REQUEST, "invalid_upstream", &e.to_string())
        }
        Err(e) => {
            warn!(error = %e, "upstream request failed");
            coded_error_response(StatusCode::BAD_GATEWAY, "upstream_error", &e.to_string())
        }
    }
}

fn recorded_response(outcome: RecordOutcome) -> Response<Full<Bytes>> {
    let response = outcome.response;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers: Vec<(String, String)> = response
        .headers
        .into_iter()
        .filter(|(k, _)| !HOP_BY_HOP_HEADERS.contains(&k.to_ascii_lowercase().as_str()))
        .filter(|(k, _)| !k.eq_ignore_ascii_case("content-length"))
        .collect();
    headers.push((RECORDED_HEADER.to_string(), "true".to_string()));
    if let Some(key) = &outcome.saved {
        headers.push((SCENARIO_HEADER.to_string(), key.name.clone()));
        headers.push((PATH_HEADER.to_string(), key.path.clone()));
    }

    build_response_with_headers(status, headers, response.body)
}
