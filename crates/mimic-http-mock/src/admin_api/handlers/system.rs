//! System handlers: root, health, metrics, reload.

use crate::admin_api::types::*;
use crate::metrics::collect_metrics;
use crate::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

/// GET / - Root endpoint
pub fn handle_root(base_url: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "name": "mimic",
        "version": env!("CARGO_PKG_VERSION"),
        "_links": {
            "scenarios": {"href": format!("{}/scenarios", base_url)},
            "groups": {"href": format!("{}/groups", base_url)},
            "lookup": {"href": format!("{}/lookup", base_url)},
            "health": {"href": format!("{}/health", base_url)},
            "metrics": {"href": format!("{}/metrics", base_url)}
        }
    });
    json_response(StatusCode::OK, &body)
}

/// GET /health - Health check
pub fn handle_health(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "status": "ok",
            "scenarios": state.repository.index().len(),
            "selection": state.lookup.policy_name(),
            "recording": state.recorder.config().enabled,
            "uptime_secs": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        collect_metrics(),
    )
}

/// POST /reload - Rebuild the index from storage
pub fn handle_reload(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.repository.reload() {
        Ok(indexed) => {
            info!(scenarios = indexed, "reloaded scenarios from storage");
            json_response(StatusCode::OK, &serde_json::json!({"scenarios": indexed}))
        }
        Err(e) => {
            warn!(error = %e, "reload failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
