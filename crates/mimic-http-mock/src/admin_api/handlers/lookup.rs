//! POST /lookup: run a lookup from a JSON request description.

use crate::admin_api::types::*;
use crate::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

pub async fn handle_lookup(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    let request: LookupRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid lookup JSON: {e}"),
            )
        }
    };

    let target = request.to_target();
    debug!(method = %target.method, path = %target.path, "admin lookup");
    match state.lookup.lookup(&target, &request.overrides) {
        Ok(resolved) => json_response(StatusCode::OK, &LookupResponse::from(resolved)),
        Err(e) => lookup_error_response(&e),
    }
}
