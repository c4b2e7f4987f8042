//! Scenario CRUD handlers.

use crate::admin_api::types::*;
use crate::scenario::{MethodType, ScenarioError, ScenarioKey};
use crate::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

/// Map a save/get/delete failure to a response.
pub fn scenario_error_response(error: &ScenarioError) -> Response<Full<Bytes>> {
    let status = match error {
        ScenarioError::InvalidDescriptor(_)
        | ScenarioError::InvalidPattern { .. }
        | ScenarioError::InvalidWeight { .. } => StatusCode::BAD_REQUEST,
        ScenarioError::NameConflict { .. } => StatusCode::CONFLICT,
        ScenarioError::NotFound(_) => StatusCode::NOT_FOUND,
        ScenarioError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &error.to_string())
}

/// GET /scenarios - List scenario descriptors, optionally by group
pub fn handle_list(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let params = ScenarioQueryParams::parse(query);
    let scenarios = state.repository.list(params.group.as_deref());
    json_response(StatusCode::OK, &ListScenariosResponse { scenarios })
}

/// POST /scenarios - Create or replace a scenario (YAML or JSON body)
pub async fn handle_save(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    let document = match std::str::from_utf8(&body) {
        Ok(d) => d,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Scenario body must be UTF-8"),
    };

    match state.repository.save_document(document) {
        Ok(scenario) => {
            info!(scenario = %scenario.key(), "scenario saved via admin API");
            json_response(StatusCode::CREATED, &scenario)
        }
        Err(e) => {
            warn!(error = %e, "rejected scenario");
            scenario_error_response(&e)
        }
    }
}

/// Resolve `/scenarios/{METHOD}/{name}` plus the mandatory `?path=`.
fn scenario_key(
    method: &str,
    name: &str,
    query: Option<&str>,
) -> Result<ScenarioKey, Response<Full<Bytes>>> {
    let method: MethodType = method
        .parse()
        .map_err(|e: String| error_response(StatusCode::BAD_REQUEST, &e))?;
    let name = urlencoding::decode(name)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid scenario name encoding"))?;
    let path = ScenarioQueryParams::parse(query).path.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "Query parameter 'path' is required to address a scenario",
        )
    })?;
    Ok(ScenarioKey::new(method, &name, &path))
}

/// GET /scenarios/{METHOD}/{name}?path=
pub fn handle_get(
    method: &str,
    name: &str,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let key = match scenario_key(method, name, query) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match state.repository.get(&key) {
        Ok(scenario) => {
            let descriptor = state.repository.descriptor(&key);
            json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "scenario": scenario,
                    "request_count": descriptor.as_ref().map(|d| d.request_count).unwrap_or(0),
                    "last_usage_time": descriptor.and_then(|d| d.last_usage_time),
                }),
            )
        }
        Err(e) => scenario_error_response(&e),
    }
}

/// DELETE /scenarios/{METHOD}/{name}?path=
pub fn handle_delete(
    method: &str,
    name: &str,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let key = match scenario_key(method, name, query) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match state.repository.delete(&key) {
        Ok(()) => build_response(StatusCode::NO_CONTENT, Bytes::new()),
        Err(e) => scenario_error_response(&e),
    }
}

/// GET /groups
pub fn handle_groups(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "groups": state.repository.groups() }),
    )
}

/// PUT /fixtures/{name} - Store a body fixture
pub async fn handle_save_fixture(
    name: &str,
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let name = match urlencoding::decode(name) {
        Ok(n) => n.into_owned(),
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid fixture name encoding"),
    };
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    match state.repository.save_fixture(&name, &body) {
        Ok(()) => {
            info!(fixture = %name, bytes = body.len(), "fixture saved");
            json_response(StatusCode::CREATED, &serde_json::json!({ "fixture": name }))
        }
        Err(e) => scenario_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingConfig;
    use crate::scenario::{Scenario, SelectionStrategy};
    use crate::storage::InMemoryScenarioStore;

    fn state() -> Arc<AppState> {
        Arc::new(
            AppState::new(
                Arc::new(InMemoryScenarioStore::new()),
                SelectionStrategy::default(),
                RecordingConfig::default(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_scenario_key_requires_path() {
        assert!(scenario_key("GET", "ok", None).is_err());
        assert!(scenario_key("FETCH", "ok", Some("path=/x")).is_err());
        let key = scenario_key("get", "todo%20one", Some("path=%2Fapi%2Ftodos")).unwrap();
        assert_eq!(key.method, MethodType::Get);
        assert_eq!(key.name, "todo one");
        assert_eq!(key.path, "/api/todos");
    }

    #[test]
    fn test_get_and_delete() {
        let state = state();
        state
            .repository
            .save(Scenario::new(MethodType::Get, "ok", "/api/todos/:id"))
            .unwrap();

        let query = Some("path=/api/todos/:id");
        assert_eq!(
            handle_get("GET", "ok", query, state.clone()).status(),
            StatusCode::OK
        );
        assert_eq!(
            handle_delete("GET", "ok", query, state.clone()).status(),
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            handle_get("GET", "ok", query, state.clone()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            handle_delete("GET", "ok", query, state).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_list_and_groups() {
        let state = state();
        state
            .repository
            .save(Scenario::new(MethodType::Get, "a", "/a").with_group("alpha"))
            .unwrap();
        assert_eq!(handle_list(state.clone(), Some("group=alpha")).status(), StatusCode::OK);
        assert_eq!(handle_groups(state).status(), StatusCode::OK);
    }

    #[test]
    fn test_error_status_mapping() {
        let conflict = ScenarioError::NameConflict {
            name: "a".to_string(),
            existing: ScenarioKey::new(MethodType::Get, "a", "/a"),
        };
        assert_eq!(scenario_error_response(&conflict).status(), StatusCode::CONFLICT);
        let invalid = ScenarioError::InvalidDescriptor("bad".to_string());
        assert_eq!(scenario_error_response(&invalid).status(), StatusCode::BAD_REQUEST);
    }
}
