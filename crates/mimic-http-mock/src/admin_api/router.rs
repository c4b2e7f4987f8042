//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{lookup, scenarios, system};
use crate::admin_api::types::{get_base_url, not_found};
use crate::state::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Parsed route for addressed resources
#[derive(Debug, PartialEq, Eq)]
enum ResourceRoute<'a> {
    /// /scenarios/{METHOD}/{name}
    Scenario { method: &'a str, name: &'a str },
    /// /fixtures/{name}
    Fixture(&'a str),
}

impl<'a> ResourceRoute<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["scenarios", method, name] if !method.is_empty() && !name.is_empty() => {
                Some(ResourceRoute::Scenario { method, name })
            }
            ["fixtures", name] if !name.is_empty() => Some(ResourceRoute::Fixture(name)),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Admin API: {} {}", method, path);

    let response = route_by_path(&method, &path, query.as_deref(), req, state).await;
    Ok(response)
}

async fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => return system::handle_root(&get_base_url(&req)),
        (&Method::GET, "/health") => return system::handle_health(&state),
        (&Method::GET, "/metrics") => return system::handle_metrics(),
        (&Method::POST, "/reload") => return system::handle_reload(state),
        (&Method::GET, "/groups") => return scenarios::handle_groups(state),
        (&Method::POST, "/lookup") => return lookup::handle_lookup(req, state).await,
        (&Method::GET, "/scenarios") => return scenarios::handle_list(state, query),
        (&Method::POST, "/scenarios") => return scenarios::handle_save(req, state).await,
        _ => {}
    }

    match (method, ResourceRoute::parse(path)) {
        (&Method::GET, Some(ResourceRoute::Scenario { method, name })) => {
            scenarios::handle_get(method, name, query, state)
        }
        (&Method::DELETE, Some(ResourceRoute::Scenario { method, name })) => {
            scenarios::handle_delete(method, name, query, state)
        }
        (&Method::PUT, Some(ResourceRoute::Fixture(name))) => {
            scenarios::handle_save_fixture(name, req, state).await
        }
        _ => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_route_parse() {
        assert_eq!(
            ResourceRoute::parse("/scenarios/GET/todo-ok"),
            Some(ResourceRoute::Scenario {
                method: "GET",
                name: "todo-ok"
            })
        );
        assert_eq!(
            ResourceRoute::parse("/fixtures/todo.json"),
            Some(ResourceRoute::Fixture("todo.json"))
        );

        // Invalid routes
        assert_eq!(ResourceRoute::parse("/scenarios/GET"), None);
        assert_eq!(ResourceRoute::parse("/scenarios/GET/a/b"), None);
        assert_eq!(ResourceRoute::parse("/scenarios//x"), None);
        assert_eq!(ResourceRoute::parse("/unknown"), None);
    }
}
