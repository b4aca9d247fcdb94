//! Request -> node resolution.
//!
//! Resolution order:
//!
//! 1. Primary-only paths (session, health, node management, settings,
//!    identity, non-API assets, unscoped list reads).
//! 2. Creation requests read `node_id` from the JSON body and fall back to
//!    the primary when it is absent, malformed or not online.
//! 3. Single-resource paths require a `node_id` query parameter naming an
//!    online node; anything else is a caller error.
//! 4. Everything else goes to the primary.
//!
//! Creation is checked before single-resource paths because
//! `POST /api/tunnels/quick` would otherwise look like a tunnel id.

use std::sync::{Arc, LazyLock};

use axum::extract::Query;
use axum::http::{Method, Uri};
use regex::Regex;
use shipyard_core::node::NodeStatus;
use shipyard_core::paths::{is_under, AUTH_PREFIX, HEALTH_PATH, NODES_PATH, NODE_ID_PARAM};

use crate::registry::NodeRegistry;

/// Single-resource paths: `/api/{apps|jobs|tunnels}/{id}[/...]`.
static NODE_SCOPED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/api/(apps|jobs|tunnels)/[^/]+(/.*)?$").expect("valid regex")
});

/// Paths whose state lives only on the primary, for every method.
const PRIMARY_PREFIXES: &[&str] = &[NODES_PATH, "/api/settings", "/api/me"];

/// Unscoped list endpoints, served from the primary for `GET`.
const PRIMARY_LISTS: &[&str] = &["/api/apps", "/api/jobs", "/api/tunnels", "/api/templates"];

/// `POST` endpoints that create a resource on a caller-chosen node.
const CREATION_PATHS: &[&str] = &["/api/apps", "/api/jobs", "/api/tunnels", "/api/tunnels/quick"];

/// Why a request could not be routed. All variants are caller errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("{path} requires a node_id query parameter")]
    MissingNodeId { path: String },

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("node '{node_id}' is {status}")]
    UnhealthyNode { node_id: String, status: NodeStatus },
}

#[derive(Clone)]
pub struct RequestRouter {
    registry: Arc<NodeRegistry>,
}

impl RequestRouter {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Base URL of the node that must serve this request.
    ///
    /// `body` is only inspected, never consumed.
    pub fn target(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        body: &[u8],
    ) -> Result<String, RouteError> {
        if is_primary_only(method, path) {
            return Ok(self.primary());
        }

        if method == Method::POST && CREATION_PATHS.contains(&path) {
            return Ok(self.creation_target(path, body));
        }

        if NODE_SCOPED_RE.is_match(path) {
            let node_id = query_param(query, NODE_ID_PARAM).ok_or_else(|| {
                RouteError::MissingNodeId {
                    path: path.to_string(),
                }
            })?;
            return self.healthy_node(&node_id);
        }

        Ok(self.primary())
    }

    fn primary(&self) -> String {
        self.registry.primary_base_url().to_string()
    }

    fn healthy_node(&self, node_id: &str) -> Result<String, RouteError> {
        let entry = self
            .registry
            .get_entry(node_id)
            .ok_or_else(|| RouteError::UnknownNode(node_id.to_string()))?;
        if !entry.status.is_routable() {
            return Err(RouteError::UnhealthyNode {
                node_id: entry.id,
                status: entry.status,
            });
        }
        Ok(entry.address)
    }

    fn creation_target(&self, path: &str, body: &[u8]) -> String {
        let Some(node_id) = body_node_id(body) else {
            return self.primary();
        };
        match self.registry.get(&node_id) {
            Some(address) => address,
            None => {
                tracing::debug!(%node_id, path, "Creation target unavailable, using primary");
                self.primary()
            }
        }
    }
}

fn is_primary_only(method: &Method, path: &str) -> bool {
    if path.starts_with(AUTH_PREFIX) || path == HEALTH_PATH {
        return true;
    }
    if !is_under(path, "/api") {
        return true;
    }
    if PRIMARY_PREFIXES.iter().any(|p| is_under(path, p)) {
        return true;
    }
    method == Method::GET && PRIMARY_LISTS.contains(&path)
}

/// First non-empty, percent-decoded value of `name` in a raw query string.
/// An unparseable query counts as absent.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let uri = Uri::builder()
        .path_and_query(format!("/?{}", query?))
        .build()
        .ok()?;
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&uri).ok()?;
    pairs
        .into_iter()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// `node_id` from a JSON object body. Malformed JSON counts as absent.
fn body_node_id(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get(NODE_ID_PARAM)?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
