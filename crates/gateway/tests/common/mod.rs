#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use shipyard_core::node::{NodeStatus, NodeSummary};
use shipyard_core::trust::GATEWAY_SECRET_HEADER;
use shipyard_gateway::auth::{AllowAll, AuthValidator};
use shipyard_gateway::config::GatewayConfig;
use shipyard_gateway::registry::NodeRegistry;
use shipyard_gateway::state::{upstream_client, GatewayState};

pub const SECRET: &str = "test-gateway-secret";

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
pub async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Upstream that describes every request it receives.
pub fn echo_router(name: &'static str) -> Router {
    Router::new()
        .route("/api/apps/7/go", get(|| async { Redirect::temporary("/api/apps/7") }))
        .fallback(echo)
        .with_state(name)
}

async fn echo(State(name): State<&'static str>, req: Request) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let headers: serde_json::Map<String, Value> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v.to_str().unwrap_or_default())))
        .collect();
    Json(json!({
        "node": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&bytes),
    }))
}

/// Node list served by the fake primary; tests may mutate it.
pub type NodeList = Arc<Mutex<Vec<NodeSummary>>>;

/// Fake primary: a secret-checked node list plus the echo fallback.
pub fn primary_router(nodes: NodeList) -> Router {
    let list = Router::new()
        .route(
            "/api/nodes",
            get(|State(nodes): State<NodeList>, headers: HeaderMap| async move {
                let presented = headers
                    .get(GATEWAY_SECRET_HEADER)
                    .and_then(|v| v.to_str().ok());
                if presented != Some(SECRET) {
                    return (StatusCode::UNAUTHORIZED, "bad secret").into_response();
                }
                Json(nodes.lock().unwrap().clone()).into_response()
            }),
        )
        .with_state(nodes);
    list.merge(echo_router("primary"))
}

pub fn summary(id: &str, address: &str, is_primary: bool, status: NodeStatus) -> NodeSummary {
    NodeSummary {
        id: id.into(),
        address: address.into(),
        is_primary,
        status,
    }
}

pub fn test_config(primary_url: &str) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        primary_url: primary_url.into(),
        gateway_secret: SECRET.into(),
        registry_refresh: Duration::from_millis(20),
        auth_enabled: false,
        jwt_secret: String::new(),
        max_body_bytes: 1024,
        upstream_timeout: Duration::from_secs(5),
    }
}

/// A primary, one online secondary, one offline node and one node that is
/// listed online but not listening.
pub struct Cluster {
    pub primary_url: String,
    pub secondary_url: String,
    pub nodes: NodeList,
    pub registry: Arc<NodeRegistry>,
    pub state: GatewayState,
}

impl Cluster {
    pub async fn start(auth: Arc<dyn AuthValidator>) -> Self {
        let secondary_url = spawn(echo_router("online-node")).await;
        let dead_url = closed_url().await;

        let nodes: NodeList = Arc::new(Mutex::new(vec![
            // The primary reports an address the gateway must not use.
            summary("main", "http://10.255.255.1:3000", true, NodeStatus::Online),
            summary("online-node", &secondary_url, false, NodeStatus::Online),
            summary("offline-node", &secondary_url, false, NodeStatus::Offline),
            summary("dead-node", &dead_url, false, NodeStatus::Online),
        ]));
        let primary_url = spawn(primary_router(Arc::clone(&nodes))).await;

        let config = test_config(&primary_url);
        let registry = Arc::new(NodeRegistry::new(
            reqwest::Client::new(),
            primary_url.clone(),
            SECRET,
            config.registry_refresh,
        ));
        let client = upstream_client(&config).unwrap();
        let state = GatewayState::new(config, Arc::clone(&registry), auth, client);

        Self {
            primary_url,
            secondary_url,
            nodes,
            registry,
            state,
        }
    }

    /// Cluster with a populated registry and auth disabled.
    pub async fn ready() -> Self {
        let cluster = Self::start(Arc::new(AllowAll)).await;
        cluster.registry.refresh().await.unwrap();
        cluster
    }

    pub fn app(&self) -> Router {
        shipyard_gateway::app(self.state.clone())
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}
