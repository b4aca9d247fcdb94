#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use shipyard_api::config::NodeConfig;
use shipyard_api::state::AppState;
use shipyard_core::node::RegisterNode;
use shipyard_core::trust::GATEWAY_SECRET_HEADER;
use shipyard_db::store::{MemoryJobStore, MemoryNodeStore, NodeStore};

pub const SECRET: &str = "test-gateway-secret";

pub fn config(node_id: &str, is_primary: bool) -> NodeConfig {
    NodeConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: "postgres://unused".into(),
        node_id: node_id.into(),
        node_name: node_id.into(),
        node_address: format!("http://{node_id}:3000"),
        is_primary,
        primary_url: (!is_primary).then(|| "http://main:3000".to_string()),
        gateway_secret: SECRET.into(),
        job_poll_interval: Duration::from_millis(10),
        job_stale_after: Duration::from_secs(60),
        job_shutdown_timeout: Duration::from_secs(1),
        job_retention_keep: 20,
        node_health_interval: Duration::from_secs(30),
        node_unreachable_after: 3,
        apps_dir: PathBuf::from("/tmp/shipyard-test-apps"),
        tunnel_api: None,
    }
}

/// A node backend over in-memory stores.
pub struct TestNode {
    pub jobs: Arc<MemoryJobStore>,
    pub nodes: Arc<MemoryNodeStore>,
    pub state: AppState,
}

impl TestNode {
    /// A primary that has already recorded itself, as the binary does.
    pub async fn primary() -> Self {
        let node = Self::build(config("main", true));
        node.nodes
            .upsert(
                &RegisterNode {
                    id: "main".into(),
                    name: "main".into(),
                    address: "http://main:3000".into(),
                    is_primary: true,
                },
                SECRET,
            )
            .await
            .unwrap();
        node
    }

    pub fn secondary(node_id: &str) -> Self {
        Self::build(config(node_id, false))
    }

    fn build(config: NodeConfig) -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let nodes = Arc::new(MemoryNodeStore::new());
        let state = AppState {
            config: Arc::new(config),
            jobs: jobs.clone(),
            nodes: nodes.clone(),
        };
        Self { jobs, nodes, state }
    }

    pub fn app(&self) -> Router {
        shipyard_api::app(self.state.clone())
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn get(uri: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(secret) = secret {
        builder = builder.header(GATEWAY_SECRET_HEADER, secret);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(GATEWAY_SECRET_HEADER, secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
