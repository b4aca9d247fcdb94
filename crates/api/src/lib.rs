//! Per-node backend.
//!
//! Every node runs this binary. It serves the node and job endpoints, runs
//! one job [`Worker`](shipyard_jobs::Worker) against the shared database and,
//! depending on its role, either monitors secondary health (primary) or
//! registers itself with the primary (secondary).

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod runtime;
pub mod state;

use std::sync::Arc;

use axum::Router;
use shipyard_core::job::JobType;
use shipyard_jobs::handlers::{
    AppDeployHandler, AppRuntime, QuickTunnelHandler, TunnelCreateHandler, TunnelDeleteHandler,
    TunnelProvider,
};
use shipyard_jobs::HandlerRegistry;

use state::AppState;

/// Node routes under `/api`, without middleware layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .with_state(state)
}

/// Registry with a handler for every built-in job type.
pub fn handler_registry(
    runtime: Arc<dyn AppRuntime>,
    tunnels: Arc<dyn TunnelProvider>,
) -> HandlerRegistry {
    let deploy = Arc::new(AppDeployHandler::new(runtime));
    let mut registry = HandlerRegistry::new();
    registry
        .register(JobType::AppCreate, deploy.clone())
        .register(JobType::AppUpdate, deploy)
        .register(JobType::TunnelCreate, Arc::new(TunnelCreateHandler::new(tunnels.clone())))
        .register(JobType::TunnelDelete, Arc::new(TunnelDeleteHandler::new(tunnels.clone())))
        .register(JobType::QuickTunnel, Arc::new(QuickTunnelHandler::new(tunnels)));
    registry
}
