//! Multi-node gateway.
//!
//! Sits in front of every node backend. A [`NodeRegistry`](registry::NodeRegistry)
//! caches the primary's node list, the [`RequestRouter`](router::RequestRouter)
//! picks the node for each request and the [`proxy`] forwards it.

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod state;

use axum::routing::get;
use axum::Router;
use shipyard_core::paths::HEALTH_PATH;

use state::GatewayState;

/// Gateway routes without middleware layers.
///
/// The health probe is answered locally (`get` also serves `HEAD`);
/// everything else falls through to the proxy.
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health::health_check))
        .fallback(proxy::forward)
        .with_state(state)
}
