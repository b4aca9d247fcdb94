use std::sync::Arc;

use shipyard_db::store::{JobStore, NodeStore};

use crate::config::NodeConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; the stores are trait objects so tests can run the
/// same router over in-memory stores.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub jobs: Arc<dyn JobStore>,
    pub nodes: Arc<dyn NodeStore>,
}
