//! Handlers for `/api/nodes`. Both require the gateway secret.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use shipyard_core::node::{NodeSummary, RegisterNode};

use crate::error::{AppError, AppResult};
use crate::middleware::gateway_trust::GatewayTrust;
use crate::state::AppState;

/// GET /api/nodes
///
/// Bare JSON array of `{id, address, is_primary, status}`, primary first.
pub async fn list_nodes(
    _trust: GatewayTrust,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<NodeSummary>>> {
    let nodes = state.nodes.list().await?;
    Ok(Json(nodes.iter().map(NodeSummary::from).collect()))
}

/// POST /api/nodes/register
///
/// Secondary self-registration. Only the primary accepts it; a node can
/// never register itself as primary.
pub async fn register_node(
    _trust: GatewayTrust,
    State(state): State<AppState>,
    Json(input): Json<RegisterNode>,
) -> AppResult<impl IntoResponse> {
    if !state.config.is_primary {
        return Err(AppError::BadRequest(
            "registration must be sent to the primary node".into(),
        ));
    }
    input.validate()?;
    if input.is_primary || input.id == state.config.node_id {
        return Err(AppError::BadRequest(format!(
            "node '{}' cannot register as the primary",
            input.id
        )));
    }

    let node = state.nodes.upsert(&input, &state.config.gateway_secret).await?;
    tracing::info!(node_id = %node.id, address = %node.address, "Node registered");

    Ok((StatusCode::OK, Json(NodeSummary::from(&node))))
}
