use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::GatewayState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// `GET|HEAD /api/health`, answered by the gateway itself.
///
/// Reports `initializing` (503) until the node registry has completed one
/// successful refresh.
pub async fn health_check(State(state): State<GatewayState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = if state.registry.is_initialized() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "initializing")
    };
    (
        code,
        Json(HealthResponse {
            status,
            service: "gateway",
        }),
    )
}
