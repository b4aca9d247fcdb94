//! Shared-secret extractor for node-management endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use shipyard_core::error::CoreError;
use shipyard_core::trust::{secret_matches, GATEWAY_SECRET_HEADER};

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the cluster's shared secret, i.e. came
/// from the gateway or a peer node.
///
/// ```ignore
/// async fn list_nodes(_trust: GatewayTrust, State(state): State<AppState>) -> ...
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GatewayTrust;

impl FromRequestParts<AppState> for GatewayTrust {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(GATEWAY_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized("Missing gateway secret".into()))
            })?;

        if !secret_matches(presented, &state.config.gateway_secret) {
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid gateway secret".into(),
            )));
        }
        Ok(GatewayTrust)
    }
}
