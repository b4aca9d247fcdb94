use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::auth::AuthError;
use crate::router::RouteError;

/// Errors the gateway answers itself instead of proxying.
///
/// Rendered as `{"error": ..., "code": ...}` like the node backend's errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    BadBody(String),

    /// The resolved node could not be reached.
    #[error("upstream {target} unreachable: {source}")]
    Upstream {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream {target} timed out")]
    UpstreamTimeout { target: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::Route(_) => (StatusCode::BAD_REQUEST, "ROUTE_UNRESOLVABLE"),
            GatewayError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            GatewayError::BodyTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            GatewayError::BadBody(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            GatewayError::Upstream { target, source } => {
                tracing::error!(%target, error = %source, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, "BAD_GATEWAY")
            }
            GatewayError::UpstreamTimeout { target } => {
                tracing::warn!(%target, "Upstream request timed out");
                (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT")
            }
        };

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
