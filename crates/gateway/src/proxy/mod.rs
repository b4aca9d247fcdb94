//! The catch-all forwarding handler.
//!
//! Authenticates, resolves the target node, forwards the buffered request
//! and streams the upstream response back unchanged apart from hop-by-hop
//! headers. No retries: a failed upstream is reported to the caller.

pub mod headers;

use std::net::SocketAddr;

use axum::body::{self, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::Method;
use axum::response::Response;
use shipyard_core::paths::AUTH_LOGIN_PATH;

use crate::auth::bypasses_auth;
use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

/// Logs a client that disconnected before the upstream answered.
struct InFlight<'a> {
    method: &'a Method,
    path: &'a str,
    target: &'a str,
    answered: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.answered {
            tracing::debug!(
                method = %self.method,
                path = self.path,
                target = self.target,
                "Client cancelled proxied request",
            );
        }
    }
}

pub async fn forward(State(state): State<GatewayState>, req: Request) -> GatewayResult<Response> {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    if !bypasses_auth(&path) {
        state.auth.validate(&parts.headers).await?;
    }

    let limit = state.config.max_body_bytes;
    let body = body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<http_body_util::LengthLimitError>() {
            GatewayError::BodyTooLarge { limit }
        } else {
            GatewayError::BadBody(inner.to_string())
        }
    })?;

    let target = state
        .router
        .target(&method, &path, query.as_deref(), &body)?;

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let outbound = headers::outbound(&parts.headers, peer, &path, &state.config.gateway_secret);

    let url = match &query {
        Some(q) => format!("{target}{path}?{q}"),
        None => format!("{target}{path}"),
    };
    tracing::debug!(%method, %path, %target, "Proxying request");

    let mut in_flight = InFlight {
        method: &method,
        path: &path,
        target: &target,
        answered: false,
    };
    let sent = state
        .client
        .request(method.clone(), url)
        .headers(outbound.headers)
        .body(body)
        .send()
        .await;
    in_flight.answered = true;

    let upstream = sent.map_err(|e| {
        if e.is_timeout() {
            GatewayError::UpstreamTimeout {
                target: target.clone(),
            }
        } else {
            GatewayError::Upstream {
                target: target.clone(),
                source: e,
            }
        }
    })?;

    let mut response = relay(upstream);
    if path == AUTH_LOGIN_PATH {
        if let Some(cookie) = outbound.host.as_deref().and_then(headers::origin_host_cookie) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

/// Turn the upstream response into ours, streaming the body.
fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut upstream_headers = upstream.headers().clone();
    headers::strip_hop_by_hop(&mut upstream_headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = upstream_headers;
    response
}
