//! Pluggable request authentication.

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use shipyard_core::paths::{AUTH_ME_PATH, AUTH_PREFIX, HEALTH_PATH};
use shipyard_core::trust::SESSION_COOKIE;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing session credentials")]
    MissingCredentials,

    #[error("invalid session token: {0}")]
    InvalidToken(String),
}

/// Decides whether a request may pass the gateway.
#[async_trait]
pub trait AuthValidator: Send + Sync {
    async fn validate(&self, headers: &HeaderMap) -> Result<(), AuthError>;
}

/// Paths reachable without credentials: the session endpoints, the health
/// probe and the "who am I" lookup. Non-API paths (the SPA shell and its
/// assets) are public too so a signed-out browser can render the login page.
pub fn bypasses_auth(path: &str) -> bool {
    path.starts_with(AUTH_PREFIX)
        || path == HEALTH_PATH
        || path == AUTH_ME_PATH
        || !(path == "/api" || path.starts_with("/api/"))
}

/// Accepts every request. Used when `AUTH_ENABLED=false`.
pub struct AllowAll;

#[async_trait]
impl AuthValidator for AllowAll {
    async fn validate(&self, _headers: &HeaderMap) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Claims the gateway needs from a session token.
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// Validates HS256 session tokens from `Authorization: Bearer` or the
/// session cookie.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(), // HS256, validates exp
        }
    }

    pub fn claims(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

#[async_trait]
impl AuthValidator for JwtValidator {
    async fn validate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let token = bearer_token(headers)
            .or_else(|| cookie_value(headers, SESSION_COOKIE))
            .ok_or(AuthError::MissingCredentials)?;
        let claims = self.claims(&token)?;
        tracing::trace!(sub = %claims.sub, "Session token accepted");
        Ok(())
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
