use std::time::Duration;

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Statically configured primary base URL, without trailing slash.
    pub primary_url: String,
    /// Shared secret for node-management requests.
    pub gateway_secret: String,
    pub registry_refresh: Duration,
    pub auth_enabled: bool,
    /// HS256 key for session tokens. Empty when auth is disabled.
    pub jwt_secret: String,
    /// Largest request body the proxy will buffer.
    pub max_body_bytes: usize,
    pub upstream_timeout: Duration,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                 | Default      |
    /// |-------------------------|--------------|
    /// | `HOST`                  | `0.0.0.0`    |
    /// | `PORT`                  | `8080`       |
    /// | `PRIMARY_URL`           | **required** |
    /// | `GATEWAY_SECRET`        | **required** |
    /// | `REGISTRY_REFRESH_SECS` | `15`         |
    /// | `AUTH_ENABLED`          | `true`       |
    /// | `JWT_SECRET`            | required when auth is enabled |
    /// | `MAX_BODY_BYTES`        | `10485760`   |
    /// | `UPSTREAM_TIMEOUT_SECS` | `300`        |
    ///
    /// # Panics
    ///
    /// Panics on missing required variables or unparseable values.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let primary_url = std::env::var("PRIMARY_URL").expect("PRIMARY_URL must be set");
        let primary_url = primary_url.trim_end_matches('/').to_string();
        assert!(
            primary_url.starts_with("http://") || primary_url.starts_with("https://"),
            "PRIMARY_URL must be an http(s) URL"
        );

        let gateway_secret = std::env::var("GATEWAY_SECRET").expect("GATEWAY_SECRET must be set");
        assert!(!gateway_secret.is_empty(), "GATEWAY_SECRET must not be empty");

        let refresh_secs: u64 = std::env::var("REGISTRY_REFRESH_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .expect("REGISTRY_REFRESH_SECS must be a valid u64");

        let auth_enabled: bool = std::env::var("AUTH_ENABLED")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("AUTH_ENABLED must be true or false");

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if auth_enabled {
            assert!(!jwt_secret.is_empty(), "JWT_SECRET must be set when AUTH_ENABLED=true");
        }

        let max_body_bytes: usize = std::env::var("MAX_BODY_BYTES")
            .unwrap_or_else(|_| "10485760".into())
            .parse()
            .expect("MAX_BODY_BYTES must be a valid usize");

        let upstream_timeout_secs: u64 = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("UPSTREAM_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            primary_url,
            gateway_secret,
            registry_refresh: Duration::from_secs(refresh_secs.max(1)),
            auth_enabled,
            jwt_secret,
            max_body_bytes,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
        }
    }
}
