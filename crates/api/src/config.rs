use std::path::PathBuf;
use std::time::Duration;

use shipyard_core::node::DEFAULT_UNREACHABLE_AFTER;
use shipyard_jobs::retention::DEFAULT_KEEP_PER_APP;

/// Tunnel-provider API credentials. All three must be set to enable named
/// tunnels; quick tunnels work without them.
#[derive(Debug, Clone)]
pub struct TunnelApiConfig {
    pub base_url: String,
    pub token: String,
    pub account_id: String,
}

/// Node backend configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Postgres connection URL. Carries credentials; never log it.
    pub database_url: String,
    pub node_id: String,
    pub node_name: String,
    /// Address the primary and gateway reach this node at.
    pub node_address: String,
    pub is_primary: bool,
    /// Where a secondary self-registers. `None` on the primary.
    pub primary_url: Option<String>,
    pub gateway_secret: String,
    pub job_poll_interval: Duration,
    pub job_stale_after: Duration,
    pub job_shutdown_timeout: Duration,
    pub job_retention_keep: i64,
    pub node_health_interval: Duration,
    pub node_unreachable_after: i32,
    pub apps_dir: PathBuf,
    pub tunnel_api: Option<TunnelApiConfig>,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> T {
    var_or(name, default)
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>()))
}

impl NodeConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `HOST`                      | `0.0.0.0`                |
    /// | `PORT`                      | `3000`                   |
    /// | `DATABASE_URL`              | **required**             |
    /// | `NODE_ID`                   | **required**             |
    /// | `NODE_NAME`                 | value of `NODE_ID`       |
    /// | `NODE_ADDRESS`              | `http://localhost:3000`  |
    /// | `IS_PRIMARY`                | `false`                  |
    /// | `PRIMARY_URL`               | required on secondaries  |
    /// | `GATEWAY_SECRET`            | **required**             |
    /// | `JOB_POLL_INTERVAL_MS`      | `1000`                   |
    /// | `JOB_STALE_AFTER_SECS`      | `1800`                   |
    /// | `JOB_SHUTDOWN_TIMEOUT_SECS` | `30`                     |
    /// | `JOB_RETENTION_KEEP`        | `20`                     |
    /// | `NODE_HEALTH_INTERVAL_SECS` | `30`                     |
    /// | `NODE_UNREACHABLE_AFTER`    | `3`                      |
    /// | `APPS_DIR`                  | `./data/apps`            |
    /// | `TUNNEL_API_URL`, `TUNNEL_API_TOKEN`, `TUNNEL_ACCOUNT_ID` | unset |
    ///
    /// # Panics
    ///
    /// Panics on missing required variables or unparseable values.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let node_id = std::env::var("NODE_ID").expect("NODE_ID must be set");
        assert!(!node_id.trim().is_empty(), "NODE_ID must not be empty");
        let node_name = var_or("NODE_NAME", &node_id);

        let is_primary: bool = parse_var("IS_PRIMARY", "false");
        let primary_url = std::env::var("PRIMARY_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        if !is_primary {
            assert!(primary_url.is_some(), "PRIMARY_URL must be set on secondary nodes");
        }

        let gateway_secret = std::env::var("GATEWAY_SECRET").expect("GATEWAY_SECRET must be set");
        assert!(!gateway_secret.is_empty(), "GATEWAY_SECRET must not be empty");

        let tunnel_api = match (
            std::env::var("TUNNEL_API_URL"),
            std::env::var("TUNNEL_API_TOKEN"),
            std::env::var("TUNNEL_ACCOUNT_ID"),
        ) {
            (Ok(base_url), Ok(token), Ok(account_id)) => Some(TunnelApiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                token,
                account_id,
            }),
            _ => None,
        };

        Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_var("PORT", "3000"),
            database_url,
            node_id,
            node_name,
            node_address: var_or("NODE_ADDRESS", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            is_primary,
            primary_url: if is_primary { None } else { primary_url },
            gateway_secret,
            job_poll_interval: Duration::from_millis(parse_var("JOB_POLL_INTERVAL_MS", "1000")),
            job_stale_after: Duration::from_secs(parse_var("JOB_STALE_AFTER_SECS", "1800")),
            job_shutdown_timeout: Duration::from_secs(parse_var("JOB_SHUTDOWN_TIMEOUT_SECS", "30")),
            job_retention_keep: parse_var("JOB_RETENTION_KEEP", &DEFAULT_KEEP_PER_APP.to_string()),
            node_health_interval: Duration::from_secs(parse_var("NODE_HEALTH_INTERVAL_SECS", "30")),
            node_unreachable_after: parse_var(
                "NODE_UNREACHABLE_AFTER",
                &DEFAULT_UNREACHABLE_AFTER.to_string(),
            ),
            apps_dir: PathBuf::from(var_or("APPS_DIR", "./data/apps")),
            tunnel_api,
        }
    }
}
