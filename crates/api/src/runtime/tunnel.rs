//! Tunnel provider: a Cloudflare-style HTTP API for named tunnels and a
//! `cloudflared` child process per app for quick tunnels.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use shipyard_core::types::DbId;
use shipyard_jobs::handlers::{TunnelInfo, TunnelProvider};
use shipyard_jobs::JobError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::config::TunnelApiConfig;

/// How long `cloudflared` gets to print its public URL.
pub const QUICK_TUNNEL_TIMEOUT: Duration = Duration::from_secs(30);

static QUICK_TUNNEL_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com").expect("valid quick tunnel regex")
});

/// Extract the public URL from one line of `cloudflared` output.
pub fn find_quick_tunnel_url(line: &str) -> Option<&str> {
    QUICK_TUNNEL_URL_RE.find(line).map(|m| m.as_str())
}

// ---------------------------------------------------------------------------
// Named tunnels
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedTunnel {
    id: String,
    name: String,
}

/// HTTP client for the provider's tunnel API.
pub struct TunnelApiClient {
    client: reqwest::Client,
    config: TunnelApiConfig,
}

impl TunnelApiClient {
    pub fn new(client: reqwest::Client, config: TunnelApiConfig) -> Self {
        Self { client, config }
    }

    fn tunnels_url(&self) -> String {
        format!(
            "{}/accounts/{}/cfd_tunnel",
            self.config.base_url, self.config.account_id
        )
    }

    /// Send `request` and unwrap the `{success, errors, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, JobError> {
        let response = request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| JobError::Tunnel(format!("{action}: {e}")))?;

        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| JobError::Tunnel(format!("{action}: HTTP {status}: {e}")))?;

        if status.is_success() && envelope.success {
            return Ok(envelope.result);
        }
        let detail = envelope
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        Err(JobError::Tunnel(format!("{action}: HTTP {status}: {detail}")))
    }

    pub async fn create(&self, name: &str) -> Result<TunnelInfo, JobError> {
        let request = self
            .client
            .post(self.tunnels_url())
            .json(&json!({ "name": name, "config_src": "cloudflare" }));
        let created: CreatedTunnel = self
            .call("create tunnel", request)
            .await?
            .ok_or_else(|| JobError::Tunnel("create tunnel: response had no result".into()))?;

        tracing::info!(tunnel_id = %created.id, name = %created.name, "Tunnel created");
        Ok(TunnelInfo {
            id: created.id,
            name: created.name,
        })
    }

    /// Replace the tunnel's ingress rules with a single hostname route.
    pub async fn route(
        &self,
        tunnel_id: &str,
        hostname: &str,
        service_url: &str,
    ) -> Result<(), JobError> {
        let body = json!({
            "config": {
                "ingress": [
                    { "hostname": hostname, "service": service_url },
                    { "service": "http_status:404" },
                ]
            }
        });
        let request = self
            .client
            .put(format!("{}/{tunnel_id}/configurations", self.tunnels_url()))
            .json(&body);
        self.call::<serde_json::Value>("route hostname", request)
            .await?;
        tracing::info!(%tunnel_id, %hostname, "Tunnel hostname routed");
        Ok(())
    }

    pub async fn delete(&self, tunnel_id: &str) -> Result<(), JobError> {
        let request = self
            .client
            .delete(format!("{}/{tunnel_id}", self.tunnels_url()));
        self.call::<serde_json::Value>("delete tunnel", request)
            .await?;
        tracing::info!(%tunnel_id, "Tunnel deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Quick tunnels
// ---------------------------------------------------------------------------

/// One `cloudflared` process per app. Replacing or dropping an entry kills
/// the old process.
pub struct QuickTunnels {
    binary: String,
    running: Mutex<HashMap<DbId, Child>>,
}

impl QuickTunnels {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start(
        &self,
        app_id: DbId,
        service_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        let mut child = Command::new(&self.binary)
            .args(["tunnel", "--no-autoupdate", "--url", service_url])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Tunnel(format!("failed to start {}: {e}", self.binary)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| JobError::Tunnel("quick tunnel output unavailable".into()))?;
        let mut lines = BufReader::new(stderr).lines();

        let scan = async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(url) = find_quick_tunnel_url(&line) {
                    return Some(url.to_string());
                }
            }
            None
        };

        let url = tokio::select! {
            found = tokio::time::timeout(QUICK_TUNNEL_TIMEOUT, scan) => match found {
                Ok(Some(url)) => url,
                Ok(None) => {
                    return Err(JobError::Tunnel(
                        "cloudflared exited before publishing a URL".into(),
                    ))
                }
                Err(_) => {
                    return Err(JobError::Tunnel(format!(
                        "no quick tunnel URL after {}s",
                        QUICK_TUNNEL_TIMEOUT.as_secs()
                    )))
                }
            },
            _ = cancel.cancelled() => return Err(JobError::Cancelled),
        };

        // Keep reading so cloudflared never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(app_id, %line, "cloudflared");
            }
        });

        if self.lock().insert(app_id, child).is_some() {
            tracing::info!(app_id, "Replaced previous quick tunnel");
        }
        tracing::info!(app_id, %url, "Quick tunnel started");
        Ok(url)
    }

    /// Stop the app's quick tunnel. Returns whether one was running.
    pub fn stop(&self, app_id: DbId) -> bool {
        let stopped = self.lock().remove(&app_id).is_some();
        if stopped {
            tracing::info!(app_id, "Quick tunnel stopped");
        }
        stopped
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DbId, Child>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// [`TunnelProvider`] backed by the HTTP API (when configured) and
/// `cloudflared` quick tunnels.
pub struct TunnelService {
    api: Option<TunnelApiClient>,
    quick: QuickTunnels,
}

impl TunnelService {
    pub fn new(api: Option<TunnelApiClient>, quick: QuickTunnels) -> Self {
        Self { api, quick }
    }

    fn api(&self) -> Result<&TunnelApiClient, JobError> {
        self.api
            .as_ref()
            .ok_or_else(|| JobError::Tunnel("tunnel API is not configured".into()))
    }
}

#[async_trait]
impl TunnelProvider for TunnelService {
    async fn create_tunnel(&self, name: &str) -> Result<TunnelInfo, JobError> {
        self.api()?.create(name).await
    }

    async fn route_hostname(
        &self,
        tunnel_id: &str,
        hostname: &str,
        service_url: &str,
    ) -> Result<(), JobError> {
        self.api()?.route(tunnel_id, hostname, service_url).await
    }

    async fn delete_tunnel(&self, tunnel_id: &str) -> Result<(), JobError> {
        self.api()?.delete(tunnel_id).await
    }

    async fn start_quick_tunnel(
        &self,
        app_id: DbId,
        service_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        self.quick.start(app_id, service_url, cancel).await
    }

    fn stop_quick_tunnel(&self, app_id: DbId) -> bool {
        self.quick.stop(app_id)
    }
}
