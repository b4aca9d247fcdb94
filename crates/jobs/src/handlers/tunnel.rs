//! `tunnel_create`, `tunnel_delete` and `quick_tunnel`.

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::job::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use super::{ensure_not_cancelled, TunnelProvider};
use crate::error::JobError;
use crate::handler::{HandlerOutcome, JobHandler};
use crate::progress::ProgressTracker;

fn unexpected(payload: &JobPayload) -> JobError {
    JobError::NoHandler(payload.job_type().to_string())
}

/// Creates a named tunnel, then routes the requested hostname through it.
///
/// Routing is a best-effort secondary step: once the tunnel exists the job
/// completes even if routing fails, with the failure kept as a warning.
pub struct TunnelCreateHandler {
    provider: Arc<dyn TunnelProvider>,
}

impl TunnelCreateHandler {
    pub fn new(provider: Arc<dyn TunnelProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobHandler for TunnelCreateHandler {
    async fn handle(
        &self,
        job: &Job,
        payload: JobPayload,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        let spec = match payload {
            JobPayload::TunnelCreate(spec) => spec,
            other => return Err(unexpected(&other)),
        };
        let name = spec
            .tunnel_name
            .clone()
            .unwrap_or_else(|| format!("shipyard-app-{}", job.app_id));

        progress.report(10, "Creating tunnel").await;
        let tunnel = self.provider.create_tunnel(&name).await?;
        ensure_not_cancelled(cancel)?;

        progress.report(50, "Routing hostname").await;
        let routed = self
            .provider
            .route_hostname(&tunnel.id, &spec.hostname, &spec.service_url)
            .await;

        let outcome = HandlerOutcome::done(format!(
            "Tunnel '{}' ({}) serving https://{}",
            tunnel.name, tunnel.id, spec.hostname
        ));
        match routed {
            Ok(()) => Ok(outcome),
            Err(e) => Ok(outcome.with_warning(format!(
                "tunnel {} was created but routing {} failed: {e}",
                tunnel.id, spec.hostname
            ))),
        }
    }
}

/// Deletes a named tunnel. The app's quick tunnel, if any, goes with it.
pub struct TunnelDeleteHandler {
    provider: Arc<dyn TunnelProvider>,
}

impl TunnelDeleteHandler {
    pub fn new(provider: Arc<dyn TunnelProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobHandler for TunnelDeleteHandler {
    async fn handle(
        &self,
        job: &Job,
        payload: JobPayload,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        let spec = match payload {
            JobPayload::TunnelDelete(spec) => spec,
            other => return Err(unexpected(&other)),
        };

        progress.report(10, "Stopping quick tunnel").await;
        let stopped_quick = self.provider.stop_quick_tunnel(job.app_id);
        ensure_not_cancelled(cancel)?;

        progress.report(50, "Deleting tunnel").await;
        self.provider.delete_tunnel(&spec.tunnel_id).await?;

        let message = if stopped_quick {
            format!("Tunnel {} deleted, quick tunnel stopped", spec.tunnel_id)
        } else {
            format!("Tunnel {} deleted", spec.tunnel_id)
        };
        Ok(HandlerOutcome::done(message))
    }
}

/// Starts a quick tunnel, replacing any the app already has.
pub struct QuickTunnelHandler {
    provider: Arc<dyn TunnelProvider>,
}

impl QuickTunnelHandler {
    pub fn new(provider: Arc<dyn TunnelProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobHandler for QuickTunnelHandler {
    async fn handle(
        &self,
        job: &Job,
        payload: JobPayload,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        let spec = match payload {
            JobPayload::QuickTunnel(spec) => spec,
            other => return Err(unexpected(&other)),
        };

        progress.report(10, "Stopping previous quick tunnel").await;
        if self.provider.stop_quick_tunnel(job.app_id) {
            tracing::info!(job_id = job.id, app_id = job.app_id, "Previous quick tunnel stopped");
        }
        ensure_not_cancelled(cancel)?;

        progress.report(50, "Starting quick tunnel").await;
        let url = self
            .provider
            .start_quick_tunnel(job.app_id, &spec.service_url, cancel)
            .await?;

        Ok(HandlerOutcome::done(format!("Quick tunnel available at {url}")))
    }
}
