//! Built-in handlers for the five job types, plus the collaborator traits
//! they drive. Concrete runtimes and tunnel providers live with the node
//! binary; tests substitute fakes.

use async_trait::async_trait;
use shipyard_core::job::AppDeployPayload;
use shipyard_core::types::DbId;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

pub mod app;
pub mod tunnel;

pub use app::AppDeployHandler;
pub use tunnel::{QuickTunnelHandler, TunnelCreateHandler, TunnelDeleteHandler};

/// Container runtime operations needed by the app handlers.
#[async_trait]
pub trait AppRuntime: Send + Sync {
    /// Materialise the app's project files (compose file, env file).
    async fn write_project(&self, app_id: DbId, spec: &AppDeployPayload) -> Result<(), JobError>;

    /// Fetch images referenced by the project.
    async fn pull(&self, app_id: DbId, cancel: &CancellationToken) -> Result<(), JobError>;

    /// Create or recreate the project's containers and start them.
    async fn up(&self, app_id: DbId, cancel: &CancellationToken) -> Result<(), JobError>;
}

/// A named tunnel created at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelInfo {
    pub id: String,
    pub name: String,
}

/// Tunnel provider operations needed by the tunnel handlers.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    async fn create_tunnel(&self, name: &str) -> Result<TunnelInfo, JobError>;

    /// Point `hostname` at `service_url` through the tunnel.
    async fn route_hostname(
        &self,
        tunnel_id: &str,
        hostname: &str,
        service_url: &str,
    ) -> Result<(), JobError>;

    async fn delete_tunnel(&self, tunnel_id: &str) -> Result<(), JobError>;

    /// Start an ephemeral tunnel to `service_url` and return its public URL.
    async fn start_quick_tunnel(
        &self,
        app_id: DbId,
        service_url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, JobError>;

    /// Tear down the app's quick tunnel. Returns whether one was running.
    fn stop_quick_tunnel(&self, app_id: DbId) -> bool;
}

/// Bail out between steps once the worker has given up on this job.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), JobError> {
    if cancel.is_cancelled() {
        Err(JobError::Cancelled)
    } else {
        Ok(())
    }
}
