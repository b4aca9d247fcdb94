//! `app_create` / `app_update`.

use std::sync::Arc;

use async_trait::async_trait;
use shipyard_core::job::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use super::{ensure_not_cancelled, AppRuntime};
use crate::error::JobError;
use crate::handler::{HandlerOutcome, JobHandler};
use crate::progress::ProgressTracker;

/// Deploys an app's compose project. The same steps serve creation and
/// update; `docker compose up` converges either way.
pub struct AppDeployHandler {
    runtime: Arc<dyn AppRuntime>,
}

impl AppDeployHandler {
    pub fn new(runtime: Arc<dyn AppRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl JobHandler for AppDeployHandler {
    async fn handle(
        &self,
        job: &Job,
        payload: JobPayload,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        let (spec, verb) = match payload {
            JobPayload::AppCreate(spec) => (spec, "created"),
            JobPayload::AppUpdate(spec) => (spec, "updated"),
            other => {
                return Err(JobError::NoHandler(other.job_type().to_string()));
            }
        };

        progress.report(10, "Writing compose project").await;
        self.runtime.write_project(job.app_id, &spec).await?;
        ensure_not_cancelled(cancel)?;

        progress.report(40, "Pulling images").await;
        self.runtime.pull(job.app_id, cancel).await?;
        ensure_not_cancelled(cancel)?;

        progress.report(80, "Starting containers").await;
        self.runtime.up(job.app_id, cancel).await?;

        Ok(HandlerOutcome::done(format!("App '{}' {verb} and running", spec.name)))
    }
}
