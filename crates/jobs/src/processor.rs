//! Runs one claimed job to a terminal state.

use std::sync::Arc;

use shipyard_core::job::{Job, JobPayload, JobStatus, JobType};
use shipyard_core::types::DbId;
use shipyard_db::store::JobStore;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::handler::{HandlerOutcome, JobHandler};
use crate::progress::ProgressTracker;
use crate::registry::HandlerRegistry;

/// Decodes a claimed job's payload, dispatches it to its handler and
/// records the outcome.
///
/// Every failure path (unknown type, missing handler, undecodable payload,
/// handler error) ends with the job marked failed; nothing here panics or
/// leaves a claim dangling.
pub struct Processor {
    store: Arc<dyn JobStore>,
    registry: HandlerRegistry,
}

impl Processor {
    pub fn new(store: Arc<dyn JobStore>, registry: HandlerRegistry) -> Self {
        Self { store, registry }
    }

    /// Process a job the caller has already claimed. Returns the terminal
    /// status this call wrote, or `None` if the job had already been moved
    /// to a terminal state by someone else (e.g. a shutdown force-fail).
    pub async fn process(&self, job: Job, cancel: &CancellationToken) -> Option<JobStatus> {
        let job_id = job.id;
        tracing::info!(
            job_id,
            app_id = job.app_id,
            job_type = %job.job_type,
            "Processing job",
        );

        let result = match self.resolve(&job) {
            Ok((handler, payload)) => {
                let progress = ProgressTracker::new(Arc::clone(&self.store), job_id, job.progress);
                handler.handle(&job, payload, &progress, cancel).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => self.finish(job_id, outcome).await,
            Err(e) => self.fail(job_id, &e).await,
        }
    }

    fn resolve(&self, job: &Job) -> Result<(Arc<dyn JobHandler>, JobPayload), JobError> {
        let job_type: JobType = job
            .kind()
            .map_err(|_| JobError::UnknownType(job.job_type.clone()))?;
        let handler = self
            .registry
            .get(job_type)
            .ok_or_else(|| JobError::NoHandler(job.job_type.clone()))?;
        let payload = JobPayload::decode(job_type, &job.payload).map_err(JobError::Payload)?;
        Ok((handler, payload))
    }

    async fn finish(&self, job_id: DbId, outcome: HandlerOutcome) -> Option<JobStatus> {
        let warning = outcome.warning_text();
        if let Some(w) = &warning {
            tracing::warn!(job_id, warning = %w, "Job completed with warnings");
        }

        match self
            .store
            .complete(job_id, &outcome.message, warning.as_deref())
            .await
        {
            Ok(true) => {
                tracing::info!(job_id, message = %outcome.message, "Job completed");
                Some(JobStatus::Completed)
            }
            Ok(false) => {
                tracing::warn!(job_id, "Job finished but was no longer running, result discarded");
                None
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to mark job completed");
                None
            }
        }
    }

    async fn fail(&self, job_id: DbId, err: &JobError) -> Option<JobStatus> {
        let message = err.to_string();
        tracing::error!(job_id, error = %message, "Job failed");

        match self.store.fail(job_id, &message).await {
            Ok(true) => Some(JobStatus::Failed),
            Ok(false) => {
                tracing::warn!(job_id, "Job failed but was no longer running");
                None
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to mark job failed");
                None
            }
        }
    }
}
