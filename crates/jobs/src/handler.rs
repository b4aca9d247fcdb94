//! The dispatch contract every job type implements.

use async_trait::async_trait;
use shipyard_core::job::{Job, JobPayload};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::progress::ProgressTracker;

/// Successful result of a handler.
///
/// `warnings` carries best-effort sub-steps that failed without defeating
/// the job's primary objective. They are persisted in the completed job's
/// `error_message` so the detail is not lost to the logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub message: String,
    pub warnings: Vec<String>,
}

impl HandlerOutcome {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Warnings joined for storage, or `None` if there were none.
    pub fn warning_text(&self) -> Option<String> {
        if self.warnings.is_empty() {
            None
        } else {
            Some(format!("warning: {}", self.warnings.join("; ")))
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one claimed job.
    ///
    /// `payload` is already decoded into the variant matching the job's
    /// type. `cancel` fires only when the worker gives up waiting for this
    /// job during shutdown; long blocking calls should select on it.
    async fn handle(
        &self,
        job: &Job,
        payload: JobPayload,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError>;
}
