//! Per-job progress reporting.
//!
//! Handlers call [`ProgressTracker::report`] at externally meaningful
//! milestones. Values are clamped to `0..=100` and never go backwards within
//! one execution; a lower value is dropped with a debug log. A failed write
//! is logged and otherwise ignored: progress is advisory and must not fail
//! the job.

use std::sync::Arc;
use std::sync::atomic::{AtomicI16, Ordering};

use shipyard_core::job::PROGRESS_MAX;
use shipyard_core::types::DbId;
use shipyard_db::store::JobStore;

pub struct ProgressTracker {
    store: Arc<dyn JobStore>,
    job_id: DbId,
    last: AtomicI16,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn JobStore>, job_id: DbId, initial: i16) -> Self {
        Self {
            store,
            job_id,
            last: AtomicI16::new(initial.clamp(0, PROGRESS_MAX)),
        }
    }

    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    /// Last progress value accepted.
    pub fn current(&self) -> i16 {
        self.last.load(Ordering::Acquire)
    }

    /// Record `percent` with a short human-readable `message`.
    pub async fn report(&self, percent: i16, message: &str) {
        let percent = percent.clamp(0, PROGRESS_MAX);
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        if percent < previous {
            tracing::debug!(
                job_id = self.job_id,
                percent,
                previous,
                "Ignoring progress regression",
            );
            return;
        }

        match self.store.update_progress(self.job_id, percent, message).await {
            Ok(true) => {
                tracing::debug!(job_id = self.job_id, percent, message, "Job progress");
            }
            Ok(false) => {
                tracing::debug!(
                    job_id = self.job_id,
                    percent,
                    "Progress not recorded, job is no longer running",
                );
            }
            Err(e) => {
                tracing::warn!(job_id = self.job_id, error = %e, "Failed to record job progress");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shipyard_core::job::{JobType, NewJob};
    use shipyard_db::store::MemoryJobStore;

    use super::*;

    async fn running_job(store: &MemoryJobStore) -> DbId {
        let job = store
            .submit(&NewJob {
                job_type: JobType::TunnelDelete,
                app_id: 1,
                payload: json!({ "tunnel_id": "t-1" }),
            })
            .await
            .unwrap();
        store.claim_next("test").await.unwrap().unwrap();
        job.id
    }

    #[tokio::test]
    async fn regressions_are_dropped() {
        let store = Arc::new(MemoryJobStore::new());
        let job_id = running_job(&store).await;
        let tracker = ProgressTracker::new(store.clone(), job_id, 0);

        tracker.report(40, "halfway").await;
        tracker.report(10, "backwards").await;

        assert_eq!(tracker.current(), 40);
        let job = store.find_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.progress, 40);
        assert_eq!(job.message.as_deref(), Some("halfway"));
    }

    #[tokio::test]
    async fn values_are_clamped() {
        let store = Arc::new(MemoryJobStore::new());
        let job_id = running_job(&store).await;
        let tracker = ProgressTracker::new(store.clone(), job_id, 0);

        tracker.report(250, "overshoot").await;

        assert_eq!(tracker.current(), PROGRESS_MAX);
    }
}
