//! Postgres-backed stores delegating to the repositories.

use async_trait::async_trait;
use shipyard_core::job::{Job, NewJob};
use shipyard_core::node::{HealthUpdate, Node, RegisterNode};
use shipyard_core::types::{DbId, Timestamp};

use super::{JobStore, NodeStore, StoreError};
use crate::repositories::{JobRepo, NodeRepo};
use crate::DbPool;

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Map a unique violation into [`StoreError::Conflict`].
fn classify(err: sqlx::Error, conflict_message: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(conflict_message());
        }
    }
    StoreError::Database(err)
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn submit(&self, input: &NewJob) -> Result<Job, StoreError> {
        let row = JobRepo::submit(&self.pool, input).await.map_err(|e| {
            classify(e, || {
                format!("app {} already has a pending or running job", input.app_id)
            })
        })?;
        Ok(row.try_into()?)
    }

    async fn claim_next(&self, claimant: &str) -> Result<Option<Job>, StoreError> {
        let row = JobRepo::claim_next(&self.pool, claimant).await?;
        Ok(row.map(Job::try_from).transpose()?)
    }

    async fn claim(&self, job_id: DbId, claimant: &str) -> Result<Option<Job>, StoreError> {
        let row = JobRepo::claim(&self.pool, job_id, claimant).await?;
        Ok(row.map(Job::try_from).transpose()?)
    }

    async fn update_progress(
        &self,
        job_id: DbId,
        progress: i16,
        message: &str,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::update_progress(&self.pool, job_id, progress, message).await? > 0)
    }

    async fn complete(
        &self,
        job_id: DbId,
        message: &str,
        warning: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::complete(&self.pool, job_id, message, warning).await? > 0)
    }

    async fn fail(&self, job_id: DbId, error: &str) -> Result<bool, StoreError> {
        Ok(JobRepo::fail(&self.pool, job_id, error).await? > 0)
    }

    async fn fail_stale(&self, cutoff: Timestamp, error: &str) -> Result<Vec<DbId>, StoreError> {
        Ok(JobRepo::fail_stale(&self.pool, cutoff, error).await?)
    }

    async fn trim_terminal(&self, keep_per_app: i64) -> Result<u64, StoreError> {
        Ok(JobRepo::trim_terminal(&self.pool, keep_per_app).await?)
    }

    async fn find_by_id(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        let row = JobRepo::find_by_id(&self.pool, job_id).await?;
        Ok(row.map(Job::try_from).transpose()?)
    }

    async fn list_by_app(&self, app_id: DbId, limit: i64) -> Result<Vec<Job>, StoreError> {
        JobRepo::list_by_app(&self.pool, app_id, limit)
            .await?
            .into_iter()
            .map(|row| Job::try_from(row).map_err(StoreError::from))
            .collect()
    }
}

#[derive(Clone)]
pub struct PgNodeStore {
    pool: DbPool,
}

impl PgNodeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NodeStore for PgNodeStore {
    async fn upsert(&self, input: &RegisterNode, secret: &str) -> Result<Node, StoreError> {
        let row = NodeRepo::upsert(&self.pool, input, secret).await.map_err(|e| {
            classify(e, || format!("another node is already primary (registering {})", input.id))
        })?;
        Ok(row.try_into()?)
    }

    async fn list(&self) -> Result<Vec<Node>, StoreError> {
        NodeRepo::list(&self.pool)
            .await?
            .into_iter()
            .map(|row| Node::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Node>, StoreError> {
        let row = NodeRepo::find_by_id(&self.pool, id).await?;
        Ok(row.map(Node::try_from).transpose()?)
    }

    async fn record_health(&self, id: &str, update: HealthUpdate) -> Result<bool, StoreError> {
        let affected =
            NodeRepo::record_health(&self.pool, id, update.status, update.consecutive_failures)
                .await?;
        Ok(affected > 0)
    }
}
