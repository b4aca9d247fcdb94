//! Store traits: the persistence contract consumed by the job engine and
//! the node backend.
//!
//! Two implementations exist with the same semantics: [`postgres`] (the
//! production store, backed by the repositories) and [`memory`] (a
//! mutex-guarded map for tests and single-process development).
//!
//! Transition methods return `bool`: `true` when the write applied, `false`
//! when the job was not in the state the transition requires. A `false`
//! is not an error; it means some other party already moved the job on.

use async_trait::async_trait;
use shipyard_core::error::CoreError;
use shipyard_core::job::{Job, NewJob};
use shipyard_core::node::{HealthUpdate, Node, RegisterNode};
use shipyard_core::types::{DbId, Timestamp};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryJobStore, MemoryNodeStore};
pub use postgres::{PgJobStore, PgNodeStore};

/// Largest page `list_by_app` returns.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Errors surfaced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated (e.g. the app already has an active job).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored record could not be converted into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(#[from] CoreError),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a pending job. Fails with [`StoreError::Conflict`] if the
    /// app already has a pending or running job.
    async fn submit(&self, input: &NewJob) -> Result<Job, StoreError>;

    /// Atomically claim the oldest pending job for `claimant`.
    async fn claim_next(&self, claimant: &str) -> Result<Option<Job>, StoreError>;

    /// Atomically claim `job_id` if it is still pending.
    async fn claim(&self, job_id: DbId, claimant: &str) -> Result<Option<Job>, StoreError>;

    /// Raise progress on a running job; lower values are ignored.
    async fn update_progress(
        &self,
        job_id: DbId,
        progress: i16,
        message: &str,
    ) -> Result<bool, StoreError>;

    /// `running -> completed`.
    async fn complete(
        &self,
        job_id: DbId,
        message: &str,
        warning: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// `running -> failed`.
    async fn fail(&self, job_id: DbId, error: &str) -> Result<bool, StoreError>;

    /// Fail every running job claimed before `cutoff`, returning their ids.
    async fn fail_stale(&self, cutoff: Timestamp, error: &str) -> Result<Vec<DbId>, StoreError>;

    /// Keep only the newest `keep_per_app` terminal jobs per app.
    async fn trim_terminal(&self, keep_per_app: i64) -> Result<u64, StoreError>;

    async fn find_by_id(&self, job_id: DbId) -> Result<Option<Job>, StoreError>;

    /// Newest first.
    async fn list_by_app(&self, app_id: DbId, limit: i64) -> Result<Vec<Job>, StoreError>;
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Create the node or refresh its identity fields.
    async fn upsert(&self, input: &RegisterNode, secret: &str) -> Result<Node, StoreError>;

    /// All nodes, primary first.
    async fn list(&self) -> Result<Vec<Node>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Node>, StoreError>;

    /// Persist the outcome of a health probe.
    async fn record_health(&self, id: &str, update: HealthUpdate) -> Result<bool, StoreError>;
}
