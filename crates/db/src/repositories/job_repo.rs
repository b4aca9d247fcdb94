//! Repository for the `jobs` table.
//!
//! Every write that changes `status` or `progress` is conditional on the
//! row's current status, so a stale writer (a handler finishing after its
//! job was force-failed, a second claimant) can never move a job backward
//! or out of a terminal state. Callers inspect the returned row count.

use shipyard_core::job::{JobStatus, NewJob, PROGRESS_MAX};
use shipyard_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::job::JobRow;
use crate::store::MAX_LIST_LIMIT;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, app_id, payload, status, progress, message, error_message, \
    claimed_by, claimed_at, completed_at, created_at, updated_at";

/// Provides the job persistence primitives used by the engine.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job.
    ///
    /// Fails with a `23505` unique violation on `uq_jobs_active_app` when
    /// the app already has a pending or running job.
    pub async fn submit(pool: &PgPool, input: &NewJob) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_type, app_id, payload, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(input.job_type.as_str())
            .bind(input.app_id)
            .bind(&input.payload)
            .bind(JobStatus::Pending.as_str())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest pending job.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` inside a single `UPDATE` so
    /// two claimants (including two processes racing after a restart)
    /// never receive the same job.
    pub async fn claim_next(pool: &PgPool, claimant: &str) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $1, claimed_by = $2, claimed_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = $3 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(claimant)
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Claim one specific job if it is still pending.
    pub async fn claim(
        pool: &PgPool,
        job_id: DbId,
        claimant: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, claimed_by = $3, claimed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(JobStatus::Running.as_str())
            .bind(claimant)
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Record progress on a running job. Progress never decreases.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        progress: i16,
        message: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET progress = GREATEST(progress, $2), message = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(job_id)
        .bind(progress.clamp(0, PROGRESS_MAX))
        .bind(message)
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark a running job completed. `warning` records a best-effort
    /// sub-step that failed without failing the job.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        message: &str,
        warning: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = $2, progress = $3, message = $4, error_message = $5, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $6",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.as_str())
        .bind(PROGRESS_MAX)
        .bind(message)
        .bind(warning)
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark a running job failed with an error message.
    ///
    /// No automatic retry is performed; a failed job must be resubmitted.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = $2, error_message = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Fail every running job claimed before `cutoff`. Returns their ids.
    pub async fn fail_stale(
        pool: &PgPool,
        cutoff: Timestamp,
        error: &str,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE jobs \
             SET status = $1, error_message = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE status = $3 AND claimed_at < $4 \
             RETURNING id",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .bind(JobStatus::Running.as_str())
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// Delete terminal jobs beyond the newest `keep_per_app` for each app.
    pub async fn trim_terminal(pool: &PgPool, keep_per_app: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE id IN ( \
                 SELECT id FROM ( \
                     SELECT id, ROW_NUMBER() OVER ( \
                         PARTITION BY app_id ORDER BY created_at DESC, id DESC \
                     ) AS rn \
                     FROM jobs \
                     WHERE status IN ($1, $2) \
                 ) ranked \
                 WHERE ranked.rn > $3 \
             )",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Failed.as_str())
        .bind(keep_per_app.max(0))
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List an app's jobs, newest first.
    pub async fn list_by_app(
        pool: &PgPool,
        app_id: DbId,
        limit: i64,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE app_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(app_id)
            .bind(limit.clamp(1, MAX_LIST_LIMIT))
            .fetch_all(pool)
            .await
    }
}
