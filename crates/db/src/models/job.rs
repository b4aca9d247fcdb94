//! `jobs` table row.

use shipyard_core::error::CoreError;
use shipyard_core::job::Job;
use shipyard_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `jobs` table. Status is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub job_type: String,
    pub app_id: DbId,
    pub payload: serde_json::Value,
    pub status: String,
    pub progress: i16,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            job_type: row.job_type,
            app_id: row.app_id,
            payload: row.payload,
            status: row.status.parse()?,
            progress: row.progress,
            message: row.message,
            error_message: row.error_message,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
