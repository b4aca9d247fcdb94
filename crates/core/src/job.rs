//! Job records, job types and their per-type payloads.
//!
//! A job is a long-running, node-local operation (container lifecycle
//! change or tunnel provisioning) executed asynchronously by the job
//! engine. The payload is stored opaquely and only decoded into a
//! [`JobPayload`] variant at dispatch time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Highest progress value a job can report.
pub const PROGRESS_MAX: i16 = 100;

// ---------------------------------------------------------------------------
// Job type
// ---------------------------------------------------------------------------

/// The kind of work a job performs. Keys the handler dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    AppCreate,
    AppUpdate,
    TunnelCreate,
    TunnelDelete,
    QuickTunnel,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::AppCreate,
        JobType::AppUpdate,
        JobType::TunnelCreate,
        JobType::TunnelDelete,
        JobType::QuickTunnel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::AppCreate => "app_create",
            JobType::AppUpdate => "app_update",
            JobType::TunnelCreate => "tunnel_create",
            JobType::TunnelDelete => "tunnel_delete",
            JobType::QuickTunnel => "quick_tunnel",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown job type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// Transitions are monotone: `pending -> running -> {completed | failed}`.
/// Nothing ever leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge of the job state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// A persisted job.
///
/// `job_type` is kept as the raw stored string so that a record written by
/// a newer or older build with an unrecognised type can still be loaded and
/// failed cleanly by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: DbId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub app_id: DbId,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub progress: i16,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Parse the stored type string.
    pub fn kind(&self) -> Result<JobType, CoreError> {
        self.job_type.parse()
    }
}

/// Input for creating a pending job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub app_id: DbId,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewJob {
    /// Reject payloads that would fail to decode at dispatch time.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.app_id <= 0 {
            return Err(CoreError::Validation("app_id must be positive".into()));
        }
        JobPayload::decode(self.job_type, &self.payload).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Payload for `app_create` and `app_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDeployPayload {
    /// Compose project name.
    pub name: String,
    /// Raw compose file contents.
    pub compose: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AppDeployPayload {
    /// Env entries must each fit on one `KEY=value` line of a `.env` file.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (key, value) in &self.env {
            let bad_key = key.is_empty()
                || key.contains('=')
                || key.chars().any(|c| c.is_whitespace() || c.is_control());
            if bad_key {
                return Err(CoreError::Validation(format!("invalid env var name {key:?}")));
            }
            if value.contains(['\n', '\r', '\0']) {
                return Err(CoreError::Validation(format!(
                    "env var {key} must not contain line breaks"
                )));
            }
        }
        Ok(())
    }
}

/// Payload for `tunnel_create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelCreatePayload {
    /// Public hostname the tunnel should answer on.
    pub hostname: String,
    /// Local service the tunnel forwards to, e.g. `http://localhost:8080`.
    pub service_url: String,
    #[serde(default)]
    pub tunnel_name: Option<String>,
}

/// Payload for `tunnel_delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelDeletePayload {
    pub tunnel_id: String,
}

/// Payload for `quick_tunnel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickTunnelPayload {
    pub service_url: String,
}

/// Decoded, type-specific job payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    AppCreate(AppDeployPayload),
    AppUpdate(AppDeployPayload),
    TunnelCreate(TunnelCreatePayload),
    TunnelDelete(TunnelDeletePayload),
    QuickTunnel(QuickTunnelPayload),
}

impl JobPayload {
    /// Decode the opaque stored payload into the variant for `job_type`.
    pub fn decode(job_type: JobType, raw: &serde_json::Value) -> Result<Self, CoreError> {
        fn parse<T: serde::de::DeserializeOwned>(
            job_type: JobType,
            raw: &serde_json::Value,
        ) -> Result<T, CoreError> {
            T::deserialize(raw).map_err(|e| {
                CoreError::Validation(format!("invalid {job_type} payload: {e}"))
            })
        }

        let payload = match job_type {
            JobType::AppCreate | JobType::AppUpdate => {
                let spec: AppDeployPayload = parse(job_type, raw)?;
                spec.validate()?;
                if job_type == JobType::AppCreate {
                    JobPayload::AppCreate(spec)
                } else {
                    JobPayload::AppUpdate(spec)
                }
            }
            JobType::TunnelCreate => JobPayload::TunnelCreate(parse(job_type, raw)?),
            JobType::TunnelDelete => JobPayload::TunnelDelete(parse(job_type, raw)?),
            JobType::QuickTunnel => JobPayload::QuickTunnel(parse(job_type, raw)?),
        };
        Ok(payload)
    }

    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::AppCreate(_) => JobType::AppCreate,
            JobPayload::AppUpdate(_) => JobType::AppUpdate,
            JobPayload::TunnelCreate(_) => JobType::TunnelCreate,
            JobPayload::TunnelDelete(_) => JobType::TunnelDelete,
            JobPayload::QuickTunnel(_) => JobType::QuickTunnel,
        }
    }
}
