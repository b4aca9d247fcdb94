//! In-memory stores.
//!
//! Intended for tests/dev. Every operation takes one mutex for its whole
//! duration, which gives claims the same all-or-nothing behaviour as the
//! single-statement Postgres update.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use shipyard_core::job::{Job, JobStatus, NewJob, PROGRESS_MAX};
use shipyard_core::node::{HealthUpdate, Node, NodeStatus, RegisterNode};
use shipyard_core::types::{DbId, Timestamp};

use super::{JobStore, NodeStore, StoreError, MAX_LIST_LIMIT};

#[derive(Debug, Default)]
struct JobTable {
    next_id: DbId,
    jobs: BTreeMap<DbId, Job>,
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    table: Mutex<JobTable>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job record verbatim, bypassing submission rules.
    ///
    /// Lets tests seed states that are otherwise only reachable through a
    /// crash (a job left `running` by a dead process) or a foreign writer
    /// (an unrecognised job type).
    pub fn insert(&self, job: Job) {
        let mut table = self.lock();
        table.next_id = table.next_id.max(job.id);
        table.jobs.insert(job.id, job);
    }

    /// Snapshot of every stored job, ordered by id.
    pub fn all(&self) -> Vec<Job> {
        self.lock().jobs.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim_locked(job: &mut Job, claimant: &str, now: Timestamp) {
        job.status = JobStatus::Running;
        job.claimed_by = Some(claimant.to_string());
        job.claimed_at = Some(now);
        job.updated_at = now;
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn submit(&self, input: &NewJob) -> Result<Job, StoreError> {
        let mut table = self.lock();
        let busy = table
            .jobs
            .values()
            .any(|j| j.app_id == input.app_id && !j.status.is_terminal());
        if busy {
            return Err(StoreError::Conflict(format!(
                "app {} already has a pending or running job",
                input.app_id
            )));
        }

        table.next_id += 1;
        let now = Utc::now();
        let job = Job {
            id: table.next_id,
            job_type: input.job_type.as_str().to_string(),
            app_id: input.app_id,
            payload: input.payload.clone(),
            status: JobStatus::Pending,
            progress: 0,
            message: None,
            error_message: None,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        table.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim_next(&self, claimant: &str) -> Result<Option<Job>, StoreError> {
        let mut table = self.lock();
        let next = table
            .jobs
            .values_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| (j.created_at, j.id));

        Ok(next.map(|job| {
            Self::claim_locked(job, claimant, Utc::now());
            job.clone()
        }))
    }

    async fn claim(&self, job_id: DbId, claimant: &str) -> Result<Option<Job>, StoreError> {
        let mut table = self.lock();
        match table.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                Self::claim_locked(job, claimant, Utc::now());
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_progress(
        &self,
        job_id: DbId,
        progress: i16,
        message: &str,
    ) -> Result<bool, StoreError> {
        let mut table = self.lock();
        match table.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Running => {
                job.progress = job.progress.max(progress.clamp(0, PROGRESS_MAX));
                job.message = Some(message.to_string());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        job_id: DbId,
        message: &str,
        warning: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut table = self.lock();
        match table.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Running => {
                let now = Utc::now();
                job.status = JobStatus::Completed;
                job.progress = PROGRESS_MAX;
                job.message = Some(message.to_string());
                job.error_message = warning.map(str::to_string);
                job.completed_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail(&self, job_id: DbId, error: &str) -> Result<bool, StoreError> {
        let mut table = self.lock();
        match table.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Running => {
                let now = Utc::now();
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.completed_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_stale(&self, cutoff: Timestamp, error: &str) -> Result<Vec<DbId>, StoreError> {
        let mut table = self.lock();
        let now = Utc::now();
        let mut failed = Vec::new();
        for job in table.jobs.values_mut() {
            let stale = job.status == JobStatus::Running
                && job.claimed_at.is_some_and(|claimed| claimed < cutoff);
            if stale {
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.completed_at = Some(now);
                job.updated_at = now;
                failed.push(job.id);
            }
        }
        Ok(failed)
    }

    async fn trim_terminal(&self, keep_per_app: i64) -> Result<u64, StoreError> {
        let keep = usize::try_from(keep_per_app.max(0)).unwrap_or(usize::MAX);
        let mut table = self.lock();

        let mut per_app: BTreeMap<DbId, Vec<(Timestamp, DbId)>> = BTreeMap::new();
        for job in table.jobs.values().filter(|j| j.status.is_terminal()) {
            per_app
                .entry(job.app_id)
                .or_default()
                .push((job.created_at, job.id));
        }

        let mut removed = 0;
        for mut jobs in per_app.into_values() {
            // Newest first; everything past `keep` goes.
            jobs.sort_unstable_by(|a, b| b.cmp(a));
            for (_, id) in jobs.into_iter().skip(keep) {
                table.jobs.remove(&id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn find_by_id(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.lock().jobs.get(&job_id).cloned())
    }

    async fn list_by_app(&self, app_id: DbId, limit: i64) -> Result<Vec<Job>, StoreError> {
        let limit = usize::try_from(limit.clamp(1, MAX_LIST_LIMIT)).unwrap_or(usize::MAX);
        let mut jobs: Vec<Job> = self
            .lock()
            .jobs
            .values()
            .filter(|j| j.app_id == app_id)
            .cloned()
            .collect();
        jobs.sort_unstable_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn upsert(&self, input: &RegisterNode, secret: &str) -> Result<Node, StoreError> {
        let mut nodes = self.lock();
        let other_primary = nodes.values().any(|n| n.is_primary && n.id != input.id);
        if input.is_primary && other_primary {
            return Err(StoreError::Conflict(format!(
                "another node is already primary (registering {})",
                input.id
            )));
        }

        let now = Utc::now();
        let node = nodes
            .entry(input.id.clone())
            .and_modify(|n| {
                n.name = input.name.clone();
                n.address = input.address.clone();
                n.secret = secret.to_string();
                n.is_primary = input.is_primary;
                n.updated_at = now;
            })
            .or_insert_with(|| Node {
                id: input.id.clone(),
                name: input.name.clone(),
                address: input.address.clone(),
                secret: secret.to_string(),
                is_primary: input.is_primary,
                status: NodeStatus::Online,
                consecutive_failures: 0,
                created_at: now,
                updated_at: now,
            });
        Ok(node.clone())
    }

    async fn list(&self) -> Result<Vec<Node>, StoreError> {
        let mut nodes: Vec<Node> = self.lock().values().cloned().collect();
        nodes.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(nodes)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn record_health(&self, id: &str, update: HealthUpdate) -> Result<bool, StoreError> {
        let mut nodes = self.lock();
        match nodes.get_mut(id) {
            Some(node) => {
                node.status = update.status;
                node.consecutive_failures = update.consecutive_failures;
                node.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
