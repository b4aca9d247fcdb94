//! Single-flight job worker.
//!
//! Lifecycle:
//!
//! 1. [`Worker::run`] first fails every job left `running` past the
//!    staleness threshold (orphaned by a crashed process), exactly once.
//! 2. It then ticks every `poll_interval`. Each tick is a no-op while a job
//!    is active; otherwise it atomically claims one pending job and starts
//!    processing it on a separate task. A panicking handler fails its job.
//! 3. When the cancellation token fires, shutdown is immediate if idle.
//!    Otherwise the worker checks every `shutdown_poll` until the active job
//!    finishes, up to `shutdown_timeout`; on timeout it force-fails the job,
//!    signals the handler's own token, and returns.
//!
//! The store's conditional updates are the only mutual exclusion; the
//! worker holds no cross-process lock.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shipyard_core::types::DbId;
use shipyard_db::store::{JobStore, StoreError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::processor::Processor;
use crate::registry::HandlerRegistry;

/// Error message recorded on jobs failed by startup recovery.
pub const STALE_JOB_MESSAGE: &str =
    "Job was still running when the worker restarted; presumed orphaned by a crashed process";

/// Prefix of the error recorded when a handler panics.
pub const PANIC_MESSAGE_PREFIX: &str = "Job handler panicked";

/// Error message recorded on jobs force-failed at shutdown.
pub const SHUTDOWN_TIMEOUT_MESSAGE: &str =
    "Worker shut down before the job finished (shutdown timeout exceeded)";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SHUTDOWN_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Recorded as `claimed_by` on every job this worker claims.
    pub claimant_id: String,
    pub poll_interval: Duration,
    /// Running jobs claimed longer ago than this are failed at startup.
    pub stale_after: Duration,
    pub shutdown_timeout: Duration,
    /// How often shutdown re-checks whether the active job finished.
    pub shutdown_poll: Duration,
}

impl WorkerConfig {
    pub fn new(claimant_id: impl Into<String>) -> Self {
        Self {
            claimant_id: claimant_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            shutdown_poll: DEFAULT_SHUTDOWN_POLL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_shutdown_poll(mut self, poll: Duration) -> Self {
        self.shutdown_poll = poll;
        self
    }
}

/// How a [`Worker::run`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No job was active when shutdown began.
    Idle,
    /// The active job finished within the timeout.
    Drained,
    /// The active job was force-failed.
    TimedOut(DbId),
}

pub struct Worker {
    store: Arc<dyn JobStore>,
    processor: Arc<Processor>,
    config: WorkerConfig,
    active: Arc<Mutex<Option<DbId>>>,
    /// Handed to handlers; cancelled only when shutdown gives up waiting.
    handler_cancel: CancellationToken,
}

/// Clears the active slot when the processing task ends, including by panic.
struct ActiveSlot(Arc<Mutex<Option<DbId>>>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        *lock(&self.0) = None;
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn lock(slot: &Mutex<Option<DbId>>) -> MutexGuard<'_, Option<DbId>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Worker {
    pub fn new(store: Arc<dyn JobStore>, registry: HandlerRegistry, config: WorkerConfig) -> Self {
        let processor = Arc::new(Processor::new(Arc::clone(&store), registry));
        Self {
            store,
            processor,
            config,
            active: Arc::new(Mutex::new(None)),
            handler_cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Id of the job currently being processed, if any.
    pub fn active_job(&self) -> Option<DbId> {
        *lock(&self.active)
    }

    /// Fail every running job claimed longer ago than `stale_after`.
    pub async fn recover_stale(&self) -> Result<Vec<DbId>, StoreError> {
        let cutoff = chrono::Duration::from_std(self.config.stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let failed = self.store.fail_stale(cutoff, STALE_JOB_MESSAGE).await?;
        if failed.is_empty() {
            tracing::debug!("No stale jobs found");
        } else {
            tracing::warn!(count = failed.len(), job_ids = ?failed, "Failed stale jobs from a previous run");
        }
        Ok(failed)
    }

    /// One poll step: claim and start a job unless one is already active.
    ///
    /// Returns the id of the job started by this call.
    pub async fn poll_once(&self) -> Result<Option<DbId>, StoreError> {
        if self.active_job().is_some() {
            return Ok(None);
        }

        let Some(job) = self.store.claim_next(&self.config.claimant_id).await? else {
            return Ok(None);
        };

        let job_id = job.id;
        *lock(&self.active) = Some(job_id);
        tracing::info!(job_id, claimant = %self.config.claimant_id, "Job claimed");

        let slot = ActiveSlot(Arc::clone(&self.active));
        let processor = Arc::clone(&self.processor);
        let store = Arc::clone(&self.store);
        let cancel = self.handler_cancel.clone();
        tokio::spawn(async move {
            let _slot = slot;
            let processing = tokio::spawn(async move { processor.process(job, &cancel).await });
            if let Err(e) = processing.await {
                if e.is_panic() {
                    let message = format!("{PANIC_MESSAGE_PREFIX}: {}", panic_detail(e.into_panic()));
                    tracing::error!(job_id, error = %message, "Job handler panicked");
                    match store.fail(job_id, &message).await {
                        Ok(true) => {}
                        Ok(false) => tracing::info!(job_id, "Job was already terminal after panic"),
                        Err(e) => tracing::error!(job_id, error = %e, "Failed to mark panicked job failed"),
                    }
                }
            }
        });

        Ok(Some(job_id))
    }

    /// Run until `cancel` fires, then shut down gracefully.
    pub async fn run(&self, cancel: CancellationToken) -> ShutdownOutcome {
        if let Err(e) = self.recover_stale().await {
            tracing::error!(error = %e, "Stale job recovery failed");
        }

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            claimant = %self.config.claimant_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job worker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Job poll failed");
                    }
                }
            }
        }

        self.shutdown().await
    }

    async fn shutdown(&self) -> ShutdownOutcome {
        let Some(job_id) = self.active_job() else {
            tracing::info!("Job worker stopped (idle)");
            return ShutdownOutcome::Idle;
        };

        tracing::info!(
            job_id,
            timeout_secs = self.config.shutdown_timeout.as_secs(),
            "Waiting for active job before shutdown",
        );

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.config.shutdown_poll.min(remaining)).await;
            if self.active_job().is_none() {
                tracing::info!(job_id, "Active job finished, job worker stopped");
                return ShutdownOutcome::Drained;
            }
        }

        match self.store.fail(job_id, SHUTDOWN_TIMEOUT_MESSAGE).await {
            Ok(true) => tracing::warn!(job_id, "Shutdown timeout exceeded, job marked failed"),
            Ok(false) => tracing::info!(job_id, "Job reached a terminal state during shutdown"),
            Err(e) => tracing::error!(job_id, error = %e, "Failed to mark job failed at shutdown"),
        }
        self.handler_cancel.cancel();
        ShutdownOutcome::TimedOut(job_id)
    }
}
