#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use shipyard_core::job::{AppDeployPayload, Job, JobPayload, JobStatus, JobType, NewJob};
use shipyard_core::types::DbId;
use shipyard_db::store::{JobStore, MemoryJobStore};
use shipyard_jobs::handlers::{AppRuntime, TunnelInfo, TunnelProvider};
use shipyard_jobs::{HandlerOutcome, JobError, JobHandler, ProgressTracker, WorkerConfig};
use tokio_util::sync::CancellationToken;

/// Worker config with intervals short enough for tests.
pub fn fast_config() -> WorkerConfig {
    WorkerConfig::new("test-worker")
        .with_poll_interval(Duration::from_millis(5))
        .with_shutdown_poll(Duration::from_millis(5))
        .with_shutdown_timeout(Duration::from_secs(2))
}

pub fn quick_tunnel_job(app_id: DbId) -> NewJob {
    NewJob {
        job_type: JobType::QuickTunnel,
        app_id,
        payload: json!({ "service_url": "http://localhost:8080" }),
    }
}

/// A job record as a crashed process or a foreign writer might leave it.
pub fn raw_job(id: DbId, job_type: &str, status: JobStatus) -> Job {
    let now = Utc::now();
    Job {
        id,
        job_type: job_type.to_string(),
        app_id: id,
        payload: json!({}),
        status,
        progress: 0,
        message: None,
        error_message: None,
        claimed_by: None,
        claimed_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn job(store: &MemoryJobStore, id: DbId) -> Job {
    store.find_by_id(id).await.unwrap().expect("job exists")
}

/// Poll `check` until it returns true, panicking after five seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Reports each step in order, pausing between them.
pub struct SteppedHandler {
    pub steps: Vec<i16>,
    pub pause: Duration,
}

#[async_trait]
impl JobHandler for SteppedHandler {
    async fn handle(
        &self,
        _job: &Job,
        _payload: JobPayload,
        progress: &ProgressTracker,
        _cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        for step in &self.steps {
            tokio::time::sleep(self.pause).await;
            progress.report(*step, &format!("step {step}")).await;
        }
        tokio::time::sleep(self.pause).await;
        Ok(HandlerOutcome::done("all steps done"))
    }
}

pub struct FailingHandler(pub &'static str);

#[async_trait]
impl JobHandler for FailingHandler {
    async fn handle(
        &self,
        _job: &Job,
        _payload: JobPayload,
        progress: &ProgressTracker,
        _cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        progress.report(30, "about to fail").await;
        Err(JobError::Runtime(self.0.to_string()))
    }
}

pub struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    async fn handle(
        &self,
        _job: &Job,
        _payload: JobPayload,
        progress: &ProgressTracker,
        _cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        progress.report(20, "starting").await;
        panic!("tunnel table corrupted");
    }
}

/// Blocks until the worker gives up on it.
pub struct StuckHandler;

#[async_trait]
impl JobHandler for StuckHandler {
    async fn handle(
        &self,
        _job: &Job,
        _payload: JobPayload,
        _progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, JobError> {
        cancel.cancelled().await;
        Err(JobError::Cancelled)
    }
}

/// Records runtime calls in order.
#[derive(Default)]
pub struct FakeRuntime {
    pub calls: Mutex<Vec<String>>,
    pub fail_up: bool,
}

impl FakeRuntime {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AppRuntime for FakeRuntime {
    async fn write_project(&self, app_id: DbId, spec: &AppDeployPayload) -> Result<(), JobError> {
        self.record(format!("write {app_id} {}", spec.name));
        Ok(())
    }

    async fn pull(&self, app_id: DbId, _cancel: &CancellationToken) -> Result<(), JobError> {
        self.record(format!("pull {app_id}"));
        Ok(())
    }

    async fn up(&self, app_id: DbId, _cancel: &CancellationToken) -> Result<(), JobError> {
        self.record(format!("up {app_id}"));
        if self.fail_up {
            return Err(JobError::Runtime("port 80 already allocated".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTunnels {
    pub fail_route: bool,
    pub fail_delete: bool,
    pub fail_quick: bool,
    pub deleted: Mutex<Vec<String>>,
    /// Apps with a quick tunnel up.
    pub quick: Mutex<Vec<DbId>>,
}

#[async_trait]
impl TunnelProvider for FakeTunnels {
    async fn create_tunnel(&self, name: &str) -> Result<TunnelInfo, JobError> {
        Ok(TunnelInfo {
            id: "tun-1".into(),
            name: name.to_string(),
        })
    }

    async fn route_hostname(
        &self,
        _tunnel_id: &str,
        hostname: &str,
        _service_url: &str,
    ) -> Result<(), JobError> {
        if self.fail_route {
            return Err(JobError::Tunnel(format!("DNS record for {hostname} already exists")));
        }
        Ok(())
    }

    async fn delete_tunnel(&self, tunnel_id: &str) -> Result<(), JobError> {
        if self.fail_delete {
            return Err(JobError::Tunnel(format!("tunnel {tunnel_id} has active connections")));
        }
        self.deleted.lock().unwrap().push(tunnel_id.to_string());
        Ok(())
    }

    async fn start_quick_tunnel(
        &self,
        app_id: DbId,
        _service_url: &str,
        _cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        if self.fail_quick {
            return Err(JobError::Tunnel("cloudflared exited before publishing a URL".into()));
        }
        self.quick.lock().unwrap().push(app_id);
        Ok("https://calm-river-1234.trycloudflare.com".into())
    }

    fn stop_quick_tunnel(&self, app_id: DbId) -> bool {
        let mut quick = self.quick.lock().unwrap();
        let before = quick.len();
        quick.retain(|id| *id != app_id);
        quick.len() != before
    }
}

pub fn shared(store: &Arc<MemoryJobStore>) -> Arc<dyn JobStore> {
    Arc::clone(store) as Arc<dyn JobStore>
}
