//! Built-in handlers driven end-to-end through the processor, with fake
//! container runtime and tunnel provider.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use serde_json::json;
use shipyard_core::job::{JobStatus, JobType, NewJob};
use shipyard_db::store::{JobStore, MemoryJobStore};
use shipyard_jobs::handlers::{
    AppDeployHandler, QuickTunnelHandler, TunnelCreateHandler, TunnelDeleteHandler,
};
use shipyard_jobs::{HandlerRegistry, Processor};
use tokio_util::sync::CancellationToken;

async fn run_job(
    store: &Arc<MemoryJobStore>,
    registry: HandlerRegistry,
    new_job: NewJob,
) -> shipyard_core::job::Job {
    let submitted = store.submit(&new_job).await.unwrap();
    let claimed = store
        .claim(submitted.id, "test-worker")
        .await
        .unwrap()
        .expect("pending job is claimable");

    let processor = Processor::new(shared(store), registry);
    processor.process(claimed, &CancellationToken::new()).await;
    job(store, submitted.id).await
}

fn deploy_job(job_type: JobType, app_id: i64) -> NewJob {
    NewJob {
        job_type,
        app_id,
        payload: json!({
            "name": "blog",
            "compose": "services:\n  web:\n    image: nginx\n",
            "env": { "PORT": "80" }
        }),
    }
}

// ---------------------------------------------------------------------------
// App deploy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn app_create_runs_runtime_steps_in_order() {
    let store = Arc::new(MemoryJobStore::new());
    let runtime = Arc::new(FakeRuntime::default());
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::AppCreate, Arc::new(AppDeployHandler::new(runtime.clone())));

    let done = run_job(&store, registry, deploy_job(JobType::AppCreate, 7)).await;

    assert_eq!(runtime.calls(), vec!["write 7 blog", "pull 7", "up 7"]);
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.message.as_deref(), Some("App 'blog' created and running"));
    assert_eq!(done.error_message, None);
}

#[tokio::test]
async fn app_update_failure_keeps_last_milestone() {
    let store = Arc::new(MemoryJobStore::new());
    let runtime = Arc::new(FakeRuntime {
        fail_up: true,
        ..Default::default()
    });
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::AppUpdate, Arc::new(AppDeployHandler::new(runtime.clone())));

    let failed = run_job(&store, registry, deploy_job(JobType::AppUpdate, 7)).await;

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress, 80);
    assert_eq!(failed.message.as_deref(), Some("Starting containers"));
    assert_eq!(
        failed.error_message.as_deref(),
        Some("container runtime: port 80 already allocated")
    );
}

#[tokio::test]
async fn cancelled_deploy_stops_between_steps() {
    let store = Arc::new(MemoryJobStore::new());
    let runtime = Arc::new(FakeRuntime::default());
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::AppCreate, Arc::new(AppDeployHandler::new(runtime.clone())));

    let submitted = store.submit(&deploy_job(JobType::AppCreate, 3)).await.unwrap();
    let claimed = store.claim(submitted.id, "w").await.unwrap().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let status = Processor::new(shared(&store), registry)
        .process(claimed, &cancel)
        .await;

    assert_eq!(status, Some(JobStatus::Failed));
    assert_eq!(runtime.calls(), vec!["write 3 blog"]);
    assert_eq!(
        job(&store, submitted.id).await.error_message.as_deref(),
        Some("cancelled before completion")
    );
}

// ---------------------------------------------------------------------------
// Tunnels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tunnel_create_route_failure_completes_with_warning() {
    let store = Arc::new(MemoryJobStore::new());
    let tunnels = Arc::new(FakeTunnels {
        fail_route: true,
        ..Default::default()
    });
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::TunnelCreate, Arc::new(TunnelCreateHandler::new(tunnels)));

    let done = run_job(
        &store,
        registry,
        NewJob {
            job_type: JobType::TunnelCreate,
            app_id: 12,
            payload: json!({ "hostname": "blog.example.com", "service_url": "http://localhost:8080" }),
        },
    )
    .await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        done.message.as_deref(),
        Some("Tunnel 'shipyard-app-12' (tun-1) serving https://blog.example.com")
    );
    let warning = done.error_message.expect("warning is persisted");
    assert!(warning.starts_with("warning: tunnel tun-1 was created but routing blog.example.com failed"));
    assert!(warning.contains("DNS record for blog.example.com already exists"));
}

#[tokio::test]
async fn tunnel_create_success_has_no_warning() {
    let store = Arc::new(MemoryJobStore::new());
    let mut registry = HandlerRegistry::new();
    registry.register(
        JobType::TunnelCreate,
        Arc::new(TunnelCreateHandler::new(Arc::new(FakeTunnels::default()))),
    );

    let done = run_job(
        &store,
        registry,
        NewJob {
            job_type: JobType::TunnelCreate,
            app_id: 12,
            payload: json!({
                "hostname": "blog.example.com",
                "service_url": "http://localhost:8080",
                "tunnel_name": "blog"
            }),
        },
    )
    .await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.error_message, None);
    assert!(done.message.unwrap().starts_with("Tunnel 'blog' (tun-1)"));
}

#[tokio::test]
async fn tunnel_delete_and_quick_tunnel() {
    let store = Arc::new(MemoryJobStore::new());
    let tunnels = Arc::new(FakeTunnels::default());
    let mut registry = HandlerRegistry::new();
    registry
        .register(JobType::TunnelDelete, Arc::new(TunnelDeleteHandler::new(tunnels.clone())))
        .register(JobType::QuickTunnel, Arc::new(QuickTunnelHandler::new(tunnels.clone())));

    let deleted = run_job(
        &store,
        registry.clone(),
        NewJob {
            job_type: JobType::TunnelDelete,
            app_id: 1,
            payload: json!({ "tunnel_id": "tun-9" }),
        },
    )
    .await;
    assert_eq!(deleted.status, JobStatus::Completed);
    assert_eq!(deleted.message.as_deref(), Some("Tunnel tun-9 deleted"));
    assert_eq!(*tunnels.deleted.lock().unwrap(), vec!["tun-9".to_string()]);

    let quick = run_job(&store, registry.clone(), quick_tunnel_job(2)).await;
    assert_eq!(quick.status, JobStatus::Completed);
    assert_eq!(
        quick.message.as_deref(),
        Some("Quick tunnel available at https://calm-river-1234.trycloudflare.com")
    );
    assert_eq!(*tunnels.quick.lock().unwrap(), vec![2]);

    let replaced = run_job(&store, registry.clone(), quick_tunnel_job(2)).await;
    assert_eq!(replaced.status, JobStatus::Completed);
    assert_eq!(*tunnels.quick.lock().unwrap(), vec![2]);

    let torn_down = run_job(
        &store,
        registry,
        NewJob {
            job_type: JobType::TunnelDelete,
            app_id: 2,
            payload: json!({ "tunnel_id": "tun-2" }),
        },
    )
    .await;
    assert_eq!(
        torn_down.message.as_deref(),
        Some("Tunnel tun-2 deleted, quick tunnel stopped")
    );
    assert!(tunnels.quick.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tunnel_failures_keep_the_middle_milestone() {
    let store = Arc::new(MemoryJobStore::new());
    let tunnels = Arc::new(FakeTunnels {
        fail_delete: true,
        fail_quick: true,
        ..Default::default()
    });
    let mut registry = HandlerRegistry::new();
    registry
        .register(JobType::TunnelDelete, Arc::new(TunnelDeleteHandler::new(tunnels.clone())))
        .register(JobType::QuickTunnel, Arc::new(QuickTunnelHandler::new(tunnels.clone())));

    let deleted = run_job(
        &store,
        registry.clone(),
        NewJob {
            job_type: JobType::TunnelDelete,
            app_id: 1,
            payload: json!({ "tunnel_id": "tun-9" }),
        },
    )
    .await;
    assert_eq!(deleted.status, JobStatus::Failed);
    assert_eq!(deleted.progress, 50);
    assert_eq!(deleted.message.as_deref(), Some("Deleting tunnel"));

    let quick = run_job(&store, registry, quick_tunnel_job(2)).await;
    assert_eq!(quick.status, JobStatus::Failed);
    assert_eq!(quick.progress, 50);
    assert_eq!(quick.message.as_deref(), Some("Starting quick tunnel"));
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retention_loop_trims_and_stops_on_cancel() {
    let store = Arc::new(MemoryJobStore::new());
    for id in 1..=5 {
        let mut done = raw_job(id, "quick_tunnel", JobStatus::Completed);
        done.app_id = 1;
        done.created_at = chrono::Utc::now() + chrono::Duration::seconds(id);
        store.insert(done);
    }
    let mut active = raw_job(6, "quick_tunnel", JobStatus::Running);
    active.app_id = 1;
    store.insert(active);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(shipyard_jobs::retention::run(
        shared(&store),
        2,
        Duration::from_millis(10),
        cancel.clone(),
    ));

    wait_until(|| {
        let store = Arc::clone(&store);
        async move { store.all().len() == 3 }
    })
    .await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("retention loop stops on cancel")
        .unwrap();

    let ids: Vec<_> = store.all().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![4, 5, 6]);
}
