use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use shipyard_core::node::RegisterNode;
use shipyard_db::store::{JobStore, NodeStore, PgJobStore, PgNodeStore};
use shipyard_jobs::retention::{self, CLEANUP_INTERVAL};
use shipyard_jobs::{Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard_api::background::node_health::{NodeHealthMonitor, PROBE_TIMEOUT};
use shipyard_api::background::registration;
use shipyard_api::config::NodeConfig;
use shipyard_api::runtime::tunnel::QuickTunnels;
use shipyard_api::runtime::{ComposeRuntime, TunnelApiClient, TunnelService};
use shipyard_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = NodeConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        node_id = %config.node_id,
        is_primary = config.is_primary,
        "Loaded node configuration",
    );

    // --- Database ---
    let pool = shipyard_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    shipyard_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    shipyard_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let nodes: Arc<dyn NodeStore> = Arc::new(PgNodeStore::new(pool));

    let this_node = RegisterNode {
        id: config.node_id.clone(),
        name: config.node_name.clone(),
        address: config.node_address.clone(),
        is_primary: config.is_primary,
    };
    if config.is_primary {
        nodes
            .upsert(&this_node, &config.gateway_secret)
            .await
            .expect("Failed to record the primary node");
        tracing::info!(node_id = %this_node.id, "Primary node recorded");
    }

    let cancel = CancellationToken::new();
    let mut background = Vec::new();

    // --- Node membership ---
    if config.is_primary {
        let probe_client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("Failed to build health probe HTTP client");
        let monitor = NodeHealthMonitor::new(
            Arc::clone(&nodes),
            probe_client,
            config.node_health_interval,
            config.node_unreachable_after,
        );
        background.push(tokio::spawn(monitor.run(cancel.clone())));
    } else if let Some(primary_url) = config.primary_url.clone() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build registration HTTP client");
        let registering = registration::run(
            client,
            primary_url,
            config.gateway_secret.clone(),
            this_node,
            registration::RETRY_INTERVAL,
            cancel.clone(),
        );
        background.push(tokio::spawn(async move {
            registering.await;
        }));
    }

    // --- Job engine ---
    let runtime = Arc::new(ComposeRuntime::new(&config.apps_dir));
    let tunnel_api = config.tunnel_api.clone().map(|api| {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build tunnel API HTTP client");
        TunnelApiClient::new(client, api)
    });
    if tunnel_api.is_none() {
        tracing::warn!("Tunnel API not configured, only quick tunnels are available");
    }
    let tunnels = Arc::new(TunnelService::new(tunnel_api, QuickTunnels::new("cloudflared")));
    let handlers = shipyard_api::handler_registry(runtime, tunnels);
    tracing::info!(job_types = ?handlers.job_types(), "Job handlers registered");

    let worker_config = WorkerConfig::new(format!("{}:{}", config.node_id, uuid::Uuid::new_v4()))
        .with_poll_interval(config.job_poll_interval)
        .with_stale_after(config.job_stale_after)
        .with_shutdown_timeout(config.job_shutdown_timeout);
    let worker_grace = worker_config.shutdown_timeout + Duration::from_secs(5);
    let worker = Worker::new(Arc::clone(&jobs), handlers, worker_config);
    let worker_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    background.push(tokio::spawn(retention::run(
        Arc::clone(&jobs),
        config.job_retention_keep,
        CLEANUP_INTERVAL,
        cancel.clone(),
    )));

    // --- Router ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = AppState {
        config: Arc::new(config),
        jobs,
        nodes,
    };

    let request_id_header = HeaderName::from_static("x-request-id");
    let app = shipyard_api::app(state)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid));

    // --- Start server ---
    tracing::info!(%addr, "Starting node backend");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    match tokio::time::timeout(worker_grace, worker_handle).await {
        Ok(Ok(outcome)) => tracing::info!(?outcome, "Job worker stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Job worker task panicked"),
        Err(_) => tracing::error!("Job worker did not stop in time"),
    }

    for handle in background {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    tracing::info!("Graceful shutdown complete");
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shipyard_api=debug,shipyard_jobs=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
