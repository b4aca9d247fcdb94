use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard_gateway::auth::{AllowAll, AuthValidator, JwtValidator};
use shipyard_gateway::config::GatewayConfig;
use shipyard_gateway::registry::NodeRegistry;
use shipyard_gateway::state::{self, GatewayState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = GatewayConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        primary = %config.primary_url,
        auth_enabled = config.auth_enabled,
        "Loaded gateway configuration",
    );

    // Registry fetches are short control-plane calls; proxied requests get
    // the long upstream timeout.
    let registry_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to build registry HTTP client");
    let upstream_client = state::upstream_client(&config).expect("Failed to build upstream HTTP client");

    let registry = Arc::new(NodeRegistry::new(
        registry_client,
        config.primary_url.clone(),
        config.gateway_secret.clone(),
        config.registry_refresh,
    ));

    let cancel = tokio_util::sync::CancellationToken::new();
    let refresh_handle = registry.start(cancel.clone()).await;

    let auth: Arc<dyn AuthValidator> = if config.auth_enabled {
        Arc::new(JwtValidator::new(&config.jwt_secret))
    } else {
        tracing::warn!("Authentication disabled, every request is forwarded");
        Arc::new(AllowAll)
    };

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = GatewayState::new(config, Arc::clone(&registry), auth, upstream_client);

    let request_id_header = HeaderName::from_static("x-request-id");
    let app = shipyard_gateway::app(state)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid));

    tracing::info!(%addr, "Starting gateway");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    tracing::info!("Gateway stopped accepting connections, cleaning up");
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), refresh_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shipyard_gateway=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

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
