//! Router assembly, tracing setup and the serve loop.

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::routes::{api_info, health, ingest, not_found};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use ::ingest::IngestPipeline;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the router.
///
/// The ingest route reads its own body under [`ServerState::body_read_limit`],
/// so axum's default body limit is disabled there.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let ingest_routes = Router::new()
        .route(&state.config.ingest_path, post(ingest::ingest_content))
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metadata", get(health::server_metadata))
        .merge(ingest_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the JSON `tracing` subscriber. Safe to call more than once.
pub fn init_tracing(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .json()
        .try_init();
}

/// Serve `pipeline` until SIGTERM or Ctrl+C.
pub async fn start_server(config: ServerConfig, pipeline: Arc<IngestPipeline>) -> anyhow::Result<()> {
    init_tracing(&config.log_level);

    let addr: SocketAddr = config.socket_addr()?;
    let receiver_enabled = pipeline.config().enabled;
    let state = Arc::new(ServerState::new(config.clone(), pipeline));
    let app = build_router(state);

    tracing::info!(
        %addr,
        ingest_path = %config.ingest_path,
        receiver_enabled,
        timeout_secs = config.timeout_secs,
        max_body_size_mb = config.max_body_size_mb,
        "server_starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
