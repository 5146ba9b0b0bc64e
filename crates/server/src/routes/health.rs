use crate::state::{ServerMetadata, ServerState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Liveness: 200 while the process is serving.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "bridge-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness: 503 while the receiver is disabled or has no secret, since
/// every delivery would be refused.
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let receiver = state.pipeline.config();
    let receiver_status = match (receiver.enabled, receiver.secret.is_empty()) {
        (false, _) => "disabled",
        (true, true) => "missing_secret",
        (true, false) => "ready",
    };
    let (status, overall) = if receiver_status == "ready" {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status,
        Json(json!({
            "status": overall,
            "service": "bridge-server",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_seconds": uptime_seconds(),
            "components": {
                "api": "ready",
                "receiver": receiver_status,
            }
        })),
    )
}

/// Version, uptime and receiver state.
pub async fn server_metadata(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(ServerMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(),
        receiver_enabled: state.pipeline.config().enabled,
    })
}
