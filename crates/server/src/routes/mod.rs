//! API route handlers
//!
//! - `ingest`: the signed delivery endpoint
//! - `health`: liveness, readiness and metadata

pub mod health;
pub mod ingest;

use crate::error::ServerError;
use crate::state::ServerState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Service name, version and routes.
pub async fn api_info(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(json!({
        "name": "Content Bridge Receiver",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            format!("POST {}", state.config.ingest_path),
            "GET /health".to_string(),
            "GET /ready".to_string(),
            "GET /metadata".to_string(),
        ]
    }))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
