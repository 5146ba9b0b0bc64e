//! HTTP receiver endpoint for the content bridge.
//!
//! Wraps an [`ingest::IngestPipeline`] in an axum router. The ingest route
//! passes the raw body, the `X-Timestamp` / `X-Nonce` / `X-Signature` /
//! `X-Origin-Host` headers, the peer address and the TLS flag straight
//! through, and answers with the pipeline's status code and
//! `{success, post_id?, action?, error?, field?}` body.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingest::{IngestPipeline, ReceiverConfig};
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     let pipeline = Arc::new(IngestPipeline::in_memory(ReceiverConfig::default()));
//!     server::start_server(config, pipeline).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Endpoints
//!
//! - `POST /bridge/v1/ingest` (configurable) - signed content delivery
//! - `GET /health` - liveness
//! - `GET /ready` - readiness (503 while the receiver cannot accept)
//! - `GET /metadata` - version and uptime
//! - `GET /` - service info

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ServerConfig, DEFAULT_INGEST_PATH};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, init_tracing, start_server};
pub use state::ServerState;
