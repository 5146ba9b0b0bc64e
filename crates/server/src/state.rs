use crate::config::ServerConfig;
use ingest::IngestPipeline;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,

    /// Receiver pipeline (shared across requests)
    pub pipeline: Arc<IngestPipeline>,
}

impl ServerState {
    pub fn new(config: ServerConfig, pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
        }
    }

    /// Largest body read from the socket: the listener cap, but never less
    /// than one byte over the receiver limit so oversize bodies reach the
    /// pipeline's own check.
    pub fn body_read_limit(&self) -> usize {
        self.config
            .max_body_size()
            .max(self.pipeline.config().max_payload_bytes() + 1)
    }
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
    pub receiver_enabled: bool,
}
