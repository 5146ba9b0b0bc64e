//! Content bridge receiver binary.
//!
//! Reads the node configuration from the YAML file named by `BRIDGE_CONFIG`
//! (or the first argument, default `bridge.yaml`) and the listener settings
//! from `server.*` / `BRIDGE_SERVER__*`, then serves the ingest endpoint.

use anyhow::Context;
use bridge::{BridgeConfig, BridgeNode};
use server::ServerConfig;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_CONFIG_PATH: &str = "bridge.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server_config = ServerConfig::load()?;
    server::init_tracing(&server_config.log_level);

    let path = std::env::var("BRIDGE_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = BridgeConfig::from_file(&path)
        .with_context(|| format!("loading bridge config from {path}"))?;

    let node = BridgeNode::new(config);
    let pipeline = node
        .receiver()
        .cloned()
        .context("bridge mode does not include the receiver role; nothing to serve")?;
    if !pipeline.config().enabled {
        tracing::warn!("receiver is disabled; every delivery will be answered with 503");
    }

    server::start_server(server_config, pipeline).await
}
