//! Workspace umbrella crate for the content bridge.
//!
//! A bridge node replicates editorial content to another node over signed
//! HTTP. The sending half ([`sender`]) builds payloads, fingerprints them and
//! delivers them with retries, batching and backfill. The receiving half
//! ([`ingest`], served over HTTP by `server`) verifies the envelope, guards
//! against replays and reconciles each payload idempotently into a content
//! store. [`protocol`], [`guard`] and [`canonical`] hold the pieces both
//! sides share.
//!
//! [`BridgeNode`] wires the roles a [`BridgeConfig`] enables.
//!
//! ```
//! use std::sync::Arc;
//! use bridge::{BridgeConfig, BridgeNode};
//!
//! let config = BridgeConfig::from_yaml_with_secret(
//!     "mode: receiver\nsite_url: https://news.example\nreceiver:\n  enabled: true\n",
//!     Some("shared"),
//! )
//! .unwrap();
//!
//! let node = BridgeNode::new(config);
//! let receiver = node.receiver().unwrap();
//! assert_eq!(receiver.config().local_host, "news.example");
//! assert!(node.sender().is_none());
//! ```

pub mod config;

pub use crate::config::{BridgeConfig, BridgeMode, ConfigLoadError, SECRET_ENV};

pub use canonical;
pub use guard;
pub use ingest;
pub use protocol;
pub use sender;
#[cfg(feature = "server")]
pub use server;

pub use ingest::{IngestError, IngestPipeline, ReceiverConfig};
pub use protocol::{ContentPayload, IngestResponse, TransportEnvelope};
pub use sender::{
    ContentSource, DeliveryResult, Dispatcher, Scheduler, SchedulerHandle, SendError,
    SenderConfig, SyncMode, Transport,
};

use std::sync::Arc;

/// The roles one node runs, built from a [`BridgeConfig`].
pub struct BridgeNode {
    config: BridgeConfig,
    receiver: Option<Arc<IngestPipeline>>,
    sender: Option<Arc<Dispatcher>>,
}

impl std::fmt::Debug for BridgeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeNode")
            .field("mode", &self.config.mode)
            .field("receiver", &self.receiver.is_some())
            .field("sender", &self.sender.is_some())
            .finish()
    }
}

impl BridgeNode {
    /// Node with an in-memory receiver when the mode includes receiving.
    /// The sender needs a content source and is attached with
    /// [`with_sender`](Self::with_sender).
    pub fn new(config: BridgeConfig) -> Self {
        let receiver = config
            .mode
            .receives()
            .then(|| Arc::new(IngestPipeline::in_memory(config.effective_receiver())));
        Self {
            config,
            receiver,
            sender: None,
        }
    }

    /// Replace the receiver pipeline, e.g. one backed by real stores.
    pub fn with_receiver(mut self, pipeline: Arc<IngestPipeline>) -> Self {
        self.receiver = Some(pipeline);
        self
    }

    /// Attach a dispatcher when the sender role is active.
    pub fn with_sender(
        mut self,
        source: Arc<dyn ContentSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.sender = self
            .config
            .active_sender()
            .map(|cfg| Arc::new(Dispatcher::new(cfg.clone(), source, transport)));
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn receiver(&self) -> Option<&Arc<IngestPipeline>> {
        self.receiver.as_ref()
    }

    pub fn sender(&self) -> Option<&Arc<Dispatcher>> {
        self.sender.as_ref()
    }

    /// Start the batch drain when the sender runs in batch mode.
    pub fn start_scheduler(&self) -> Option<SchedulerHandle> {
        self.sender.clone().and_then(Scheduler::spawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sender::{MemoryContentSource, OutboundRequest, TransportResponse};

    struct NoNetwork;

    #[async_trait::async_trait]
    impl Transport for NoNetwork {
        async fn post(&self, _: OutboundRequest) -> Result<TransportResponse, String> {
            Err("offline".into())
        }
    }

    fn config(yaml: &str) -> BridgeConfig {
        BridgeConfig::from_yaml_with_secret(yaml, Some("s")).unwrap()
    }

    #[test]
    fn roles_follow_mode() {
        let yaml = "mode: sender\nsender:\n  enabled: true\n  ensure_cdn_urls: false\n";
        let node = BridgeNode::new(config(yaml))
            .with_sender(Arc::new(MemoryContentSource::new()), Arc::new(NoNetwork));
        assert!(node.receiver().is_none());
        assert!(node.sender().is_some());

        let node = BridgeNode::new(config("mode: both\n"))
            .with_sender(Arc::new(MemoryContentSource::new()), Arc::new(NoNetwork));
        assert!(node.receiver().is_some());
        assert!(node.sender().is_none(), "sender.enabled defaults to false");
    }

    #[tokio::test]
    async fn scheduler_needs_batch_mode() {
        let yaml = "mode: sender\nsender:\n  enabled: true\n  auto_send: true\n  ensure_cdn_urls: false\n";
        let node = BridgeNode::new(config(yaml))
            .with_sender(Arc::new(MemoryContentSource::new()), Arc::new(NoNetwork));
        assert!(node.start_scheduler().is_none());

        let batch = format!("{yaml}  sync_mode: batch\n");
        let node = BridgeNode::new(config(&batch))
            .with_sender(Arc::new(MemoryContentSource::new()), Arc::new(NoNetwork));
        let handle = node.start_scheduler().unwrap();
        handle.abort();
    }
}
