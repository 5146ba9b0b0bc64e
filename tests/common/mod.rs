//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge::ingest::{
    ContentStore, InboundRequest, IngestPipeline, MemoryAuthorDirectory, MemoryContentStore,
    MemoryMediaStore, ReceiverConfig,
};
use bridge::protocol::TransportEnvelope;
use bridge::sender::{
    ContentId, ContentRecord, Dispatcher, MemoryContentSource, OutboundRequest, SenderConfig,
    Transport, TransportResponse,
};
use chrono::{DateTime, TimeZone, Utc};

pub const SECRET: &str = "bridge-integration-secret";
pub const RECEIVER_HOST: &str = "news.example";

/// Hands every outbound request straight to a receiver pipeline, the way
/// the HTTP layer would after reading headers and body.
pub struct PipelineTransport {
    pipeline: Arc<IngestPipeline>,
    calls: AtomicUsize,
}

impl PipelineTransport {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for PipelineTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let envelope = TransportEnvelope::from_headers(|name| {
            request
                .headers
                .iter()
                .find(|(header, _)| header.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        });
        let inbound = InboundRequest {
            body: &request.body,
            envelope,
            remote_addr: Some("127.0.0.1".into()),
            secure: request.endpoint.starts_with("https://"),
        };
        let (status, response) = self.pipeline.respond(&inbound, Utc::now());
        let body = serde_json::to_string(&response).map_err(|e| e.to_string())?;
        Ok(TransportResponse { status, body })
    }
}

pub fn receiver_config() -> ReceiverConfig {
    ReceiverConfig {
        enabled: true,
        secret: SECRET.into(),
        local_host: RECEIVER_HOST.into(),
        require_tls: true,
        reject_non_allowed_media: false,
        ..Default::default()
    }
}

pub fn sender_config() -> SenderConfig {
    SenderConfig {
        enabled: true,
        auto_send: true,
        site_url: "https://origin.example".into(),
        base_url: format!("https://{RECEIVER_HOST}"),
        secret: SECRET.into(),
        ensure_cdn_urls: false,
        debug_logs: true,
        ..Default::default()
    }
}

pub fn modified(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

pub fn record(id: ContentId, title: &str, html: &str) -> ContentRecord {
    ContentRecord {
        id,
        post_type: "post".into(),
        status: "publish".into(),
        title: title.into(),
        content_html: html.into(),
        permalink: format!("https://origin.example/{id}/"),
        date: Some(Utc.with_ymd_and_hms(2024, 1, id as u32, 9, 0, 0).unwrap()),
        modified_at: modified(1),
        ..Default::default()
    }
}

/// Sender wired straight into a fresh receiver.
pub struct Bridge {
    pub dispatcher: Arc<Dispatcher>,
    pub source: Arc<MemoryContentSource>,
    pub pipeline: Arc<IngestPipeline>,
    pub store: Arc<MemoryContentStore>,
    pub transport: Arc<PipelineTransport>,
}

impl Bridge {
    pub fn new(sender: SenderConfig, receiver: ReceiverConfig) -> Self {
        let store = Arc::new(MemoryContentStore::new());
        let pipeline = Arc::new(IngestPipeline::with_stores(
            receiver,
            store.clone(),
            Arc::new(MemoryMediaStore::new()),
            Arc::new(MemoryAuthorDirectory::default()),
        ));
        let transport = PipelineTransport::new(Arc::clone(&pipeline));
        let source = Arc::new(MemoryContentSource::new());
        let dispatcher = Arc::new(Dispatcher::new(
            sender,
            source.clone(),
            transport.clone(),
        ));
        Self {
            dispatcher,
            source,
            pipeline,
            store,
            transport,
        }
    }

    pub fn standard() -> Self {
        Self::new(sender_config(), receiver_config())
    }

    /// Receiver-side content id stamped with `ingest_id`.
    pub fn stored_id(&self, ingest_id: &str) -> Option<u64> {
        self.store
            .find_by_key("post", bridge::ingest::keys::INGEST_ID, ingest_id)
            .unwrap()
    }
}

/// Seal `body` the way a sender would, stamped now.
pub fn sealed(secret: &str, body: &[u8]) -> TransportEnvelope {
    TransportEnvelope::seal(
        secret.as_bytes(),
        body,
        Some("origin.example"),
        Utc::now().timestamp(),
    )
}

pub fn minimal_body(source_url: &str, title: &str) -> Vec<u8> {
    serde_json::json!({
        "ingest_id": format!("ingest-{title}"),
        "source_url": source_url,
        "title": title,
        "content_html": "<p>hi</p>",
        "status": "publish",
    })
    .to_string()
    .into_bytes()
}
