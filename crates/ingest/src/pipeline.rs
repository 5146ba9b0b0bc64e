//! The receiver's request pipeline.
//!
//! Checks run in a fixed order and the first failure ends the request:
//!
//! ```text
//! enabled → TLS → secret → rate limit → IP allowlist → body size →
//! self-origin → timestamp/nonce → signature → nonce commit →
//! JSON parse → required fields → media domains → upsert
//! ```
//!
//! The nonce is committed only once the signature verifies, so unsigned
//! traffic cannot burn nonces.

use std::sync::Arc;
use std::time::Instant;

use canonical::{enforce_media_domains, extract_image_urls, CanonicalError, ImageAttrs};
use chrono::{DateTime, Utc};
use guard::ReplayGuard;
use protocol::envelope::TransportEnvelope;
use protocol::{ContentPayload, IngestResponse};
use serde_json::{json, Map, Value};
use tracing::{info, warn, Level};

use crate::config::ReceiverConfig;
use crate::error::IngestError;
use crate::log::{ContentInsight, EventLog, LogStatus};
use crate::store::{
    AuthorDirectory, ContentStore, MediaStore, MemoryAuthorDirectory, MemoryContentStore,
    MemoryMediaStore,
};
use crate::upsert::{ReconciliationOutcome, UpsertEngine};

/// One inbound delivery as seen by the transport layer.
#[derive(Debug, Clone)]
pub struct InboundRequest<'a> {
    /// Raw body bytes, exactly as received.
    pub body: &'a [u8],
    pub envelope: TransportEnvelope,
    pub remote_addr: Option<String>,
    /// Whether the request arrived over TLS (directly or via a trusted proxy).
    pub secure: bool,
}

/// Admission, validation and reconciliation for one receiver.
#[derive(Debug)]
pub struct IngestPipeline {
    config: ReceiverConfig,
    guard: ReplayGuard,
    engine: UpsertEngine,
    log: EventLog,
}

impl IngestPipeline {
    pub fn new(config: ReceiverConfig, guard: ReplayGuard, engine: UpsertEngine) -> Self {
        let log = EventLog::new(config.log_capacity());
        Self {
            config,
            guard,
            engine,
            log,
        }
    }

    /// Pipeline over the given stores with an in-process replay guard.
    pub fn with_stores(
        config: ReceiverConfig,
        content: Arc<dyn ContentStore>,
        media: Arc<dyn MediaStore>,
        authors: Arc<dyn AuthorDirectory>,
    ) -> Self {
        let guard = ReplayGuard::in_memory(config.guard.clone());
        Self::new(config, guard, UpsertEngine::new(content, media, authors))
    }

    /// Fully in-memory pipeline.
    pub fn in_memory(config: ReceiverConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemoryMediaStore::new()),
            Arc::new(MemoryAuthorDirectory::default()),
        )
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn engine(&self) -> &UpsertEngine {
        &self.engine
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Status code and body for `request`.
    pub fn respond(&self, request: &InboundRequest<'_>, now: DateTime<Utc>) -> (u16, IngestResponse) {
        match self.ingest(request, now) {
            Ok(outcome) => (
                200,
                IngestResponse::accepted(outcome.content_id, outcome.action.as_str()),
            ),
            Err(err) => (err.http_status(), err.to_response()),
        }
    }

    /// Run every check and apply the payload.
    pub fn ingest(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, IngestError> {
        let start = Instant::now();
        let span = tracing::span!(
            Level::INFO,
            "ingest.request",
            remote_addr = ?request.remote_addr,
            bytes = request.body.len()
        );
        let _guard = span.enter();

        let mut insight = None;
        match self.ingest_inner(request, now, &mut insight) {
            Ok((payload, outcome)) => {
                let elapsed_micros = start.elapsed().as_micros();
                info!(
                    ingest_id = %payload.ingest_id,
                    content_id = outcome.content_id,
                    action = outcome.action.as_str(),
                    elapsed_micros,
                    "ingest_success"
                );
                if self.config.enable_log {
                    let context = success_context(&payload, &outcome, insight.as_ref());
                    self.log
                        .record(LogStatus::Success, "Ingest completed.", context, now);
                }
                Ok(outcome)
            }
            Err(err) => {
                let elapsed_micros = start.elapsed().as_micros();
                warn!(
                    code = err.code(),
                    status = err.http_status(),
                    error = %err,
                    elapsed_micros,
                    "ingest_rejected"
                );
                if self.config.enable_log {
                    let context = rejection_context(&err, request, insight.as_ref());
                    self.log
                        .record(LogStatus::Error, &rejection_message(&err), context, now);
                }
                Err(err)
            }
        }
    }

    fn ingest_inner(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
        insight: &mut Option<ContentInsight>,
    ) -> Result<(ContentPayload, ReconciliationOutcome), IngestError> {
        let cfg = &self.config;
        let ts = now.timestamp();

        if !cfg.enabled {
            return Err(IngestError::ReceiverDisabled);
        }
        if cfg.require_tls && !request.secure {
            return Err(IngestError::TlsRequired);
        }
        if cfg.secret.is_empty() {
            return Err(IngestError::MissingSecret);
        }
        self.guard.check_rate_limit(ts)?;
        self.guard.check_ip(request.remote_addr.as_deref())?;

        if request.body.is_empty() {
            return Err(IngestError::EmptyBody);
        }
        let limit = cfg.max_payload_bytes();
        if request.body.len() > limit {
            return Err(IngestError::PayloadTooLarge {
                bytes: request.body.len(),
                limit,
            });
        }

        let envelope = &request.envelope;
        self.guard
            .check_origin(envelope.origin_host.as_deref(), &cfg.local_host)?;
        self.guard
            .check_timestamp_nonce(envelope.timestamp, &envelope.nonce, ts)?;
        if !envelope.verify(cfg.secret.as_bytes(), request.body) {
            return Err(IngestError::InvalidSignature);
        }
        self.guard.commit_nonce(&envelope.nonce, ts)?;

        let payload = ContentPayload::from_slice(request.body)?;
        *insight = Some(ContentInsight::of(&payload));

        self.check_media_domains(&payload)?;

        let outcome = self.engine.reconcile(&payload, cfg, now)?;
        Ok((payload, outcome))
    }

    fn check_media_domains(&self, payload: &ContentPayload) -> Result<(), IngestError> {
        if !self.config.reject_non_allowed_media {
            return Ok(());
        }
        let mut urls = extract_image_urls(&payload.content_html, ImageAttrs::All)
            .map_err(|e| IngestError::MediaDomainNotAllowed { url: e.to_string() })?;
        if let Some(featured) = payload
            .featured_image
            .as_ref()
            .filter(|f| !f.url.trim().is_empty())
        {
            urls.push(featured.url.clone());
        }
        urls.extend(payload.manifest_urls().map(str::to_string));

        enforce_media_domains(
            urls.iter().map(String::as_str),
            &self.config.allowed_media_domains,
        )
        .map_err(|err| match err {
            CanonicalError::MediaDomainNotAllowed { url } => {
                IngestError::MediaDomainNotAllowed { url }
            }
            other => IngestError::MediaDomainNotAllowed {
                url: other.to_string(),
            },
        })
    }
}

fn rejection_message(err: &IngestError) -> String {
    match err {
        IngestError::ReceiverDisabled => "Receiver disabled; ingest rejected.".into(),
        IngestError::TlsRequired => "TLS required; ingest rejected.".into(),
        IngestError::MissingSecret => "Receiver secret missing; ingest rejected.".into(),
        IngestError::RateLimited => "Rate limited ingest.".into(),
        IngestError::IpNotAllowed => "IP not in allowlist.".into(),
        IngestError::EmptyBody => "Ingest empty body.".into(),
        IngestError::PayloadTooLarge { .. } => "Payload too large.".into(),
        IngestError::SelfOrigin => "Self-origin request rejected.".into(),
        IngestError::InvalidTimestampOrNonce => "Invalid timestamp/nonce.".into(),
        IngestError::InvalidSignature => "Invalid signature.".into(),
        IngestError::InvalidJson(_) => "Invalid JSON payload.".into(),
        IngestError::MissingField(_) => "Payload missing required field.".into(),
        IngestError::MediaDomainNotAllowed { .. } => "Media domain rejected by allowlist.".into(),
        IngestError::Store(msg) => format!("Upsert failed: {msg}"),
    }
}

fn rejection_context(
    err: &IngestError,
    request: &InboundRequest<'_>,
    insight: Option<&ContentInsight>,
) -> Map<String, Value> {
    let mut context = insight.map(ContentInsight::to_context).unwrap_or_default();
    match err {
        IngestError::IpNotAllowed => {
            context.insert(
                "remote_ip".into(),
                json!(request.remote_addr.clone().unwrap_or_default()),
            );
        }
        IngestError::PayloadTooLarge { bytes, limit } => {
            context.insert("bytes".into(), json!(bytes));
            context.insert("limit_kb".into(), json!(limit / 1024));
        }
        IngestError::SelfOrigin => {
            context.insert("origin_host".into(), json!(request.envelope.origin_host));
        }
        IngestError::MissingField(field) => {
            context.insert("field".into(), json!(field));
        }
        IngestError::MediaDomainNotAllowed { url } => {
            context.insert("rejected_url".into(), json!(url));
        }
        _ => {}
    }
    context
}

fn success_context(
    payload: &ContentPayload,
    outcome: &ReconciliationOutcome,
    insight: Option<&ContentInsight>,
) -> Map<String, Value> {
    let mut context = insight.map(ContentInsight::to_context).unwrap_or_default();
    context.insert("ingest_id".into(), json!(payload.ingest_id));
    context.insert("source_url".into(), json!(payload.source_url));
    context.insert("post_id".into(), json!(outcome.content_id));
    context.insert("action".into(), json!(outcome.action.as_str()));
    context.insert(
        "prepend_featured_applied".into(),
        json!(outcome.prepend_featured_applied),
    );
    context.insert(
        "content_update_suppressed".into(),
        json!(outcome.content_update_suppressed),
    );
    context.insert("featured_mode".into(), json!(outcome.featured.mode));
    context.insert("featured_status".into(), json!(outcome.featured.status));
    context.insert("featured_error".into(), json!(outcome.featured.error));
    if let Ok(Value::Object(taxonomy)) = serde_json::to_value(&outcome.taxonomy) {
        context.extend(taxonomy);
    }
    context
}
