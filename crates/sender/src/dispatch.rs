//! Dispatch: build → fingerprint → dedupe → deliver.
//!
//! Automatic dispatch, the batch drain and backfill all funnel through
//! the same sequence and report the same [`DeliveryResult`] taxonomy. They
//! differ only in their trigger and in which records they consider
//! eligible.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use protocol::{derive_ingest_id, payload_fingerprint, ContentPayload, TransportEnvelope};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{info, warn, Instrument, Level};
use url::Url;

use crate::build::build_payload;
use crate::config::{SenderConfig, SyncMode};
use crate::error::SendError;
use crate::ledger::{DeliveryLedger, MemoryLedger};
use crate::oplog::OperatorLog;
use crate::queue::{BatchQueue, MemoryBatchQueue, QueueItem};
use crate::retry::{execute_with_retry_async, RetryPolicy, Retryable};
use crate::source::{CandidateQuery, ContentId, ContentRecord, ContentSource};
use crate::transport::{OutboundRequest, Transport, TransportResponse};

const TEST_SOURCE_URL: &str = "https://example.com/test-article";

/// Terminal classification of one dispatch for one content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The receiver answered 2xx.
    Sent { status: u16, attempts: u32 },
    /// Batch mode: handed to the queue.
    Queued,
    /// Dry-run mode: fingerprint recorded, nothing sent.
    DryRun,
    SkippedSameHash,
    SkippedRemoteOrigin,
    SkippedWrongType,
    SkippedWrongStatus,
    Error(SendError),
}

impl DeliveryResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryResult::Sent { .. } => "sent",
            DeliveryResult::Queued => "queued",
            DeliveryResult::DryRun => "dry_run",
            DeliveryResult::SkippedSameHash => "skipped_same_hash",
            DeliveryResult::SkippedRemoteOrigin => "skipped_remote_origin",
            DeliveryResult::SkippedWrongType => "skipped_wrong_type",
            DeliveryResult::SkippedWrongStatus => "skipped_wrong_status",
            DeliveryResult::Error(_) => "error",
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryResult::Sent { .. })
    }
}

/// What the receiver said to a delivered payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub body: String,
    pub attempts: u32,
}

/// Eligibility filter for backfill runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackfillFilter {
    /// Defaults to the configured target type.
    pub post_type: Option<String>,
    /// `publish`, `pending` or `draft`; anything else means `publish`.
    pub status: Option<String>,
    pub date_after: Option<DateTime<Utc>>,
    /// Clamped to `1..=200`; zero means 25.
    pub batch_size: usize,
}

impl BackfillFilter {
    pub const DEFAULT_BATCH_SIZE: usize = 25;
    pub const MAX_BATCH_SIZE: usize = 200;

    fn post_type<'a>(&'a self, config: &'a SenderConfig) -> &'a str {
        self.post_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&config.target_post_type)
    }

    fn status(&self) -> &str {
        match self.status.as_deref().map(str::trim) {
            Some(s @ ("publish" | "pending" | "draft")) => s,
            _ => "publish",
        }
    }

    fn batch_size(&self) -> usize {
        match self.batch_size {
            0 => Self::DEFAULT_BATCH_SIZE,
            n => n.min(Self::MAX_BATCH_SIZE),
        }
    }
}

/// Per-classification counts for one backfill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub sent: usize,
    pub dry_run: usize,
    pub skipped_same_hash: usize,
    pub skipped_remote_origin: usize,
    pub skipped_wrong_type: usize,
    pub skipped_wrong_status: usize,
    pub errors: usize,
}

impl BackfillReport {
    fn count(&mut self, result: &DeliveryResult) {
        self.processed += 1;
        match result {
            DeliveryResult::Sent { .. } => self.sent += 1,
            DeliveryResult::DryRun => self.dry_run += 1,
            DeliveryResult::SkippedSameHash => self.skipped_same_hash += 1,
            DeliveryResult::SkippedRemoteOrigin => self.skipped_remote_origin += 1,
            DeliveryResult::SkippedWrongType => self.skipped_wrong_type += 1,
            DeliveryResult::SkippedWrongStatus => self.skipped_wrong_status += 1,
            DeliveryResult::Queued | DeliveryResult::Error(_) => self.errors += 1,
        }
    }

    pub fn summary(&self) -> String {
        if self.processed == 0 {
            return "Backfill found no eligible unsent posts for the selected filters.".into();
        }
        format!(
            "Backfill processed {} posts. Sent: {}, Dry run: {}, Skipped same content: {}, \
             Skipped remote-sourced: {}, Skipped wrong post type: {}, Skipped wrong status: {}, Errors: {}.",
            self.processed,
            self.sent,
            self.dry_run,
            self.skipped_same_hash,
            self.skipped_remote_origin,
            self.skipped_wrong_type,
            self.skipped_wrong_status,
            self.errors
        )
    }
}

/// Outcome of one batch drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchReport {
    /// Items that reached a delivery attempt.
    pub processed: usize,
    pub delivered: usize,
    /// Items removed because their record is gone or unpublished.
    pub dropped: usize,
    /// Items left in the queue.
    pub retained: usize,
}

impl Retryable for SendError {
    fn is_retryable(&self) -> bool {
        SendError::is_retryable(self)
    }

    /// Transport failures win over HTTP responses.
    fn supersedes(&self, previous: &Self) -> bool {
        matches!(self, SendError::Transport(_)) || !matches!(previous, SendError::Transport(_))
    }
}

/// Held while one `(content id, version)` is being dispatched.
pub struct DispatchGuard<'a> {
    in_flight: &'a DashSet<(ContentId, i64)>,
    key: (ContentId, i64),
}

impl<'a> DispatchGuard<'a> {
    fn acquire(in_flight: &'a DashSet<(ContentId, i64)>, key: (ContentId, i64)) -> Option<Self> {
        in_flight.insert(key).then_some(Self { in_flight, key })
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

/// Handle on one content id's mutex. Removes the map entry on drop when no
/// other task holds it.
struct ContentLock<'a> {
    locks: &'a DashMap<ContentId, Arc<AsyncMutex<()>>>,
    id: ContentId,
    lock: Arc<AsyncMutex<()>>,
}

impl ContentLock<'_> {
    async fn lock(&self) -> AsyncMutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for ContentLock<'_> {
    fn drop(&mut self) {
        // One reference in the map, one here.
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// The sender.
pub struct Dispatcher {
    config: SenderConfig,
    source: Arc<dyn ContentSource>,
    transport: Arc<dyn Transport>,
    ledger: Arc<dyn DeliveryLedger>,
    queue: Arc<dyn BatchQueue>,
    oplog: OperatorLog,
    in_flight: DashSet<(ContentId, i64)>,
    content_locks: DashMap<ContentId, Arc<AsyncMutex<()>>>,
    drain_lock: AsyncMutex<()>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.config.endpoint())
            .field("sync_mode", &self.config.sync_mode)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher with an in-memory ledger and queue.
    pub fn new(
        config: SenderConfig,
        source: Arc<dyn ContentSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            source,
            transport,
            ledger: Arc::new(MemoryLedger::new()),
            queue: Arc::new(MemoryBatchQueue::new()),
            oplog: OperatorLog::new(),
            in_flight: DashSet::new(),
            content_locks: DashMap::new(),
            drain_lock: AsyncMutex::new(()),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn DeliveryLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn BatchQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn DeliveryLedger> {
        &self.ledger
    }

    pub fn queue(&self) -> &Arc<dyn BatchQueue> {
        &self.queue
    }

    pub fn operator_log(&self) -> &OperatorLog {
        &self.oplog
    }

    /// Dispatch a record that was just saved.
    ///
    /// Returns `None` when automatic dispatch is off or the same version of
    /// the record is already being dispatched.
    pub async fn on_save(&self, record: &ContentRecord) -> Option<DeliveryResult> {
        let _guard = DispatchGuard::acquire(
            &self.in_flight,
            (record.id, record.modified_at.timestamp()),
        )?;
        if !self.config.auto_dispatch() {
            return None;
        }
        if record.post_type != self.config.target_post_type {
            return Some(DeliveryResult::SkippedWrongType);
        }
        if record.status != "publish" {
            return Some(DeliveryResult::SkippedWrongStatus);
        }
        if record.remote_origin {
            return Some(DeliveryResult::SkippedRemoteOrigin);
        }

        let lock = self.content_lock(record.id);
        let _held = lock.lock().await;

        let (payload, fingerprint) = match self.prepare(record) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.oplog.set_last_result(err.to_string());
                return Some(DeliveryResult::Error(err));
            }
        };
        if self.ledger.fingerprint(record.id).as_deref() == Some(fingerprint.as_str()) {
            return Some(DeliveryResult::SkippedSameHash);
        }

        let id = record.id;
        let result = match self.config.sync_mode {
            SyncMode::DryRun => {
                self.record_dry_run(id, &payload, &fingerprint, "auto_dry_run", "Dry run");
                DeliveryResult::DryRun
            }
            SyncMode::Batch => {
                self.queue.enqueue(QueueItem {
                    content_id: id,
                    fingerprint_hash: fingerprint,
                    enqueued_at: Utc::now(),
                });
                let message = format!("Queued post {id} for batch send.");
                self.oplog.set_last_result(message.clone());
                self.debug(&message);
                DeliveryResult::Queued
            }
            SyncMode::Immediate => self.send_single(id, &payload, &fingerprint, "auto").await,
        };
        Some(result)
    }

    /// Manual send of one record, ignoring `auto_send`.
    pub async fn backfill_one(
        &self,
        record: &ContentRecord,
        filter: &BackfillFilter,
    ) -> DeliveryResult {
        let id = record.id;
        if !self.config.enabled {
            self.debug(&format!("Backfill skipped: sender mode inactive for post {id}"));
            return DeliveryResult::Error(SendError::SenderInactive);
        }
        let post_type = filter.post_type(&self.config);
        if record.post_type != post_type {
            self.debug(&format!(
                "Backfill skipped post {id}: post type mismatch ({} != {post_type})",
                record.post_type
            ));
            return DeliveryResult::SkippedWrongType;
        }
        let status = filter.status();
        if record.status != status {
            self.debug(&format!(
                "Backfill skipped post {id}: status mismatch ({} != {status})",
                record.status
            ));
            return DeliveryResult::SkippedWrongStatus;
        }
        if record.remote_origin {
            self.debug(&format!("Backfill skipped post {id}: remote-sourced marker found."));
            return DeliveryResult::SkippedRemoteOrigin;
        }

        let lock = self.content_lock(id);
        let _held = lock.lock().await;

        let (payload, fingerprint) = match self.prepare(record) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.oplog.set_last_result(err.to_string());
                self.debug(&format!("Backfill payload build failed for post {id}: {err}"));
                return DeliveryResult::Error(err);
            }
        };
        if self.ledger.fingerprint(id).as_deref() == Some(fingerprint.as_str()) {
            self.debug(&format!("Backfill skipped post {id}: payload hash unchanged."));
            return DeliveryResult::SkippedSameHash;
        }
        if self.config.sync_mode == SyncMode::DryRun {
            self.record_dry_run(id, &payload, &fingerprint, "bulk_dry_run", "Dry run (bulk)");
            return DeliveryResult::DryRun;
        }
        self.send_single(id, &payload, &fingerprint, "bulk").await
    }

    /// Send the oldest unsent records matching `filter`.
    pub async fn backfill(&self, filter: &BackfillFilter) -> Result<BackfillReport, SendError> {
        if !self.config.enabled {
            return Err(SendError::SenderInactive);
        }
        if self.config.secret.is_empty() {
            return Err(SendError::MissingSecret);
        }
        validate_endpoint(&self.config.endpoint())?;

        let query = CandidateQuery {
            post_type: filter.post_type(&self.config).to_string(),
            status: filter.status().to_string(),
            date_after: filter.date_after,
        };
        let selected: Vec<ContentRecord> = self
            .source
            .candidates(&query)
            .into_iter()
            .filter(|r| !r.remote_origin && self.ledger.is_unsent(r.id))
            .take(filter.batch_size())
            .collect();

        let mut report = BackfillReport::default();
        for record in &selected {
            let result = self.backfill_one(record, filter).await;
            report.count(&result);
        }
        info!(
            processed = report.processed,
            sent = report.sent,
            errors = report.errors,
            "backfill_complete"
        );
        self.oplog.set_last_result(report.summary());
        Ok(report)
    }

    /// Drain up to `batch_size` queued items.
    ///
    /// Missing or unpublished records leave the queue; build failures and
    /// failed deliveries stay for the next tick.
    pub async fn process_batch_queue(&self) -> BatchReport {
        let mut report = BatchReport::default();
        if !self.config.auto_dispatch() {
            return report;
        }
        let _tick = self.drain_lock.lock().await;

        let items = self.queue.items();
        let batch_size = self.config.effective_batch_size();
        for item in items {
            if report.processed >= batch_size {
                report.retained += 1;
                continue;
            }
            let id = item.content_id;
            let record = match self.source.fetch(id) {
                Some(record) if record.status == "publish" => record,
                _ => {
                    self.queue.remove(id);
                    report.dropped += 1;
                    continue;
                }
            };

            let lock = self.content_lock(id);
            let _held = lock.lock().await;

            let (payload, fingerprint) = match self.prepare(&record) {
                Ok(prepared) => prepared,
                Err(err) => {
                    self.debug(&format!("Batch payload build failed for post {id}: {err}"));
                    report.retained += 1;
                    continue;
                }
            };
            let result = self.send_single(id, &payload, &fingerprint, "batch").await;
            if result.is_sent() {
                self.queue.remove(id);
                report.delivered += 1;
            } else {
                report.retained += 1;
            }
            report.processed += 1;
        }
        info!(
            processed = report.processed,
            delivered = report.delivered,
            dropped = report.dropped,
            retained = report.retained,
            "batch_drained"
        );
        report
    }

    /// Push a fixed test payload through the delivery path.
    pub async fn send_test_payload(&self) -> Result<DeliveryReceipt, SendError> {
        let stamp = Utc::now().to_rfc3339();
        let payload = ContentPayload {
            ingest_id: derive_ingest_id(TEST_SOURCE_URL, &stamp),
            source_url: TEST_SOURCE_URL.into(),
            title: "Content Bridge Test Payload".into(),
            content_html: "<p>This is a test payload.</p>".into(),
            status: self.config.wire_status(),
            ..Default::default()
        };
        self.snapshot("manual_test", 0, &payload);
        let result = self.deliver(&payload).await;
        match &result {
            Ok(receipt) => self.oplog.set_last_result(format!(
                "Test payload sent. Response code: {}",
                receipt.status
            )),
            Err(err) => self.oplog.set_last_result(err.to_string()),
        }
        result
    }

    /// Deliver one payload and persist its fingerprint on success.
    pub async fn send_single(
        &self,
        id: ContentId,
        payload: &ContentPayload,
        fingerprint: &str,
        context: &str,
    ) -> DeliveryResult {
        if self.config.secret.is_empty() || self.config.base_url.trim().is_empty() {
            self.oplog.set_last_result("Missing sender endpoint or secret.");
            return DeliveryResult::Error(SendError::MissingSecret);
        }
        self.snapshot(context, id, payload);

        match self.deliver(payload).await {
            Ok(receipt) => {
                self.ledger.record(id, fingerprint);
                self.debug(&format!(
                    "Send success for post {id}: HTTP {} in {} attempt(s).",
                    receipt.status, receipt.attempts
                ));
                DeliveryResult::Sent {
                    status: receipt.status,
                    attempts: receipt.attempts,
                }
            }
            Err(err) => {
                self.debug(&format!("Send failed for post {id}: {err}"));
                DeliveryResult::Error(err)
            }
        }
    }

    /// Sign and POST `payload`, retrying transport failures and non-2xx
    /// answers with exponential backoff.
    pub async fn deliver(&self, payload: &ContentPayload) -> Result<DeliveryReceipt, SendError> {
        if self.config.secret.is_empty() {
            return Err(SendError::MissingSecret);
        }
        let body =
            serde_json::to_vec(payload).map_err(|e| SendError::EncodeFailed(e.to_string()))?;
        let endpoint = self.config.endpoint();
        let target_host = validate_endpoint(&endpoint)?;
        let own_host = canonical::host_of(&self.config.site_url);
        if own_host.as_deref() == Some(target_host.as_str()) {
            return Err(SendError::SelfTarget);
        }
        let limit = self.config.max_payload_bytes();
        if body.len() > limit {
            return Err(SendError::PayloadTooLarge {
                bytes: body.len(),
                limit,
            });
        }

        let span = tracing::span!(
            Level::INFO,
            "sender.deliver",
            endpoint = %endpoint,
            bytes = body.len()
        );
        self.deliver_with_retry(&body, &endpoint, own_host.as_deref())
            .instrument(span)
            .await
    }

    async fn deliver_with_retry(
        &self,
        body: &[u8],
        endpoint: &str,
        own_host: Option<&str>,
    ) -> Result<DeliveryReceipt, SendError> {
        let start = Instant::now();
        let policy = RetryPolicy::from(&self.config);
        let outcome = execute_with_retry_async(&policy, |attempt| async move {
            let envelope = TransportEnvelope::seal(
                self.config.secret.as_bytes(),
                body,
                own_host,
                Utc::now().timestamp(),
            );
            let request = OutboundRequest {
                endpoint: endpoint.to_string(),
                headers: envelope.headers(),
                body: body.to_vec(),
                timeout: self.config.timeout(),
            };
            match self.transport.post(request).await {
                Ok(response) => self.classify(response, attempt),
                Err(message) => {
                    warn!(attempt, error = %message, "delivery_attempt_failed");
                    self.debug(&format!(
                        "Sender transport error on attempt {attempt}: {message}"
                    ));
                    Err(SendError::Transport(message))
                }
            }
        })
        .await;

        let elapsed_micros = start.elapsed().as_micros();
        match outcome.result {
            Ok(receipt) => {
                info!(
                    status = receipt.status,
                    attempts = receipt.attempts,
                    elapsed_micros,
                    "delivery_sent"
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(
                    code = err.code(),
                    attempts = outcome.attempts,
                    elapsed_micros,
                    error = %err,
                    "delivery_failed"
                );
                if let SendError::Transport(message) = &err {
                    self.oplog.set_last_result(message.clone());
                }
                Err(err)
            }
        }
    }

    fn classify(
        &self,
        response: TransportResponse,
        attempt: u32,
    ) -> Result<DeliveryReceipt, SendError> {
        self.oplog.set_last_result(format!(
            "HTTP {} (attempt {attempt})\n{}",
            response.status, response.body
        ));
        if response.is_success() {
            return Ok(DeliveryReceipt {
                status: response.status,
                body: response.body,
                attempts: attempt,
            });
        }
        warn!(attempt, status = response.status, "delivery_attempt_failed");
        self.debug(&format!(
            "Sender HTTP error on attempt {attempt}: {}",
            response.status
        ));
        Err(SendError::Http {
            status: response.status,
            body: response.body,
        })
    }

    /// Build the payload and its fingerprint, logging media diagnostics.
    fn prepare(&self, record: &ContentRecord) -> Result<(ContentPayload, String), SendError> {
        let built = build_payload(record, &self.config, self.source.as_ref())?;
        if self.config.debug_logs {
            self.debug(&built.diagnostics(record.id, &self.config));
        }
        let fingerprint = payload_fingerprint(&built.payload)?;
        Ok((built.payload, fingerprint))
    }

    fn record_dry_run(
        &self,
        id: ContentId,
        payload: &ContentPayload,
        fingerprint: &str,
        context: &str,
        label: &str,
    ) {
        self.ledger.record(id, fingerprint);
        self.oplog
            .set_last_result(format!("{label}: payload prepared for post {id}"));
        self.debug(&format!("{label} prepared for post {id}"));
        self.snapshot(context, id, payload);
    }

    fn content_lock(&self, id: ContentId) -> ContentLock<'_> {
        let lock = self.content_locks.entry(id).or_default().clone();
        ContentLock {
            locks: &self.content_locks,
            id,
            lock,
        }
    }

    fn debug(&self, message: &str) {
        if self.config.debug_logs {
            self.oplog.debug(message, Utc::now());
        }
    }

    fn snapshot(&self, context: &str, id: ContentId, payload: &ContentPayload) {
        if self.config.debug_logs {
            self.oplog
                .snapshot(context, id, payload, &self.config.endpoint(), Utc::now());
        }
    }
}

/// Parse `endpoint` as an absolute http(s) URL and return its host.
fn validate_endpoint(endpoint: &str) -> Result<String, SendError> {
    let url = Url::parse(endpoint).map_err(|e| SendError::InvalidEndpoint(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SendError::InvalidEndpoint(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| SendError::InvalidEndpoint("endpoint has no host".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryContentSource;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned outcomes and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<TransportResponse, String>>>,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        fn with(outcomes: Vec<Result<u16, &str>>) -> Arc<Self> {
            let script = outcomes
                .into_iter()
                .map(|o| {
                    o.map(|status| TransportResponse {
                        status,
                        body: format!(r#"{{"status":{status}}}"#),
                    })
                    .map_err(str::to_string)
                })
                .collect();
            Arc::new(Self {
                script: Mutex::new(script),
                seen: Mutex::default(),
            })
        }

        fn ok() -> Arc<Self> {
            Self::with(Vec::new())
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, String> {
            self.seen.lock().unwrap().push(request);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(TransportResponse {
                status: 200,
                body: "{}".into(),
            }))
        }
    }

    fn config() -> SenderConfig {
        SenderConfig {
            enabled: true,
            auto_send: true,
            site_url: "https://origin.example".into(),
            base_url: "https://news.example/".into(),
            secret: "shared".into(),
            ensure_cdn_urls: false,
            debug_logs: true,
            ..Default::default()
        }
    }

    fn record(id: ContentId) -> ContentRecord {
        ContentRecord {
            id,
            post_type: "post".into(),
            status: "publish".into(),
            title: format!("Post {id}"),
            content_html: "<p>hi</p>".into(),
            permalink: format!("https://origin.example/p/{id}"),
            date: Some(Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap()),
            modified_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    fn dispatcher(
        config: SenderConfig,
        transport: Arc<ScriptedTransport>,
    ) -> (Dispatcher, Arc<MemoryContentSource>) {
        let source = Arc::new(MemoryContentSource::new());
        (Dispatcher::new(config, source.clone(), transport), source)
    }

    #[tokio::test(start_paused = true)]
    async fn content_locks_are_released_after_dispatch() {
        let (d, _) = dispatcher(config(), ScriptedTransport::ok());
        for id in 1..=5 {
            d.on_save(&record(id)).await;
        }
        assert_eq!(d.content_locks.len(), 0);

        let held = d.content_lock(7);
        let other = d.content_lock(7);
        drop(other);
        assert_eq!(d.content_locks.len(), 1);
        drop(held);
        assert_eq!(d.content_locks.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_record_is_sent_once() {
        let transport = ScriptedTransport::ok();
        let (d, _) = dispatcher(config(), transport.clone());
        let r = record(1);

        let first = d.on_save(&r).await;
        assert_eq!(first, Some(DeliveryResult::Sent { status: 200, attempts: 1 }));
        let second = d.on_save(&r).await;
        assert_eq!(second, Some(DeliveryResult::SkippedSameHash));
        assert_eq!(transport.calls(), 1);

        let sent = &transport.seen.lock().unwrap()[0];
        assert_eq!(sent.endpoint, "https://news.example/bridge/v1/ingest");
        let header = |name: &str| {
            sent.headers
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(header("x-origin-host").as_deref(), Some("origin.example"));
        let envelope = TransportEnvelope::from_headers(|n| {
            sent.headers.iter().find(|(k, _)| *k == n).map(|(_, v)| v.as_str())
        });
        assert!(envelope.verify(b"shared", &sent.body));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_fresh_envelopes_then_reports_last_failure() {
        let transport = ScriptedTransport::with(vec![Err("connection reset"), Ok(502), Ok(503), Ok(500)]);
        let (d, _) = dispatcher(config(), transport.clone());
        let started = tokio::time::Instant::now();

        let result = d.on_save(&record(1)).await;
        assert_eq!(
            result,
            Some(DeliveryResult::Error(SendError::Transport("connection reset".into())))
        );
        assert_eq!(transport.calls(), 4);
        // 500 + 1000 + 2000 ms
        assert_eq!(started.elapsed(), Duration::from_millis(3500));

        let seen = transport.seen.lock().unwrap();
        let nonces: std::collections::HashSet<_> = seen
            .iter()
            .filter_map(|r| r.headers.iter().find(|(n, _)| *n == "x-nonce").map(|(_, v)| v.clone()))
            .collect();
        assert_eq!(nonces.len(), 4);
        assert!(d.ledger().is_unsent(1));
        assert_eq!(d.operator_log().last_result(), "connection reset");
    }

    #[tokio::test(start_paused = true)]
    async fn non_2xx_exhaustion_returns_last_response() {
        let transport = ScriptedTransport::with(vec![Ok(500), Ok(409)]);
        let cfg = SenderConfig {
            max_retries: 1,
            ..config()
        };
        let (d, _) = dispatcher(cfg, transport.clone());
        let result = d.on_save(&record(1)).await;
        assert!(matches!(
            result,
            Some(DeliveryResult::Error(SendError::Http { status: 409, .. }))
        ));
        assert!(d
            .operator_log()
            .last_result()
            .starts_with("HTTP 409 (attempt 2)\n"));
    }

    #[tokio::test]
    async fn pre_flight_failures_make_no_request() {
        let transport = ScriptedTransport::ok();

        let self_target = SenderConfig {
            base_url: "https://ORIGIN.example".into(),
            ..config()
        };
        let (d, _) = dispatcher(self_target, transport.clone());
        assert_eq!(
            d.on_save(&record(1)).await,
            Some(DeliveryResult::Error(SendError::SelfTarget))
        );

        let bad_endpoint = SenderConfig {
            base_url: "news.example".into(),
            ..config()
        };
        let (d, _) = dispatcher(bad_endpoint, transport.clone());
        assert!(matches!(
            d.deliver(&ContentPayload::default()).await,
            Err(SendError::InvalidEndpoint(_))
        ));

        let no_secret = SenderConfig {
            secret: String::new(),
            ..config()
        };
        let (d, _) = dispatcher(no_secret, transport.clone());
        assert_eq!(
            d.on_save(&record(1)).await,
            Some(DeliveryResult::Error(SendError::MissingSecret))
        );

        let mut big = record(1);
        big.content_html = "x".repeat(70 * 1024);
        let small_limit = SenderConfig {
            max_payload_kb: 64,
            ..config()
        };
        let (small, _) = dispatcher(small_limit, transport.clone());
        assert!(matches!(
            small.on_save(&big).await,
            Some(DeliveryResult::Error(SendError::PayloadTooLarge { .. }))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn automatic_dispatch_filters() {
        let transport = ScriptedTransport::ok();
        let (d, _) = dispatcher(config(), transport.clone());

        let page = ContentRecord {
            post_type: "page".into(),
            ..record(1)
        };
        assert_eq!(d.on_save(&page).await, Some(DeliveryResult::SkippedWrongType));

        let draft = ContentRecord {
            status: "draft".into(),
            ..record(2)
        };
        assert_eq!(d.on_save(&draft).await, Some(DeliveryResult::SkippedWrongStatus));

        let remote = ContentRecord {
            remote_origin: true,
            ..record(3)
        };
        assert_eq!(d.on_save(&remote).await, Some(DeliveryResult::SkippedRemoteOrigin));

        let off = SenderConfig {
            auto_send: false,
            ..config()
        };
        let (quiet, _) = dispatcher(off, transport.clone());
        assert_eq!(quiet.on_save(&record(4)).await, None);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn dispatch_guard_blocks_reentry_for_one_version() {
        let set = DashSet::new();
        let first = DispatchGuard::acquire(&set, (1, 100));
        assert!(first.is_some());
        assert!(DispatchGuard::acquire(&set, (1, 100)).is_none());
        assert!(DispatchGuard::acquire(&set, (1, 101)).is_some());
        drop(first);
        assert!(DispatchGuard::acquire(&set, (1, 100)).is_some());
    }

    #[tokio::test]
    async fn dry_run_records_without_network() {
        let transport = ScriptedTransport::ok();
        let cfg = SenderConfig {
            sync_mode: SyncMode::DryRun,
            ..config()
        };
        let (d, _) = dispatcher(cfg, transport.clone());
        assert_eq!(d.on_save(&record(1)).await, Some(DeliveryResult::DryRun));
        assert_eq!(d.on_save(&record(1)).await, Some(DeliveryResult::SkippedSameHash));
        assert_eq!(transport.calls(), 0);
        assert_eq!(
            d.operator_log().last_result(),
            "Dry run: payload prepared for post 1"
        );
        assert_eq!(d.operator_log().snapshots()[0].context, "auto_dry_run");
    }

    #[tokio::test]
    async fn batch_mode_queues_then_drains() {
        let transport = ScriptedTransport::with(vec![Ok(200), Ok(500)]);
        let cfg = SenderConfig {
            sync_mode: SyncMode::Batch,
            batch_size: 2,
            max_retries: 0,
            ..config()
        };
        let (d, source) = dispatcher(cfg, transport.clone());
        for id in 1..=4 {
            source.insert(record(id));
            assert_eq!(d.on_save(&record(id)).await, Some(DeliveryResult::Queued));
        }
        assert_eq!(d.on_save(&record(1)).await, Some(DeliveryResult::Queued));
        assert_eq!(d.queue().len(), 4);
        assert_eq!(transport.calls(), 0);

        source.insert(ContentRecord {
            status: "draft".into(),
            ..record(3)
        });

        let report = d.process_batch_queue().await;
        assert_eq!(
            report,
            BatchReport {
                processed: 2,
                delivered: 1,
                dropped: 0,
                retained: 3,
            }
        );
        let queued: Vec<_> = d.queue().items().iter().map(|i| i.content_id).collect();
        assert_eq!(queued, [2, 3, 4]);

        let report = d.process_batch_queue().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 1);
        assert!(d.queue().is_empty());
    }

    #[tokio::test]
    async fn backfill_sends_oldest_unsent_first() {
        let transport = ScriptedTransport::ok();
        let cfg = SenderConfig {
            auto_send: false,
            ..config()
        };
        let (d, source) = dispatcher(cfg, transport.clone());
        for id in [3, 1, 2] {
            source.insert(record(id));
        }
        source.insert(ContentRecord {
            remote_origin: true,
            ..record(4)
        });
        d.ledger().record(2, "already-sent");

        let report = d
            .backfill(&BackfillFilter {
                batch_size: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.sent, 1);
        assert!(!d.ledger().is_unsent(1));

        let report = d.backfill(&BackfillFilter::default()).await.unwrap();
        assert_eq!(report.processed, 1);
        assert!(!d.ledger().is_unsent(3));
        assert!(d.ledger().is_unsent(4));

        let report = d.backfill(&BackfillFilter::default()).await.unwrap();
        assert_eq!(report.processed, 0);
        assert!(report.summary().starts_with("Backfill found no eligible"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn backfill_one_enforces_caller_filters() {
        let (d, _) = dispatcher(config(), ScriptedTransport::ok());
        let filter = BackfillFilter {
            status: Some("draft".into()),
            ..Default::default()
        };
        assert_eq!(
            d.backfill_one(&record(1), &filter).await,
            DeliveryResult::SkippedWrongStatus
        );
        let drafted = ContentRecord {
            status: "draft".into(),
            ..record(1)
        };
        assert!(d.backfill_one(&drafted, &filter).await.is_sent());

        let inactive = SenderConfig {
            enabled: false,
            ..config()
        };
        let (off, _) = dispatcher(inactive, ScriptedTransport::ok());
        assert_eq!(
            off.backfill_one(&record(1), &BackfillFilter::default()).await,
            DeliveryResult::Error(SendError::SenderInactive)
        );
        assert_eq!(
            off.backfill(&BackfillFilter::default()).await,
            Err(SendError::SenderInactive)
        );
    }

    #[tokio::test]
    async fn test_payload_reports_status() {
        let transport = ScriptedTransport::ok();
        let (d, _) = dispatcher(config(), transport.clone());
        let receipt = d.send_test_payload().await.unwrap();
        assert_eq!(receipt.status, 200);
        assert_eq!(
            d.operator_log().last_result(),
            "Test payload sent. Response code: 200"
        );
        let body = &transport.seen.lock().unwrap()[0].body;
        let sent: ContentPayload = serde_json::from_slice(body).unwrap();
        assert_eq!(sent.source_url, TEST_SOURCE_URL);
        assert!(sent.validate().is_ok());
    }

    #[test]
    fn backfill_filter_defaults() {
        let cfg = SenderConfig::default();
        let filter = BackfillFilter {
            status: Some("trash".into()),
            batch_size: 1000,
            ..Default::default()
        };
        assert_eq!(filter.post_type(&cfg), "post");
        assert_eq!(filter.status(), "publish");
        assert_eq!(filter.batch_size(), 200);
        assert_eq!(BackfillFilter::default().batch_size(), 25);
    }
}
