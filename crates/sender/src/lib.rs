//! Content bridge sender.
//!
//! Turns local content records into signed payloads and delivers them to a
//! receiving node. Delivery is at-least-once; the receiver's idempotent
//! upsert makes repeats harmless, and the sender's own fingerprint ledger
//! keeps unchanged content from being sent twice.
//!
//! ## Flow
//!
//! 1. [`build_payload`] rewrites attachment images to canonical URLs,
//!    enforces the CDN host policy and assembles a [`protocol::ContentPayload`]
//! 2. the payload fingerprint is compared with the [`DeliveryLedger`]
//! 3. depending on [`SyncMode`] the payload is delivered inline, queued for
//!    the [`Scheduler`], or only recorded (dry run)
//! 4. delivery signs every attempt with a fresh timestamp and nonce and
//!    retries with capped exponential backoff
//!
//! Backfill ([`Dispatcher::backfill`]) walks unsent records oldest-first
//! through the same path.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use sender::{
//!     ContentRecord, DeliveryResult, Dispatcher, MemoryContentSource, OutboundRequest,
//!     SenderConfig, SyncMode, Transport, TransportResponse,
//! };
//!
//! struct Unreachable;
//!
//! #[async_trait]
//! impl Transport for Unreachable {
//!     async fn post(&self, _: OutboundRequest) -> Result<TransportResponse, String> {
//!         Err("no network in dry run".into())
//!     }
//! }
//!
//! let config = SenderConfig {
//!     enabled: true,
//!     auto_send: true,
//!     sync_mode: SyncMode::DryRun,
//!     site_url: "https://origin.example".into(),
//!     base_url: "https://news.example".into(),
//!     secret: "shared".into(),
//!     cdn_base: "https://cdn.example".into(),
//!     ..Default::default()
//! };
//! let dispatcher = Dispatcher::new(config, Arc::new(MemoryContentSource::new()), Arc::new(Unreachable));
//!
//! let record = ContentRecord {
//!     id: 1,
//!     post_type: "post".into(),
//!     status: "publish".into(),
//!     title: "Hello".into(),
//!     content_html: "<p>Hello</p>".into(),
//!     permalink: "https://origin.example/hello".into(),
//!     ..Default::default()
//! };
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .unwrap();
//! runtime.block_on(async {
//!     assert_eq!(dispatcher.on_save(&record).await, Some(DeliveryResult::DryRun));
//!     assert_eq!(dispatcher.on_save(&record).await, Some(DeliveryResult::SkippedSameHash));
//! });
//! ```

mod build;
mod config;
mod dispatch;
mod error;
mod ledger;
mod oplog;
mod queue;
mod retry;
mod scheduler;
mod source;
mod transport;

pub use crate::build::{build_payload, BuiltPayload};
pub use crate::config::{
    ConfigError, ScheduleInterval, SenderConfig, SyncMode, DEFAULT_INGEST_PATH, MAX_BACKOFF,
    MIN_PAYLOAD_KB,
};
pub use crate::dispatch::{
    BackfillFilter, BackfillReport, BatchReport, DeliveryReceipt, DeliveryResult, DispatchGuard,
    Dispatcher,
};
pub use crate::error::SendError;
pub use crate::ledger::{DeliveryLedger, MemoryLedger};
pub use crate::oplog::{
    mask_email, OperatorLog, PayloadSnapshot, MAX_DEBUG_LINES, MAX_SNAPSHOTS,
    SNAPSHOT_CONTENT_LIMIT, SNAPSHOT_MANIFEST_LIMIT,
};
pub use crate::queue::{BatchQueue, MemoryBatchQueue, QueueItem};
pub use crate::retry::{execute_with_retry_async, RetryPolicy, RetryResult, Retryable};
pub use crate::scheduler::{Scheduler, SchedulerHandle, FIRST_TICK_DELAY};
pub use crate::source::{CandidateQuery, ContentId, ContentRecord, ContentSource, MemoryContentSource};
#[cfg(feature = "http")]
pub use crate::transport::HttpTransport;
pub use crate::transport::{OutboundRequest, Transport, TransportResponse};
