//! Content bridge receiver.
//!
//! Signed deliveries from a sending node enter here. Each one is admitted,
//! verified and parsed, then reconciled against the local content store so
//! that replaying the same payload never creates a duplicate.
//!
//! ## What we do here
//!
//! - **Admission** - enabled flag, TLS, shared secret, per-minute rate limit,
//!   IP allowlist and a hard body-size limit
//! - **Authentication** - timestamp window, single-use nonces and an
//!   HMAC-SHA256 signature over `timestamp\nnonce\nbody`
//! - **Validation** - required fields and the media-domain allowlist
//! - **Reconciliation** - find the existing item by `ingest_id` (or the
//!   configured source key), skip unchanged content, create or update,
//!   then map taxonomies and the featured image
//! - **History** - a bounded operator log plus structured `tracing` events
//!
//! ## Main entry point
//!
//! Build an [`IngestPipeline`] and hand it an [`InboundRequest`]. The
//! pipeline never panics on bad input: every rejection is an
//! [`IngestError`] carrying a stable code and HTTP status.
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use ingest::{IngestPipeline, InboundRequest, ReceiverConfig};
//! use protocol::TransportEnvelope;
//!
//! let config = ReceiverConfig {
//!     enabled: true,
//!     secret: "shared".into(),
//!     require_tls: false,
//!     reject_non_allowed_media: false,
//!     ..Default::default()
//! };
//! let pipeline = IngestPipeline::in_memory(config);
//!
//! let body = br#"{"ingest_id":"a1","source_url":"https://origin.example/p/1","title":"Hi","content_html":"<p>x</p>"}"#;
//! let now = Utc::now();
//! let request = InboundRequest {
//!     body,
//!     envelope: TransportEnvelope::seal(b"shared", body, Some("origin.example"), now.timestamp()),
//!     remote_addr: Some("127.0.0.1".into()),
//!     secure: false,
//! };
//!
//! let (status, response) = pipeline.respond(&request, now);
//! assert_eq!(status, 200);
//! assert_eq!(response.action.as_deref(), Some("created"));
//! ```

mod author;
mod config;
mod error;
mod featured;
pub mod keys;
mod log;
mod pipeline;
pub mod store;
mod taxonomy;
mod upsert;

pub use crate::config::{
    AuthorMode, ConfigError, DedupMode, FeaturedImageMode, ReceiverConfig, UpdateStrategy,
    ALLOWED_STATUSES, MAX_PAYLOAD_KB, MIN_PAYLOAD_KB,
};
pub use crate::error::IngestError;
pub use crate::featured::FeaturedOutcome;
pub use crate::log::{
    compact_context, ContentInsight, EventLog, LogEntry, LogStatus, MAX_LOGGED_HOSTS,
};
pub use crate::pipeline::{InboundRequest, IngestPipeline};
pub use crate::store::{
    AuthorDirectory, ContentStore, MediaStore, MemoryAuthorDirectory, MemoryContentStore,
    MemoryMediaStore, StoreError,
};
pub use crate::taxonomy::TaxonomyReport;
pub use crate::upsert::{ReconciliationOutcome, UpsertAction, UpsertEngine};
