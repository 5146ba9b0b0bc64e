//! Content bridge wire protocol.
//!
//! Shared between the sending and receiving side of the bridge:
//!
//! - [`ContentPayload`] and friends: the JSON document that travels on the wire
//! - [`envelope`]: HMAC-SHA256 signing of `timestamp\nnonce\nbody` and the
//!   header names that carry it
//! - [`hash`]: `source_hash`, deterministic `ingest_id` and the payload
//!   fingerprint used to skip unchanged content
//!
//! ```
//! use protocol::{ContentPayload, TransportEnvelope};
//!
//! let payload = ContentPayload {
//!     ingest_id: "7b1f".into(),
//!     source_url: "https://origin.example/hello".into(),
//!     title: "Hello".into(),
//!     content_html: "<p>hi</p>".into(),
//!     ..Default::default()
//! };
//! let body = serde_json::to_vec(&payload).unwrap();
//! let envelope = TransportEnvelope::seal(b"secret", &body, Some("origin.example"), 1_700_000_000);
//! assert!(envelope.verify(b"secret", &body));
//! assert_eq!(ContentPayload::from_slice(&body).unwrap(), payload);
//! ```

pub mod envelope;
mod error;
pub mod hash;
mod types;

pub use crate::envelope::TransportEnvelope;
pub use crate::error::PayloadError;
pub use crate::hash::{derive_ingest_id, hash_text, payload_fingerprint, source_hash};
pub use crate::types::{
    Author, ContentPayload, FeaturedImage, IngestResponse, MediaItem, REQUIRED_FIELDS,
};
