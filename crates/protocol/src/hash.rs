//! Content hashes and identifiers.
//!
//! ```text
//! source_hash  = SHA-256(modified_at "|" title "|" content_html)
//! ingest_id    = UUIDv5(INGEST_NAMESPACE, source_url "\0" source_hash)
//! fingerprint  = SHA-256(json(payload with ingest_id blanked))
//! ```
//!
//! `source_hash` changes whenever the origin record is edited, so a fresh
//! version always gets a fresh `ingest_id`, while a retransmission of the
//! same version keeps it and is recognised as a duplicate downstream.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::PayloadError;
use crate::types::ContentPayload;

/// Namespace for deterministic ingest ids.
pub const INGEST_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_6f4a_9b3d_4e2a_8f71_0d2c_b6a4_93e1);

/// Hash arbitrary text with SHA-256 and return a hex digest.
pub fn hash_text(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of the editable state of a record.
pub fn source_hash(modified_at: DateTime<Utc>, title: &str, content_html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        modified_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .as_bytes(),
    );
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(content_html.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic id for one version of one origin record.
pub fn derive_ingest_id(source_url: &str, source_hash: &str) -> String {
    let mut material = Vec::with_capacity(source_url.len() + source_hash.len() + 1);
    material.extend_from_slice(source_url.as_bytes());
    material.push(0);
    material.extend_from_slice(source_hash.as_bytes());
    Uuid::new_v5(&INGEST_NAMESPACE, &material).to_string()
}

/// Fingerprint used to skip re-sending unchanged content.
///
/// `ingest_id` is excluded so the fingerprint depends only on content.
pub fn payload_fingerprint(payload: &ContentPayload) -> Result<String, PayloadError> {
    let mut view = payload.clone();
    view.ingest_id.clear();
    let encoded = serde_json::to_vec(&view).map_err(|e| PayloadError::Encode(e.to_string()))?;
    Ok(hash_bytes(&encoded))
}
