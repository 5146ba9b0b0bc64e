//! Error types produced by the receiver.
//!
//! Every rejection the pipeline can produce is an [`IngestError`] variant with
//! a stable wire code ([`IngestError::code`]) and exactly one HTTP status
//! ([`IngestError::http_status`]).
//!
//! | Code | Status |
//! |------|--------|
//! | `receiver_disabled` | 503 |
//! | `tls_required` | 400 |
//! | `missing_secret` | 500 |
//! | `rate_limited` | 429 |
//! | `ip_not_allowed` | 403 |
//! | `empty_body` | 400 |
//! | `payload_too_large` | 413 |
//! | `self_origin_rejected` | 409 |
//! | `invalid_timestamp_or_nonce` | 401 |
//! | `invalid_signature` | 401 |
//! | `invalid_json` | 400 |
//! | `missing_field` | 400 |
//! | `media_domain_not_allowed` | 400 |
//! | `store_error` | 500 |
//!
//! ```rust
//! use ingest::IngestError;
//!
//! let err = IngestError::MissingField("title");
//! assert_eq!(err.code(), "missing_field");
//! assert_eq!(err.http_status(), 400);
//! assert_eq!(err.field(), Some("title"));
//! ```
use guard::GuardError;
use protocol::{IngestResponse, PayloadError};
use thiserror::Error;

use crate::store::StoreError;

/// Reasons an inbound request is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    #[error("receiver is disabled")]
    ReceiverDisabled,

    #[error("request did not arrive over TLS")]
    TlsRequired,

    #[error("receiver secret is not configured")]
    MissingSecret,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("caller address is not allowed")]
    IpNotAllowed,

    #[error("request body is empty")]
    EmptyBody,

    /// Body longer than the configured limit (inclusive).
    #[error("payload of {bytes} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { bytes: usize, limit: usize },

    #[error("request originates from this node")]
    SelfOrigin,

    #[error("invalid timestamp or nonce")]
    InvalidTimestampOrNonce,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("payload missing required field `{0}`")]
    MissingField(&'static str),

    /// A referenced media URL is served from a host outside the allowlist.
    #[error("media domain not allowed: {url}")]
    MediaDomainNotAllowed { url: String },

    /// The content store failed while applying the payload.
    #[error("upsert failed: {0}")]
    Store(String),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::ReceiverDisabled => "receiver_disabled",
            IngestError::TlsRequired => "tls_required",
            IngestError::MissingSecret => "missing_secret",
            IngestError::RateLimited => "rate_limited",
            IngestError::IpNotAllowed => "ip_not_allowed",
            IngestError::EmptyBody => "empty_body",
            IngestError::PayloadTooLarge { .. } => "payload_too_large",
            IngestError::SelfOrigin => "self_origin_rejected",
            IngestError::InvalidTimestampOrNonce => "invalid_timestamp_or_nonce",
            IngestError::InvalidSignature => "invalid_signature",
            IngestError::InvalidJson(_) => "invalid_json",
            IngestError::MissingField(_) => "missing_field",
            IngestError::MediaDomainNotAllowed { .. } => "media_domain_not_allowed",
            IngestError::Store(_) => "store_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            IngestError::ReceiverDisabled => 503,
            IngestError::MissingSecret | IngestError::Store(_) => 500,
            IngestError::RateLimited => 429,
            IngestError::IpNotAllowed => 403,
            IngestError::PayloadTooLarge { .. } => 413,
            IngestError::SelfOrigin => 409,
            IngestError::InvalidTimestampOrNonce | IngestError::InvalidSignature => 401,
            IngestError::TlsRequired
            | IngestError::EmptyBody
            | IngestError::InvalidJson(_)
            | IngestError::MissingField(_)
            | IngestError::MediaDomainNotAllowed { .. } => 400,
        }
    }

    /// Name of the offending payload field, for `missing_field`.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            IngestError::MissingField(field) => Some(field),
            _ => None,
        }
    }

    /// Response body sent back to the sender.
    pub fn to_response(&self) -> IngestResponse {
        IngestResponse::rejected(self.code(), self.field())
    }
}

impl From<GuardError> for IngestError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::RateLimited => IngestError::RateLimited,
            GuardError::IpNotAllowed => IngestError::IpNotAllowed,
            GuardError::SelfOrigin => IngestError::SelfOrigin,
            GuardError::InvalidTimestampOrNonce => IngestError::InvalidTimestampOrNonce,
            other => IngestError::Store(other.to_string()),
        }
    }
}

impl From<PayloadError> for IngestError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::MissingField(field) => IngestError::MissingField(field),
            PayloadError::InvalidJson(msg) | PayloadError::Encode(msg) => {
                IngestError::InvalidJson(msg)
            }
            other => IngestError::InvalidJson(other.to_string()),
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Store(err.to_string())
    }
}
