//! Errors produced while decoding and fingerprinting payloads.

use thiserror::Error;

/// Decoding failures for an inbound body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PayloadError {
    /// The body is not a JSON object matching the wire model.
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// A required field is absent or blank.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The payload could not be encoded for hashing or delivery.
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

impl PayloadError {
    /// Stable machine code used in responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            PayloadError::InvalidJson(_) => "invalid_json",
            PayloadError::MissingField(_) => "missing_field",
            PayloadError::Encode(_) => "encode_failed",
        }
    }
}
