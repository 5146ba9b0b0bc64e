//! Error types produced by the sender.
//!
//! Only [`SendError::Transport`] and [`SendError::Http`] come out of the
//! network and are retried; everything else is a pre-flight failure that
//! stops the dispatch before any request is made.
use canonical::CanonicalError;
use protocol::PayloadError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendError {
    #[error("missing source URL for content")]
    MissingPermalink,

    #[error("CDN base is required when CDN enforcement is enabled")]
    CdnBaseMissing,

    #[error("detected non-CDN image URL in payload: {url}")]
    NonCdnUrl { url: String },

    #[error("failed to process content markup: {0}")]
    Markup(String),

    #[error("failed to encode payload: {0}")]
    EncodeFailed(String),

    #[error("invalid sender endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("sender endpoint cannot target the same site")]
    SelfTarget,

    #[error("payload of {bytes} bytes exceeds sender limit of {limit} bytes")]
    PayloadTooLarge { bytes: usize, limit: usize },

    #[error("missing sender endpoint or secret")]
    MissingSecret,

    #[error("sender mode is not active")]
    SenderInactive,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("receiver answered HTTP {status}")]
    Http { status: u16, body: String },
}

impl SendError {
    pub fn code(&self) -> &'static str {
        match self {
            SendError::MissingPermalink => "missing_permalink",
            SendError::CdnBaseMissing => "cdn_base_missing",
            SendError::NonCdnUrl { .. } => "non_cdn_url",
            SendError::Markup(_) => "markup_error",
            SendError::EncodeFailed(_) => "encode_failed",
            SendError::InvalidEndpoint(_) => "invalid_endpoint",
            SendError::SelfTarget => "self_target",
            SendError::PayloadTooLarge { .. } => "payload_too_large",
            SendError::MissingSecret => "missing_secret",
            SendError::SenderInactive => "sender_inactive",
            SendError::Transport(_) => "transport_error",
            SendError::Http { .. } => "http_error",
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Transport(_) | SendError::Http { .. })
    }
}

impl From<CanonicalError> for SendError {
    fn from(err: CanonicalError) -> Self {
        match err {
            CanonicalError::CdnBaseMissing => SendError::CdnBaseMissing,
            CanonicalError::NonCdnUrl { url } => SendError::NonCdnUrl { url },
            other => SendError::Markup(other.to_string()),
        }
    }
}

impl From<PayloadError> for SendError {
    fn from(err: PayloadError) -> Self {
        SendError::EncodeFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_retry() {
        assert!(SendError::Transport("reset".into()).is_retryable());
        assert!(SendError::Http {
            status: 502,
            body: String::new()
        }
        .is_retryable());
        assert!(!SendError::SelfTarget.is_retryable());
        assert!(!SendError::PayloadTooLarge { bytes: 2, limit: 1 }.is_retryable());
    }

    #[test]
    fn canonical_errors_map_to_send_codes() {
        assert_eq!(
            SendError::from(CanonicalError::NonCdnUrl {
                url: "https://x.example/a.png".into()
            })
            .code(),
            "non_cdn_url"
        );
        assert_eq!(
            SendError::from(CanonicalError::CdnBaseMissing),
            SendError::CdnBaseMissing
        );
    }
}
