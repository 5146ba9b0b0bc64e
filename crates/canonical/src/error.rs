//! Error types for the normalization layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// The HTML rewriter gave up on the document.
    #[error("html processing failed: {0}")]
    Html(String),

    /// CDN enforcement is on but no CDN host is configured.
    #[error("cdn base is required when cdn enforcement is enabled")]
    CdnBaseMissing,

    /// An image URL points somewhere other than the CDN.
    #[error("non-cdn image url in payload: {url}")]
    NonCdnUrl { url: String },

    /// A media URL's host is not on the receiver's allowlist.
    #[error("media domain not allowed: {url}")]
    MediaDomainNotAllowed { url: String },
}

impl CanonicalError {
    pub fn code(&self) -> &'static str {
        match self {
            CanonicalError::Html(_) => "html_error",
            CanonicalError::CdnBaseMissing => "cdn_base_missing",
            CanonicalError::NonCdnUrl { .. } => "non_cdn_url",
            CanonicalError::MediaDomainNotAllowed { .. } => "media_domain_not_allowed",
        }
    }
}

impl From<lol_html::errors::RewritingError> for CanonicalError {
    fn from(err: lol_html::errors::RewritingError) -> Self {
        CanonicalError::Html(err.to_string())
    }
}
