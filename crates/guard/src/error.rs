use thiserror::Error;

/// Reasons the guard refuses a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GuardError {
    #[error("rate limit exceeded for the current minute")]
    RateLimited,

    #[error("caller address is not on the allowlist")]
    IpNotAllowed,

    #[error("request declares this node as its origin")]
    SelfOrigin,

    /// Stale or future timestamp, missing nonce, or a nonce already used.
    #[error("invalid timestamp or nonce")]
    InvalidTimestampOrNonce,

    #[error("invalid guard configuration: {0}")]
    InvalidConfig(String),
}

impl GuardError {
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::RateLimited => "rate_limited",
            GuardError::IpNotAllowed => "ip_not_allowed",
            GuardError::SelfOrigin => "self_origin_rejected",
            GuardError::InvalidTimestampOrNonce => "invalid_timestamp_or_nonce",
            GuardError::InvalidConfig(_) => "invalid_config",
        }
    }
}
