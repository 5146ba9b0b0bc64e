//! Replay guard for signed bridge requests.
//!
//! The guard owns the checks that depend on shared, mutable state or on the
//! caller's identity:
//!
//! - fixed-window rate limiting keyed by the UTC minute
//! - exact-match caller IP allowlist
//! - self-origin rejection (a node must never ingest its own output)
//! - timestamp skew and single-use nonces
//!
//! Signature verification itself lives in `protocol::envelope`; the ingest
//! pipeline calls the guard around it in a fixed order and commits the nonce
//! only after the signature verifies. The commit is an atomic
//! check-and-set, so of two identical requests racing past the early
//! nonce check only one is accepted.
//!
//! All checks take `now` explicitly (unix seconds).
//!
//! ```
//! use std::sync::Arc;
//! use guard::{GuardConfig, MemoryReplayStore, ReplayGuard};
//!
//! let guard = ReplayGuard::new(GuardConfig::default(), Arc::new(MemoryReplayStore::new()));
//! let now = 1_700_000_000;
//! assert!(guard.check_timestamp_nonce(now - 10, "abc", now).is_ok());
//! assert!(guard.commit_nonce("abc", now).is_ok());
//! assert!(guard.check_timestamp_nonce(now, "abc", now).is_err());
//! ```

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

mod config;
mod error;
mod store;

pub use crate::config::{GuardConfig, MIN_NONCE_TTL_SECS};
pub use crate::error::GuardError;
pub use crate::store::{MemoryReplayStore, ReplayStore};

/// Stateful guard shared by every request handled by one receiver.
#[derive(Clone)]
pub struct ReplayGuard {
    config: GuardConfig,
    store: Arc<dyn ReplayStore>,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReplayGuard {
    pub fn new(config: GuardConfig, store: Arc<dyn ReplayStore>) -> Self {
        Self { config, store }
    }

    /// Guard with an in-process store.
    pub fn in_memory(config: GuardConfig) -> Self {
        Self::new(config, Arc::new(MemoryReplayStore::new()))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn check_rate_limit(&self, now: i64) -> Result<(), GuardError> {
        let limit = self.config.rate_limit_per_minute;
        if limit == 0 {
            return Ok(());
        }
        let window = minute_window(now);
        if self.store.hit_window(&window, limit) {
            Ok(())
        } else {
            debug!(window = %window, limit, "rate_limited");
            Err(GuardError::RateLimited)
        }
    }

    pub fn check_ip(&self, remote_addr: Option<&str>) -> Result<(), GuardError> {
        let mut allowed = self.config.allowlist().peekable();
        if allowed.peek().is_none() {
            return Ok(());
        }
        let remote = remote_addr.map(str::trim).unwrap_or_default();
        if !remote.is_empty() && allowed.any(|ip| ip == remote) {
            Ok(())
        } else {
            Err(GuardError::IpNotAllowed)
        }
    }

    /// Reject requests that declare this node's own host as their origin.
    pub fn check_origin(&self, declared: Option<&str>, local_host: &str) -> Result<(), GuardError> {
        match declared.map(str::trim) {
            Some(host) if !host.is_empty() && !local_host.is_empty() => {
                if host.eq_ignore_ascii_case(local_host.trim()) {
                    Err(GuardError::SelfOrigin)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Skew and freshness check. Does not record the nonce.
    pub fn check_timestamp_nonce(
        &self,
        timestamp: i64,
        nonce: &str,
        now: i64,
    ) -> Result<(), GuardError> {
        if timestamp == 0 || nonce.is_empty() {
            return Err(GuardError::InvalidTimestampOrNonce);
        }
        if now.abs_diff(timestamp) > self.config.clock_skew_secs {
            debug!(timestamp, now, "timestamp_outside_skew");
            return Err(GuardError::InvalidTimestampOrNonce);
        }
        if self.store.nonce_seen(&nonce_key(nonce), now) {
            debug!("nonce_replayed");
            return Err(GuardError::InvalidTimestampOrNonce);
        }
        Ok(())
    }

    /// Remember `nonce` for the configured TTL. Fails if another request
    /// claimed it first.
    pub fn commit_nonce(&self, nonce: &str, now: i64) -> Result<(), GuardError> {
        if self
            .store
            .claim_nonce(&nonce_key(nonce), now, self.config.effective_nonce_ttl())
        {
            Ok(())
        } else {
            Err(GuardError::InvalidTimestampOrNonce)
        }
    }
}

/// UTC minute bucket, `YYYYMMDDHHMM`.
pub fn minute_window(now: i64) -> String {
    Utc.timestamp_opt(now, 0)
        .single()
        .map(|t| t.format("%Y%m%d%H%M").to_string())
        .unwrap_or_else(|| (now / 60).to_string())
}

fn nonce_key(nonce: &str) -> String {
    hex::encode(Sha256::digest(nonce.as_bytes()))
}
