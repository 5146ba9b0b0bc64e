//! Configuration types for the sender.
//!
//! ```rust
//! use sender::{SenderConfig, SyncMode};
//!
//! let config = SenderConfig {
//!     enabled: true,
//!     site_url: "https://origin.example".into(),
//!     base_url: "https://news.example/".into(),
//!     secret: "shared-secret".into(),
//!     sync_mode: SyncMode::Batch,
//!     ..Default::default()
//! };
//! config.validate().expect("valid sender configuration");
//! assert_eq!(config.endpoint(), "https://news.example/bridge/v1/ingest");
//! ```
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INGEST_PATH: &str = "/bridge/v1/ingest";

/// Smallest body limit the sender will honour, in KiB.
pub const MIN_PAYLOAD_KB: u64 = 64;

/// Ceiling for a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(3000);

const MIN_BACKOFF_MS: u64 = 100;
const MIN_TIMEOUT_SECS: u64 = 3;
const STATUSES: [&str; 3] = ["publish", "pending", "draft"];

/// Runtime configuration for the sending node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Whether this node acts as a sender at all.
    pub enabled: bool,

    /// This node's own public URL. Its host is announced as the origin host
    /// and a target on the same host is refused.
    pub site_url: String,

    /// Receiver base URL; a trailing `/` is ignored.
    pub base_url: String,

    /// Path appended to `base_url`.
    ///
    /// Default: `/bridge/v1/ingest`
    pub ingest_path: String,

    #[serde(skip_serializing)]
    pub secret: String,

    /// Per-attempt timeout in seconds, never below 3.
    pub timeout_secs: u64,

    /// Retries after the first attempt.
    pub max_retries: u32,

    /// First backoff delay in milliseconds, never below 100.
    pub backoff_base_ms: u64,

    /// Only records of this type are dispatched automatically.
    pub target_post_type: String,

    /// Status requested on the receiving side.
    pub default_status: String,

    pub include_author: bool,
    pub send_taxonomies: bool,

    /// CDN base URL; its host is the only host images may use when
    /// `ensure_cdn_urls` is on.
    pub cdn_base: String,
    pub ensure_cdn_urls: bool,

    pub sync_mode: SyncMode,

    /// Queue items delivered per scheduler tick.
    pub batch_size: usize,
    pub schedule_interval: ScheduleInterval,

    /// Dispatch on every save. Backfill ignores this flag.
    pub auto_send: bool,

    /// Keep operator debug lines and payload snapshots.
    pub debug_logs: bool,

    /// Body limit in KiB, never below [`MIN_PAYLOAD_KB`].
    pub max_payload_kb: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            site_url: String::new(),
            base_url: String::new(),
            ingest_path: DEFAULT_INGEST_PATH.to_string(),
            secret: String::new(),
            timeout_secs: 15,
            max_retries: 3,
            backoff_base_ms: 500,
            target_post_type: "post".to_string(),
            default_status: "pending".to_string(),
            include_author: false,
            send_taxonomies: true,
            cdn_base: String::new(),
            ensure_cdn_urls: true,
            sync_mode: SyncMode::Immediate,
            batch_size: 10,
            schedule_interval: ScheduleInterval::FiveMinutes,
            auto_send: false,
            debug_logs: false,
            max_payload_kb: 512,
        }
    }
}

/// How automatic dispatch hands payloads off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Deliver inline.
    #[default]
    Immediate,
    /// Enqueue for the scheduler.
    Batch,
    /// Build and record the fingerprint, no network I/O.
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleInterval {
    #[default]
    FiveMinutes,
    FifteenMinutes,
    Hourly,
}

impl ScheduleInterval {
    pub fn period(&self) -> Duration {
        match self {
            ScheduleInterval::FiveMinutes => Duration::from_secs(5 * 60),
            ScheduleInterval::FifteenMinutes => Duration::from_secs(15 * 60),
            ScheduleInterval::Hourly => Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

impl SenderConfig {
    /// Receiver endpoint: `base_url` without trailing `/` plus `ingest_path`.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.ingest_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms.max(MIN_BACKOFF_MS))
    }

    pub fn max_payload_bytes(&self) -> usize {
        (self.max_payload_kb.max(MIN_PAYLOAD_KB) * 1024) as usize
    }

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Status sent on the wire, lowercased and trimmed.
    pub fn wire_status(&self) -> String {
        self.default_status.trim().to_ascii_lowercase()
    }

    /// Whether automatic dispatch and queue draining are active.
    pub fn auto_dispatch(&self) -> bool {
        self.enabled && self.auto_send
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ingest_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "ingest_path must start with '/': {:?}",
                self.ingest_path
            )));
        }
        if !STATUSES.contains(&self.wire_status().as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "default_status must be one of publish, pending, draft: {:?}",
                self.default_status
            )));
        }
        if self.target_post_type.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "target_post_type must not be empty".into(),
            ));
        }
        if self.enabled && self.ensure_cdn_urls && canonical::host_of(&self.cdn_base).is_none() {
            return Err(ConfigError::InvalidValue(
                "cdn_base with a host is required when ensure_cdn_urls is on".into(),
            ));
        }
        Ok(())
    }
}
