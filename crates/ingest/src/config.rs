//! Configuration types for the receiver.
//!
//! [`ReceiverConfig`] controls every decision the ingest pipeline makes: which
//! requests are admitted, how payloads are cleaned and how they are merged
//! into the content store. It embeds the guard and sanitizer settings so a
//! single serialized block configures the whole receiver.
//!
//! # Quick Start
//!
//! ```rust
//! use ingest::ReceiverConfig;
//!
//! let config = ReceiverConfig {
//!     enabled: true,
//!     secret: "shared-secret".into(),
//!     local_host: "news.example".into(),
//!     ..Default::default()
//! };
//! config.validate().expect("valid receiver configuration");
//! assert_eq!(config.max_payload_bytes(), 512 * 1024);
//! ```
use canonical::{MappingRules, SanitizeConfig};
use guard::GuardConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted body limit, in KiB.
pub const MIN_PAYLOAD_KB: u64 = 64;
/// Largest accepted body limit, in KiB.
pub const MAX_PAYLOAD_KB: u64 = 10 * 1024;

/// Statuses the receiver is willing to store.
pub const ALLOWED_STATUSES: [&str; 3] = ["publish", "pending", "draft"];

/// Runtime configuration for the receiver.
///
/// Defaults match a freshly installed receiver: disabled, TLS required,
/// incoming content stored as `pending` posts owned by a fixed author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Master switch. A disabled receiver answers every request with
    /// `receiver_disabled`.
    pub enabled: bool,

    /// Shared HMAC secret. An empty secret rejects every request with
    /// `missing_secret`.
    #[serde(skip_serializing)]
    pub secret: String,

    /// This node's public host, used to refuse requests that claim to come
    /// from ourselves.
    pub local_host: String,

    /// Refuse requests that did not arrive over TLS.
    ///
    /// Default: `true`
    pub require_tls: bool,

    /// Body limit in KiB. Values below [`MIN_PAYLOAD_KB`] are raised to it.
    ///
    /// Default: `512`
    pub max_payload_kb: u64,

    /// Replay and admission settings.
    pub guard: GuardConfig,

    /// Content type every ingested item is stored as.
    ///
    /// Default: `"post"`
    pub post_type: String,

    /// Status given to ingested content unless the sender may override it.
    ///
    /// Default: `"pending"`
    pub default_status: String,

    /// Honour the `status` field of the payload.
    pub allow_sender_status_override: bool,

    pub author_mode: AuthorMode,

    /// Author used when no other mode resolves one. `0` means none.
    pub fixed_author_id: u64,

    pub dedup_mode: DedupMode,

    /// Meta key under which the origin URL is stamped and looked up.
    ///
    /// Default: `"_bridge_source_url"`
    pub source_url_meta_key: String,

    pub update_strategy: UpdateStrategy,

    pub auto_create_categories: bool,
    pub auto_create_tags: bool,

    /// `source -> destination` category rename rules, one per line.
    pub category_mapping_rules: String,

    /// Lowercase and trim category and tag names.
    pub tag_normalization: bool,

    /// Hosts media may be served from.
    pub allowed_media_domains: Vec<String>,

    /// Reject payloads that reference media outside
    /// [`allowed_media_domains`](Self::allowed_media_domains).
    ///
    /// Default: `true`
    pub reject_non_allowed_media: bool,

    pub featured_image_mode: FeaturedImageMode,

    /// Prepend the featured image to bodies that show no image.
    ///
    /// Default: `true`
    pub prepend_featured_if_missing: bool,

    pub sanitize: SanitizeConfig,

    /// Keep the operator-visible ingest history.
    pub enable_log: bool,

    /// Sizes the ingest history; see [`ReceiverConfig::log_capacity`].
    ///
    /// Default: `30`
    pub retain_logs_days: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            local_host: String::new(),
            require_tls: true,
            max_payload_kb: 512,
            guard: GuardConfig::default(),
            post_type: "post".into(),
            default_status: "pending".into(),
            allow_sender_status_override: false,
            author_mode: AuthorMode::FixedAuthor,
            fixed_author_id: 0,
            dedup_mode: DedupMode::SourceUrl,
            source_url_meta_key: crate::keys::DEFAULT_SOURCE_URL.into(),
            update_strategy: UpdateStrategy::OverwriteAll,
            auto_create_categories: true,
            auto_create_tags: true,
            category_mapping_rules: String::new(),
            tag_normalization: true,
            allowed_media_domains: Vec::new(),
            reject_non_allowed_media: true,
            featured_image_mode: FeaturedImageMode::MetaOnly,
            prepend_featured_if_missing: true,
            sanitize: SanitizeConfig::default(),
            enable_log: false,
            retain_logs_days: 30,
        }
    }
}

/// How the owner of ingested content is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorMode {
    #[default]
    FixedAuthor,
    /// Match the payload author's name against logins, then display names.
    ByName,
    ByEmail,
    /// Any editor at random, else the first administrator.
    RandomEditor,
}

/// Keys used to find the existing copy of an incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DedupMode {
    #[default]
    #[serde(rename = "source_url")]
    SourceUrl,
    /// Prefer an item matching both `source_url` and `source_hash`, then fall
    /// back to `source_url` alone.
    #[serde(rename = "source_hash+source_url")]
    SourceHashAndUrl,
}

/// What happens to local edits when the origin sends an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    #[default]
    OverwriteAll,
    /// Keep title, body and excerpt when the item is locked or was edited
    /// locally after the last ingest.
    PreserveManualEdits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeaturedImageMode {
    /// Record url/alt/size as meta only.
    #[default]
    MetaOnly,
    /// Find or sideload a media item and make it the primary image.
    VirtualAttachment,
}

impl FeaturedImageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeaturedImageMode::MetaOnly => "meta_only",
            FeaturedImageMode::VirtualAttachment => "virtual_attachment",
        }
    }
}

/// Configuration errors raised by [`ReceiverConfig::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

impl ReceiverConfig {
    /// Inclusive body limit in bytes.
    pub fn max_payload_bytes(&self) -> usize {
        (self.max_payload_kb.max(MIN_PAYLOAD_KB) * 1024) as usize
    }

    /// Number of entries the ingest history keeps: twenty per retained day,
    /// between 50 and 1000.
    pub fn log_capacity(&self) -> usize {
        (self.retain_logs_days as usize * 20).clamp(50, 1000)
    }

    pub fn mapping_rules(&self) -> MappingRules {
        MappingRules::parse(&self.category_mapping_rules)
    }

    /// Check the configuration for values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the post type or source-url
    /// key is blank, the default status is not one of [`ALLOWED_STATUSES`],
    /// the body limit exceeds [`MAX_PAYLOAD_KB`], or the guard settings are
    /// invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.post_type.trim().is_empty() {
            return Err(ConfigError::InvalidValue("post_type must not be empty".into()));
        }
        if self.source_url_meta_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "source_url_meta_key must not be empty".into(),
            ));
        }
        if !ALLOWED_STATUSES.contains(&self.default_status.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "default_status must be one of {ALLOWED_STATUSES:?}, got {:?}",
                self.default_status
            )));
        }
        if self.max_payload_kb > MAX_PAYLOAD_KB {
            return Err(ConfigError::InvalidValue(format!(
                "max_payload_kb ({}) exceeds {MAX_PAYLOAD_KB}",
                self.max_payload_kb
            )));
        }
        self.guard
            .validate()
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        Ok(())
    }
}
