//! YAML configuration for a bridge node.
//!
//! One file configures both roles. Top-level `site_url` and `secret` are
//! shared defaults: they fill the sender's `site_url` / `secret` and the
//! receiver's `local_host` / `secret` wherever those are left empty. The
//! `BRIDGE_SECRET` environment variable, when set, replaces both secrets.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! mode: both
//! site_url: "https://origin.example"
//! secret: "change-me"
//!
//! sender:
//!   enabled: true
//!   base_url: "https://news.example"
//!   cdn_base: "https://cdn.example"
//!   sync_mode: batch
//!   schedule_interval: fifteen_minutes
//!   auto_send: true
//!
//! receiver:
//!   enabled: true
//!   require_tls: true
//!   dedup_mode: ingest_id
//!   allowed_media_domains: ["cdn.example"]
//!   guard:
//!     clock_skew_secs: 300
//!     rate_limit_per_minute: 120
//! ```

use std::fs;
use std::path::Path;

use ingest::ReceiverConfig;
use sender::SenderConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding both shared secrets.
pub const SECRET_ENV: &str = "BRIDGE_SECRET";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Which roles this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BridgeMode {
    Sender,
    Receiver,
    #[default]
    Both,
}

impl BridgeMode {
    pub fn sends(&self) -> bool {
        matches!(self, BridgeMode::Sender | BridgeMode::Both)
    }

    pub fn receives(&self) -> bool {
        matches!(self, BridgeMode::Receiver | BridgeMode::Both)
    }
}

/// Top-level YAML configuration for one bridge node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub mode: BridgeMode,

    /// This node's public URL.
    #[serde(default)]
    pub site_url: String,

    /// Shared secret for both roles.
    #[serde(default, skip_serializing)]
    pub secret: String,

    #[serde(default)]
    pub sender: SenderConfig,

    #[serde(default)]
    pub receiver: ReceiverConfig,
}

impl BridgeConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML, apply shared values and the `BRIDGE_SECRET` override,
    /// then validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let secret = std::env::var(SECRET_ENV).ok();
        Self::from_yaml_with_secret(yaml, secret.as_deref())
    }

    /// [`from_yaml`](Self::from_yaml) with an explicit secret override.
    pub fn from_yaml_with_secret(
        yaml: &str,
        secret_override: Option<&str>,
    ) -> Result<Self, ConfigLoadError> {
        let mut config: BridgeConfig = serde_yaml::from_str(yaml)?;
        config.resolve(secret_override);
        config.validate()?;
        Ok(config)
    }

    /// Fill per-role values from the shared ones.
    pub fn resolve(&mut self, secret_override: Option<&str>) {
        if let Some(secret) = secret_override.map(str::trim).filter(|s| !s.is_empty()) {
            self.secret = secret.to_string();
            self.sender.secret = secret.to_string();
            self.receiver.secret = secret.to_string();
        }
        if self.sender.secret.is_empty() {
            self.sender.secret = self.secret.clone();
        }
        if self.receiver.secret.is_empty() {
            self.receiver.secret = self.secret.clone();
        }
        if self.sender.site_url.is_empty() {
            self.sender.site_url = self.site_url.clone();
        }
        if self.receiver.local_host.is_empty() {
            if let Some(host) = canonical::host_of(&self.site_url) {
                self.receiver.local_host = host;
            }
        }
    }

    /// Sender settings, or `None` when this node does not send.
    pub fn active_sender(&self) -> Option<&SenderConfig> {
        (self.mode.sends() && self.sender.enabled).then_some(&self.sender)
    }

    /// Receiver settings with `enabled` forced off when this node does not
    /// receive.
    pub fn effective_receiver(&self) -> ReceiverConfig {
        let mut receiver = self.receiver.clone();
        receiver.enabled &= self.mode.receives();
        receiver
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        if self.mode.sends() {
            self.sender
                .validate()
                .map_err(|e| ConfigLoadError::Validation(format!("sender: {e}")))?;
        }
        if self.mode.receives() {
            self.receiver
                .validate()
                .map_err(|e| ConfigLoadError::Validation(format!("receiver: {e}")))?;
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: None,
            mode: BridgeMode::default(),
            site_url: String::new(),
            secret: String::new(),
            sender: SenderConfig::default(),
            receiver: ReceiverConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}
