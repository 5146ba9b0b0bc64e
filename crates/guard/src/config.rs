use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// Floor applied to the configured nonce lifetime.
pub const MIN_NONCE_TTL_SECS: u64 = 60;

/// Settings for the replay guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Maximum tolerated distance between the sender's timestamp and now.
    pub clock_skew_secs: u64,
    /// How long a nonce is remembered. Never less than [`MIN_NONCE_TTL_SECS`].
    pub nonce_ttl_secs: u64,
    /// Requests accepted per UTC minute. `0` disables rate limiting.
    pub rate_limit_per_minute: u32,
    /// Exact caller addresses allowed to post. Empty means unrestricted.
    pub ip_allowlist: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 300,
            nonce_ttl_secs: 600,
            rate_limit_per_minute: 0,
            ip_allowlist: Vec::new(),
        }
    }
}

impl GuardConfig {
    pub fn effective_nonce_ttl(&self) -> i64 {
        self.nonce_ttl_secs.max(MIN_NONCE_TTL_SECS) as i64
    }

    /// Entries with surrounding whitespace trimmed and blanks dropped.
    pub fn allowlist(&self) -> impl Iterator<Item = &str> {
        self.ip_allowlist
            .iter()
            .map(|ip| ip.trim())
            .filter(|ip| !ip.is_empty())
    }

    pub fn validate(&self) -> Result<(), GuardError> {
        if self.clock_skew_secs == 0 {
            return Err(GuardError::InvalidConfig(
                "clock_skew_secs must be greater than zero".into(),
            ));
        }
        if self.clock_skew_secs > i64::MAX as u64 || self.nonce_ttl_secs > i64::MAX as u64 {
            return Err(GuardError::InvalidConfig("durations out of range".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = GuardConfig::default();
        assert_eq!(cfg.clock_skew_secs, 300);
        assert_eq!(cfg.effective_nonce_ttl(), 600);
        assert_eq!(cfg.rate_limit_per_minute, 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn nonce_ttl_has_floor() {
        let cfg = GuardConfig {
            nonce_ttl_secs: 5,
            ..Default::default()
        };
        assert_eq!(cfg.effective_nonce_ttl(), 60);
    }

    #[test]
    fn allowlist_skips_blank_entries() {
        let cfg = GuardConfig {
            ip_allowlist: vec![" 10.0.0.1 ".into(), "".into(), "10.0.0.2".into()],
            ..Default::default()
        };
        assert_eq!(cfg.allowlist().collect::<Vec<_>>(), ["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn partial_yaml_style_input_uses_defaults() {
        let cfg: GuardConfig = serde_json::from_str(r#"{"rate_limit_per_minute": 30}"#).unwrap();
        assert_eq!(cfg.rate_limit_per_minute, 30);
        assert_eq!(cfg.nonce_ttl_secs, 600);
    }
}
