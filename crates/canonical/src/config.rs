use serde::{Deserialize, Serialize};

/// Named allow-list profiles for inbound HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeProfile {
    /// Paragraphs, emphasis, links, images, lists and quotes only.
    Strict,
    /// The usual set of tags found in editorial post bodies.
    #[default]
    Standard,
    /// Operator supplied JSON object of `{tag: {attr: true}}`.
    Custom,
}

/// Controls how inbound `content_html` is cleaned before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Master switch. When off the body is stored as received.
    pub enabled: bool,
    pub profile: SanitizeProfile,
    /// Raw JSON used when `profile` is `custom`. Falls back to `standard`
    /// when missing or malformed.
    pub custom_allowed: Option<String>,
    pub strip_inline_styles: bool,
    pub strip_scripts_iframes: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profile: SanitizeProfile::Standard,
            custom_allowed: None,
            strip_inline_styles: true,
            strip_scripts_iframes: true,
        }
    }
}
