//! Allow-list HTML sanitization.
//!
//! Three steps, each switchable through [`SanitizeConfig`]:
//!
//! 1. `script` and `iframe` elements are dropped together with their content
//! 2. everything outside the profile's tag/attribute allow-list is removed
//!    (disallowed tags are unwrapped, their text is kept)
//! 3. inline `style` attributes are removed
//!
//! The document is parsed with html5ever through `ammonia`; no regular
//! expressions touch the markup.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use ammonia::{Builder, UrlRelative};
use tracing::warn;

use crate::config::{SanitizeConfig, SanitizeProfile};

const URL_SCHEMES: [&str; 4] = ["http", "https", "mailto", "tel"];

/// Tags whose content is always discarded unless the profile allows them.
const CONTENT_TAGS: [&str; 2] = ["script", "style"];

const STRICT_IMG_ATTRS: [&str; 12] = [
    "src",
    "srcset",
    "sizes",
    "data-src",
    "data-srcset",
    "alt",
    "width",
    "height",
    "loading",
    "decoding",
    "fetchpriority",
    "class",
];

/// Tag → permitted attributes, plus attributes permitted on every tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowList {
    tags: BTreeMap<String, BTreeSet<String>>,
    global: BTreeSet<String>,
}

impl AllowList {
    fn with(mut self, tag: &str, attrs: &[&str]) -> Self {
        self.tags.insert(
            tag.to_string(),
            attrs.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn strict() -> Self {
        Self::default()
            .with("p", &[])
            .with("br", &[])
            .with("strong", &[])
            .with("em", &[])
            .with("a", &["href", "title", "rel", "target"])
            .with("img", &STRICT_IMG_ATTRS)
            .with("ul", &[])
            .with("ol", &[])
            .with("li", &[])
            .with("blockquote", &[])
    }

    pub fn standard() -> Self {
        let mut list = Self::default();
        for tag in [
            "abbr", "acronym", "address", "article", "aside", "b", "bdo", "big", "br", "caption",
            "code", "dd", "dfn", "div", "dl", "dt", "em", "figcaption", "figure", "footer", "h1",
            "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "kbd", "mark", "p", "pre", "s",
            "samp", "section", "small", "span", "strike", "strong", "sub", "summary", "sup",
            "tbody", "tfoot", "thead", "tr", "tt", "u", "ul", "var", "details", "table",
        ] {
            list = list.with(tag, &[]);
        }
        list = list
            .with("a", &["href", "rel", "rev", "name", "target", "download", "hreflang"])
            .with("blockquote", &["cite"])
            .with("q", &["cite"])
            .with("del", &["cite", "datetime"])
            .with("ins", &["cite", "datetime"])
            .with("time", &["datetime"])
            .with("ol", &["start", "type", "reversed"])
            .with("li", &["value"])
            .with("td", &["colspan", "rowspan", "headers", "scope", "align", "valign"])
            .with("th", &["colspan", "rowspan", "headers", "scope", "align", "valign"])
            .with("col", &["span", "width"])
            .with("colgroup", &["span", "width"])
            .with(
                "img",
                &[
                    "src",
                    "srcset",
                    "sizes",
                    "data-src",
                    "data-srcset",
                    "data-id",
                    "alt",
                    "width",
                    "height",
                    "loading",
                    "decoding",
                    "fetchpriority",
                ],
            );
        list.global = ["class", "id", "style", "title", "dir", "lang", "role"]
            .into_iter()
            .map(str::to_string)
            .collect();
        list
    }

    /// Parse an operator supplied `{tag: {attr: true}}` object.
    ///
    /// Attributes mapped to `false`, `0` or `null` are not allowed. Returns
    /// `None` unless the input is a JSON object.
    pub fn from_custom_json(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let object = value.as_object()?;
        let mut list = Self::default();
        for (tag, attrs) in object {
            let allowed = attrs
                .as_object()
                .map(|attrs| {
                    attrs
                        .iter()
                        .filter(|(_, v)| is_truthy(v))
                        .map(|(name, _)| name.to_ascii_lowercase())
                        .collect()
                })
                .unwrap_or_default();
            list.tags.insert(tag.to_ascii_lowercase(), allowed);
        }
        Some(list)
    }

    /// Resolve the allow-list for a config, falling back to `standard`.
    pub fn for_config(config: &SanitizeConfig) -> Self {
        match config.profile {
            SanitizeProfile::Strict => Self::strict(),
            SanitizeProfile::Standard => Self::standard(),
            SanitizeProfile::Custom => config
                .custom_allowed
                .as_deref()
                .and_then(Self::from_custom_json)
                .unwrap_or_else(|| {
                    warn!("custom_profile_invalid_falling_back_to_standard");
                    Self::standard()
                }),
        }
    }

    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    fn without_tags(mut self, tags: &[&str]) -> Self {
        for tag in tags {
            self.tags.remove(*tag);
        }
        self
    }

    fn without_attribute(mut self, attr: &str) -> Self {
        for attrs in self.tags.values_mut() {
            attrs.remove(attr);
        }
        self.global.remove(attr);
        self
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Clean `html` according to `config`.
///
/// ```
/// use canonical::{sanitize_html, SanitizeConfig, SanitizeProfile};
///
/// let cfg = SanitizeConfig { profile: SanitizeProfile::Strict, ..Default::default() };
/// let out = sanitize_html(r#"<p style="color:red">hi<script>x()</script></p>"#, &cfg);
/// assert_eq!(out, "<p>hi</p>");
/// ```
pub fn sanitize_html(html: &str, config: &SanitizeConfig) -> String {
    if !config.enabled {
        return html.to_string();
    }

    let mut allow = AllowList::for_config(config);
    if config.strip_scripts_iframes {
        allow = allow.without_tags(&["script", "iframe"]);
    }
    if config.strip_inline_styles {
        allow = allow.without_attribute("style");
    }

    let tags: HashSet<&str> = allow.tags.keys().map(String::as_str).collect();
    let tag_attributes: HashMap<&str, HashSet<&str>> = allow
        .tags
        .iter()
        .map(|(tag, attrs)| (tag.as_str(), attrs.iter().map(String::as_str).collect()))
        .collect();
    let generic: HashSet<&str> = allow.global.iter().map(String::as_str).collect();

    let mut clean_content: HashSet<&str> = CONTENT_TAGS.into_iter().collect();
    if config.strip_scripts_iframes {
        clean_content.insert("iframe");
    }
    clean_content.retain(|tag| !tags.contains(tag));

    let mut builder = Builder::empty();
    builder
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(generic)
        .clean_content_tags(clean_content)
        .url_schemes(URL_SCHEMES.into_iter().collect())
        .url_relative(UrlRelative::PassThrough)
        .link_rel(None)
        .strip_comments(true);
    builder.clean(html).to_string()
}
