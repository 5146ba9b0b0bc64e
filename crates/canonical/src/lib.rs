//! Content normalization for bridged posts.
//!
//! Everything that turns a payload's free-form fields into something safe
//! to store, or checks them against a media policy:
//!
//! - [`sanitize_html`]: allow-list sanitization (`strict` / `standard` / custom)
//! - [`rewrite_attachment_images`] and [`extract_image_urls`]: `<img>`
//!   rewriting and collection on a real tag tree
//! - [`enforce_cdn_hosts`] and [`enforce_media_domains`]: host policies
//! - [`normalize_terms`]: taxonomy cleanup with mapping rules
//! - [`sanitize_text`]: plain-text fields
//!
//! ```
//! use canonical::{sanitize_html, extract_image_urls, ImageAttrs, SanitizeConfig};
//!
//! let html = r#"<p onclick="x()">Hi <img src="https://cdn.example/a.jpg"></p><script>bad()</script>"#;
//! let clean = sanitize_html(html, &SanitizeConfig::default());
//! assert!(!clean.contains("script") && !clean.contains("onclick"));
//! assert_eq!(
//!     extract_image_urls(&clean, ImageAttrs::All).unwrap(),
//!     ["https://cdn.example/a.jpg"]
//! );
//! ```

mod config;
mod error;
mod images;
mod media;
mod sanitize;
mod terms;
mod text;

pub use crate::config::{SanitizeConfig, SanitizeProfile};
pub use crate::error::CanonicalError;
pub use crate::images::{
    extract_image_urls, featured_image_html, has_images, rewrite_attachment_images, srcset_urls,
    AttachmentResolver, ImageAttrs, RewriteReport,
};
pub use crate::media::{enforce_cdn_hosts, enforce_media_domains, host_list, host_of, unique_urls};
pub use crate::sanitize::{sanitize_html, AllowList};
pub use crate::terms::{normalize_terms, MappingRules};
pub use crate::text::{collapse_whitespace, decode_entities, sanitize_text};
