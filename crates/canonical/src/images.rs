//! `<img>` extraction and attachment rewriting.
//!
//! Both operations walk the document with `lol_html`'s streaming tag tree so
//! attribute quoting, casing and ordering quirks are handled by a real
//! tokenizer.

use lol_html::{element, rewrite_str, RewriteStrSettings};
use serde::Serialize;

use crate::error::CanonicalError;
use crate::text::decode_entities;

/// Which `<img>` attributes count as media references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAttrs {
    /// `src` and `srcset`: what the sender checks against the CDN.
    Delivered,
    /// `src`, `data-src`, `srcset`, `data-srcset`: everything the receiver
    /// would end up loading.
    All,
}

impl ImageAttrs {
    fn names(self) -> &'static [(&'static str, bool)] {
        // (attribute, is_srcset)
        match self {
            ImageAttrs::Delivered => &[("src", false), ("srcset", true)],
            ImageAttrs::All => &[
                ("src", false),
                ("data-src", false),
                ("srcset", true),
                ("data-srcset", true),
            ],
        }
    }
}

/// URLs referenced by `<img>` tags, in document order.
///
/// Every `srcset` candidate contributes its URL.
pub fn extract_image_urls(html: &str, attrs: ImageAttrs) -> Result<Vec<String>, CanonicalError> {
    let mut urls = Vec::new();
    if html.is_empty() {
        return Ok(urls);
    }
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img", |el| {
                for (name, is_srcset) in attrs.names() {
                    let Some(raw) = el.get_attribute(name) else {
                        continue;
                    };
                    let value = decode_entities(raw.trim());
                    if value.is_empty() {
                        continue;
                    }
                    if *is_srcset {
                        urls.extend(srcset_urls(&value));
                    } else {
                        urls.push(value);
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok(urls)
}

/// Whether the body already shows at least one image.
pub fn has_images(html: &str) -> bool {
    extract_image_urls(html, ImageAttrs::All)
        .map(|urls| !urls.is_empty())
        .unwrap_or(false)
}

/// First token of every comma separated `srcset` candidate.
pub fn srcset_urls(srcset: &str) -> Vec<String> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Resolves local attachment ids to their canonical public URLs.
pub trait AttachmentResolver {
    fn attachment_url(&self, attachment_id: u64) -> Option<String>;

    fn attachment_srcset(&self, _attachment_id: u64) -> Option<String> {
        None
    }
}

/// Counters describing one [`rewrite_attachment_images`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub tags_total: usize,
    pub ids_found: usize,
    pub src_replaced: usize,
    pub srcset_replaced: usize,
    pub ids_missing_url: usize,
}

/// Point every attachment-backed `<img>` at the attachment's canonical URL.
///
/// An attachment is recognised by a `wp-image-<id>` class or a numeric
/// `data-id`. Tags whose attachment cannot be resolved are left unchanged.
pub fn rewrite_attachment_images(
    html: &str,
    resolver: &dyn AttachmentResolver,
) -> Result<(String, RewriteReport), CanonicalError> {
    let mut report = RewriteReport::default();
    if html.is_empty() {
        return Ok((String::new(), report));
    }
    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img", |el| {
                report.tags_total += 1;
                let id = el
                    .get_attribute("class")
                    .and_then(|class| attachment_id_from_class(&class))
                    .or_else(|| {
                        el.get_attribute("data-id")
                            .and_then(|raw| leading_number(&raw))
                    });
                let Some(id) = id else {
                    return Ok(());
                };
                report.ids_found += 1;
                let Some(src) = resolver.attachment_url(id).filter(|u| !u.is_empty()) else {
                    report.ids_missing_url += 1;
                    return Ok(());
                };
                el.set_attribute("src", &src)?;
                report.src_replaced += 1;
                if let Some(srcset) = resolver.attachment_srcset(id).filter(|s| !s.is_empty()) {
                    el.set_attribute("srcset", &srcset)?;
                    report.srcset_replaced += 1;
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok((rewritten, report))
}

fn attachment_id_from_class(class: &str) -> Option<u64> {
    class.split_whitespace().find_map(|token| {
        let token = token.to_ascii_lowercase();
        let digits = token.strip_prefix("wp-image-")?;
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse().ok().filter(|id| *id > 0)
        } else {
            None
        }
    })
}

fn leading_number(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|id| *id > 0)
}

/// `<p><img …></p>` markup for a featured image, prepended to image-less bodies.
pub fn featured_image_html(url: &str, alt: &str, width: Option<u32>, height: Option<u32>) -> String {
    let mut html = format!(
        r#"<p><img src="{}" alt="{}""#,
        escape_attr(url),
        escape_attr(alt)
    );
    if let Some(w) = width.filter(|w| *w > 0) {
        html.push_str(&format!(r#" width="{w}""#));
    }
    if let Some(h) = height.filter(|h| *h > 0) {
        html.push_str(&format!(r#" height="{h}""#));
    }
    html.push_str(r#" loading="eager" /></p>"#);
    html
}

fn escape_attr(value: &str) -> std::borrow::Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Library(HashMap<u64, (&'static str, Option<&'static str>)>);

    impl AttachmentResolver for Library {
        fn attachment_url(&self, id: u64) -> Option<String> {
            self.0.get(&id).map(|(url, _)| url.to_string())
        }

        fn attachment_srcset(&self, id: u64) -> Option<String> {
            self.0.get(&id).and_then(|(_, s)| s.map(str::to_string))
        }
    }

    #[test]
    fn extracts_src_and_srcset_candidates() {
        let html = r#"<p><img src="https://cdn.example/a.jpg" srcset="https://cdn.example/a-300.jpg 300w, https://cdn.example/a-600.jpg 600w"><IMG SRC='https://cdn.example/b.png'></p>"#;
        let urls = extract_image_urls(html, ImageAttrs::Delivered).unwrap();
        assert_eq!(
            urls,
            [
                "https://cdn.example/a.jpg",
                "https://cdn.example/a-300.jpg",
                "https://cdn.example/a-600.jpg",
                "https://cdn.example/b.png",
            ]
        );
    }

    #[test]
    fn all_attrs_include_lazy_loading_sources() {
        let html = r#"<img data-src="https://lazy.example/a.jpg" data-srcset="https://lazy.example/b.jpg 2x">"#;
        assert!(extract_image_urls(html, ImageAttrs::Delivered)
            .unwrap()
            .is_empty());
        assert_eq!(
            extract_image_urls(html, ImageAttrs::All).unwrap(),
            ["https://lazy.example/a.jpg", "https://lazy.example/b.jpg"]
        );
        assert!(has_images(html));
        assert!(!has_images("<p>text only</p>"));
    }

    #[test]
    fn rewrites_attachment_images() {
        let library = Library(HashMap::from([
            (12, ("https://cdn.example/12.jpg", Some("https://cdn.example/12-300.jpg 300w"))),
            (13, ("https://cdn.example/13.jpg", None)),
        ]));
        let html = concat!(
            r#"<img class="aligncenter wp-image-12" src="/wp-content/12.jpg">"#,
            r#"<img data-id="13" src="/local/13.jpg">"#,
            r#"<img class="wp-image-99" src="/local/99.jpg">"#,
            r#"<img src="https://elsewhere.example/x.jpg">"#,
        );
        let (out, report) = rewrite_attachment_images(html, &library).unwrap();
        assert_eq!(
            report,
            RewriteReport {
                tags_total: 4,
                ids_found: 3,
                src_replaced: 2,
                srcset_replaced: 1,
                ids_missing_url: 1,
            }
        );
        let urls = extract_image_urls(&out, ImageAttrs::Delivered).unwrap();
        assert_eq!(
            urls,
            [
                "https://cdn.example/12.jpg",
                "https://cdn.example/12-300.jpg",
                "https://cdn.example/13.jpg",
                "/local/99.jpg",
                "https://elsewhere.example/x.jpg",
            ]
        );
    }

    #[test]
    fn class_parsing_requires_whole_token() {
        assert_eq!(attachment_id_from_class("wp-image-7 size-full"), Some(7));
        assert_eq!(attachment_id_from_class("WP-IMAGE-8"), Some(8));
        assert_eq!(attachment_id_from_class("wp-image-7x"), None);
        assert_eq!(attachment_id_from_class("nowp-image-7"), None);
        assert_eq!(leading_number("42abc"), Some(42));
        assert_eq!(leading_number("abc"), None);
    }

    #[test]
    fn featured_markup() {
        assert_eq!(
            featured_image_html("https://cdn.example/f.jpg", "A \"quote\"", Some(800), None),
            r#"<p><img src="https://cdn.example/f.jpg" alt="A &quot;quote&quot;" width="800" loading="eager" /></p>"#
        );
    }
}
