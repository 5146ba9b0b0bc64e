//! Turning a local record into a wire payload.

use canonical::{
    enforce_cdn_hosts, extract_image_urls, host_list, host_of, rewrite_attachment_images,
    sanitize_text, unique_urls, ImageAttrs, RewriteReport,
};
use chrono::SecondsFormat;
use protocol::{derive_ingest_id, source_hash, ContentPayload, FeaturedImage, MediaItem};
use tracing::debug;

use crate::config::SenderConfig;
use crate::error::SendError;
use crate::source::{ContentRecord, ContentSource};

/// A payload plus what was learned while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPayload {
    pub payload: ContentPayload,
    /// Every image URL found: body `src`/`srcset` then the featured image.
    pub image_urls: Vec<String>,
    pub rewrite: RewriteReport,
}

impl BuiltPayload {
    /// One-line media summary for the operator log.
    pub fn diagnostics(&self, content_id: u64, config: &SenderConfig) -> String {
        let hosts = host_list(self.image_urls.iter().map(String::as_str));
        let image_hosts = if hosts.is_empty() {
            "(none)".to_string()
        } else {
            hosts.join(", ")
        };
        let featured_host = self
            .payload
            .featured_image
            .as_ref()
            .and_then(|f| host_of(&f.url))
            .unwrap_or_else(|| "(none)".into());
        let cdn_host = host_of(&config.cdn_base);
        let non_cdn = match (&cdn_host, config.ensure_cdn_urls) {
            (Some(cdn), true) => self
                .image_urls
                .iter()
                .filter_map(|u| host_of(u))
                .filter(|h| h != cdn)
                .count(),
            _ => 0,
        };
        format!(
            "Payload media diagnostics for post {content_id}: source_host={}; image_urls={}; \
             image_hosts={image_hosts}; featured_host={featured_host}; cdn_host={}; non_cdn={non_cdn}; \
             rewritten_img_tags={}; rewritten_srcset={}; unresolved_attachment_ids={}",
            host_of(&self.payload.source_url).unwrap_or_default(),
            self.image_urls.len(),
            cdn_host.as_deref().unwrap_or("(not set)"),
            self.rewrite.src_replaced,
            self.rewrite.srcset_replaced,
            self.rewrite.ids_missing_url,
        )
    }
}

/// Assemble the payload for `record`.
///
/// Attachment-backed images are pointed at their canonical URLs first, so
/// CDN enforcement sees what the receiver will see. With enforcement on,
/// any absolute image URL off the CDN host fails the whole build.
pub fn build_payload(
    record: &ContentRecord,
    config: &SenderConfig,
    source: &dyn ContentSource,
) -> Result<BuiltPayload, SendError> {
    let source_url = record.permalink.trim();
    if source_url.is_empty() {
        return Err(SendError::MissingPermalink);
    }

    let (content_html, rewrite) = rewrite_attachment_images(&record.content_html, source)?;
    let mut image_urls = extract_image_urls(&content_html, ImageAttrs::Delivered)?;

    let featured_image = record
        .featured_image
        .as_ref()
        .filter(|f| !f.url.trim().is_empty())
        .map(|f| FeaturedImage {
            url: f.url.trim().to_string(),
            alt: sanitize_text(&f.alt),
            width: f.width,
            height: f.height,
        });
    if let Some(featured) = &featured_image {
        image_urls.push(featured.url.clone());
    }

    if config.ensure_cdn_urls {
        enforce_cdn_hosts(image_urls.iter().map(String::as_str), &config.cdn_base)?;
    }

    let media_manifest = unique_urls(image_urls.iter().cloned())
        .into_iter()
        .map(MediaItem::new)
        .collect();

    let source_hash = source_hash(record.modified_at, &record.title, &content_html);
    let payload = ContentPayload {
        ingest_id: derive_ingest_id(source_url, &source_hash),
        source_url: source_url.to_string(),
        source_hash,
        title: record.title.clone(),
        content_html,
        excerpt: record.excerpt.clone(),
        status: config.wire_status(),
        date: record
            .date
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
        author: record.author.clone().filter(|_| config.include_author),
        categories: if config.send_taxonomies {
            record.categories.clone()
        } else {
            Vec::new()
        },
        tags: if config.send_taxonomies {
            record.tags.clone()
        } else {
            Vec::new()
        },
        featured_image,
        media_manifest,
    };

    debug!(
        content_id = record.id,
        ingest_id = %payload.ingest_id,
        images = image_urls.len(),
        src_replaced = rewrite.src_replaced,
        "payload_built"
    );

    Ok(BuiltPayload {
        payload,
        image_urls,
        rewrite,
    })
}
