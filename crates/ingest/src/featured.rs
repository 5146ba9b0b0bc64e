//! Featured image handling.

use canonical::{featured_image_html, has_images, sanitize_text};
use protocol::FeaturedImage;
use serde::Serialize;
use tracing::warn;

use crate::config::FeaturedImageMode;
use crate::keys;
use crate::store::{ContentId, ContentStore, MediaStore, StoreError};

const MISSING_URL: &str = "Featured payload is missing URL.";

/// Mode, status and error recorded for the featured image.
///
/// `status` is one of `meta_only`, `missing_url`, `attached:<media id>` or
/// `attachment_failed[:<code>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeaturedOutcome {
    pub mode: String,
    pub status: String,
    pub error: String,
}

/// Prepend the featured image to a body that shows no image.
///
/// Returns the body and whether it was changed.
pub(crate) fn prepend_if_missing(content: String, image: Option<&FeaturedImage>) -> (String, bool) {
    let Some(image) = image.filter(|i| !i.url.trim().is_empty()) else {
        return (content, false);
    };
    if has_images(&content) {
        return (content, false);
    }
    let img = featured_image_html(
        image.url.trim(),
        &sanitize_text(&image.alt),
        image.width,
        image.height,
    );
    (format!("{img}\n{content}"), true)
}

/// Record the featured image on `id` and, in `virtual_attachment` mode,
/// attach a media item as its primary image.
///
/// Media failures are recorded on the item, never returned. Errors from the
/// content store are.
pub(crate) fn apply_featured_image(
    content: &dyn ContentStore,
    media: &dyn MediaStore,
    id: ContentId,
    image: &FeaturedImage,
    mode: FeaturedImageMode,
) -> Result<FeaturedOutcome, StoreError> {
    store_featured_meta(content, id, image)?;

    let mut outcome = FeaturedOutcome {
        mode: mode.as_str().to_string(),
        ..Default::default()
    };
    content.set_meta(id, keys::FEATURED_MODE, &outcome.mode)?;

    if mode == FeaturedImageMode::MetaOnly {
        outcome.status = "meta_only".into();
        content.set_meta(id, keys::FEATURED_STATUS, &outcome.status)?;
        content.delete_meta(id, keys::FEATURED_ERROR)?;
        return Ok(outcome);
    }

    let url = image.url.trim();
    if url.is_empty() {
        outcome.status = "missing_url".into();
        outcome.error = MISSING_URL.into();
        content.set_meta(id, keys::FEATURED_STATUS, &outcome.status)?;
        content.set_meta(id, keys::FEATURED_ERROR, &outcome.error)?;
        return Ok(outcome);
    }

    match find_or_sideload(media, id, url, &image.alt) {
        Ok(media_id) => {
            outcome.status = format!("attached:{media_id}");
            content.set_meta(id, keys::FEATURED_STATUS, &outcome.status)?;
            content.delete_meta(id, keys::FEATURED_ERROR)?;
        }
        Err(err) => {
            warn!(content_id = id, url = %url, error = %err, "featured_attachment_failed");
            outcome.status = failure_status(err.code());
            outcome.error = sanitize_text(&err.to_string());
            content.set_meta(id, keys::FEATURED_STATUS, &outcome.status)?;
            content.set_meta(id, keys::FEATURED_ERROR, &outcome.error)?;
        }
    }
    Ok(outcome)
}

/// Outcome previously stored on `id`, for updates that carry no image.
pub(crate) fn stored_outcome(
    content: &dyn ContentStore,
    id: ContentId,
) -> Result<FeaturedOutcome, StoreError> {
    Ok(FeaturedOutcome {
        mode: content.get_meta(id, keys::FEATURED_MODE)?.unwrap_or_default(),
        status: content.get_meta(id, keys::FEATURED_STATUS)?.unwrap_or_default(),
        error: content.get_meta(id, keys::FEATURED_ERROR)?.unwrap_or_default(),
    })
}

fn store_featured_meta(
    content: &dyn ContentStore,
    id: ContentId,
    image: &FeaturedImage,
) -> Result<(), StoreError> {
    let url = image.url.trim();
    if url.is_empty() {
        return Ok(());
    }
    content.set_meta(id, keys::FEATURED_URL, url)?;
    let alt = sanitize_text(&image.alt);
    if !alt.is_empty() {
        content.set_meta(id, keys::FEATURED_ALT, &alt)?;
    }
    if let Some(w) = image.width.filter(|w| *w > 0) {
        content.set_meta(id, keys::FEATURED_WIDTH, &w.to_string())?;
    }
    if let Some(h) = image.height.filter(|h| *h > 0) {
        content.set_meta(id, keys::FEATURED_HEIGHT, &h.to_string())?;
    }
    Ok(())
}

fn find_or_sideload(
    media: &dyn MediaStore,
    owner: ContentId,
    url: &str,
    alt: &str,
) -> Result<u64, StoreError> {
    let media_id = match media.find_by_source_url(url)? {
        Some(existing) => existing,
        None => {
            let created = media.sideload(url, owner, alt)?;
            media.set_meta(created, keys::MEDIA_SOURCE_URL, url)?;
            let alt = sanitize_text(alt);
            if !alt.is_empty() {
                media.set_meta(created, keys::MEDIA_ALT, &alt)?;
            }
            created
        }
    };
    media.set_as_primary_image(owner, media_id)?;
    Ok(media_id)
}

fn failure_status(code: &str) -> String {
    let code: String = code
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if code.is_empty() {
        "attachment_failed".into()
    } else {
        format!("attachment_failed:{code}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContentDraft, MemoryContentStore, MemoryMediaStore};
    use chrono::Utc;

    fn image() -> FeaturedImage {
        FeaturedImage {
            url: "https://cdn.example/f.jpg".into(),
            alt: "Front".into(),
            width: Some(1200),
            height: None,
        }
    }

    fn content_with_item() -> (MemoryContentStore, ContentId) {
        let store = MemoryContentStore::new();
        let id = store.create(ContentDraft::default(), Utc::now()).unwrap();
        (store, id)
    }

    #[test]
    fn prepends_only_to_image_less_bodies() {
        let (out, applied) = prepend_if_missing("<p>text</p>".into(), Some(&image()));
        assert!(applied);
        assert!(out.starts_with(r#"<p><img src="https://cdn.example/f.jpg" alt="Front" width="1200""#));
        assert!(out.ends_with("\n<p>text</p>"));

        let body = r#"<p><img src="https://cdn.example/x.jpg"></p>"#.to_string();
        let (same, applied) = prepend_if_missing(body.clone(), Some(&image()));
        assert!(!applied);
        assert_eq!(same, body);

        let (_, applied) = prepend_if_missing("<p>t</p>".into(), None);
        assert!(!applied);
    }

    #[test]
    fn meta_only_mode_records_meta() {
        let (store, id) = content_with_item();
        let media = MemoryMediaStore::new();
        let outcome =
            apply_featured_image(&store, &media, id, &image(), FeaturedImageMode::MetaOnly).unwrap();
        assert_eq!(outcome.status, "meta_only");
        assert_eq!(
            store.get_meta(id, keys::FEATURED_WIDTH).unwrap().as_deref(),
            Some("1200")
        );
        assert_eq!(store.get_meta(id, keys::FEATURED_HEIGHT).unwrap(), None);
        assert!(media.is_empty());
    }

    #[test]
    fn virtual_attachment_reuses_existing_media() {
        let (store, id) = content_with_item();
        let media = MemoryMediaStore::new();
        let first = apply_featured_image(
            &store,
            &media,
            id,
            &image(),
            FeaturedImageMode::VirtualAttachment,
        )
        .unwrap();
        let second = apply_featured_image(
            &store,
            &media,
            id,
            &image(),
            FeaturedImageMode::VirtualAttachment,
        )
        .unwrap();
        assert_eq!(first.status, "attached:1");
        assert_eq!(second.status, "attached:1");
        assert_eq!(media.len(), 1);
        assert_eq!(media.primary_image(id), Some(1));
    }

    #[test]
    fn sideload_failure_is_recorded() {
        let (store, id) = content_with_item();
        let media = MemoryMediaStore::failing_sideload(StoreError::backend("http_404", "Not Found"));
        let outcome = apply_featured_image(
            &store,
            &media,
            id,
            &image(),
            FeaturedImageMode::VirtualAttachment,
        )
        .unwrap();
        assert_eq!(outcome.status, "attachment_failed:http_404");
        assert_eq!(outcome.error, "Not Found");
        assert_eq!(
            store.get_meta(id, keys::FEATURED_ERROR).unwrap().as_deref(),
            Some("Not Found")
        );
    }

    #[test]
    fn missing_url_in_attachment_mode() {
        let (store, id) = content_with_item();
        let outcome = apply_featured_image(
            &store,
            &MemoryMediaStore::new(),
            id,
            &FeaturedImage::default(),
            FeaturedImageMode::VirtualAttachment,
        )
        .unwrap();
        assert_eq!(outcome.status, "missing_url");
        assert_eq!(outcome.error, MISSING_URL);
    }
}
