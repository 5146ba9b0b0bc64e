//! Idempotent reconciliation of a payload into the content store.
//!
//! Order of decisions for one payload:
//!
//! 1. an item already stamped with the payload's `ingest_id` makes the
//!    request a `noop_duplicate`; nothing is written
//! 2. the existing copy is looked up by `source_url` (and `source_hash` in
//!    `source_hash+source_url` mode); found means `updated`, otherwise
//!    `created`
//! 3. the update-conflict policy decides whether title, body and excerpt
//!    may be overwritten
//! 4. stamps, featured image and taxonomies are written
//!
//! Upserts for the same `source_url` are serialised in-process so two
//! concurrent deliveries of one item cannot both create it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use canonical::{sanitize_html, sanitize_text};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use protocol::ContentPayload;
use serde::Serialize;
use tracing::debug;

use crate::author::resolve_author;
use crate::config::{DedupMode, ReceiverConfig, UpdateStrategy, ALLOWED_STATUSES};
use crate::featured::{apply_featured_image, prepend_if_missing, stored_outcome, FeaturedOutcome};
use crate::keys;
use crate::store::{
    AuthorDirectory, ContentDraft, ContentId, ContentPatch, ContentStore, MediaStore, StoreError,
};
use crate::taxonomy::{apply_taxonomies, TaxonomyReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
    NoopDuplicate,
}

impl UpsertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertAction::Created => "created",
            UpsertAction::Updated => "updated",
            UpsertAction::NoopDuplicate => "noop_duplicate",
        }
    }
}

/// Result of reconciling one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationOutcome {
    pub action: UpsertAction,
    pub content_id: ContentId,
    /// Title, body and excerpt were kept because of local edits.
    pub content_update_suppressed: bool,
    pub prepend_featured_applied: bool,
    pub featured: FeaturedOutcome,
    pub taxonomy: TaxonomyReport,
}

impl ReconciliationOutcome {
    fn duplicate(content_id: ContentId) -> Self {
        Self {
            action: UpsertAction::NoopDuplicate,
            content_id,
            content_update_suppressed: false,
            prepend_featured_applied: false,
            featured: FeaturedOutcome::default(),
            taxonomy: TaxonomyReport::default(),
        }
    }
}

/// Applies payloads to the stores.
pub struct UpsertEngine {
    content: Arc<dyn ContentStore>,
    media: Arc<dyn MediaStore>,
    authors: Arc<dyn AuthorDirectory>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for UpsertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertEngine")
            .field("locks_held", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl UpsertEngine {
    pub fn new(
        content: Arc<dyn ContentStore>,
        media: Arc<dyn MediaStore>,
        authors: Arc<dyn AuthorDirectory>,
    ) -> Self {
        Self {
            content,
            media,
            authors,
            locks: KeyedLocks::default(),
        }
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    /// Reconcile a validated payload.
    pub fn reconcile(
        &self,
        payload: &ContentPayload,
        config: &ReceiverConfig,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, StoreError> {
        let source_url = payload.source_url.trim();
        let key_lock = self.locks.handle(source_url);
        let _held = key_lock.lock();

        let ingest_id = sanitize_text(&payload.ingest_id);
        if let Some(existing) = self
            .content
            .find_by_key(&config.post_type, keys::INGEST_ID, &ingest_id)?
        {
            debug!(content_id = existing, ingest_id = %ingest_id, "upsert_noop_duplicate");
            return Ok(ReconciliationOutcome::duplicate(existing));
        }

        let existing = self.find_existing(payload, config, source_url)?;

        let title = sanitize_text(&payload.title);
        let excerpt = sanitize_text(&payload.excerpt);
        let (mut body, prepend_featured_applied) = if config.prepend_featured_if_missing {
            prepend_if_missing(payload.content_html.clone(), payload.featured_image.as_ref())
        } else {
            (payload.content_html.clone(), false)
        };
        body = sanitize_html(&body, &config.sanitize);

        let status = resolve_status(payload, config);
        let author_id = resolve_author(self.authors.as_ref(), payload, config);

        let (action, id, content_update_suppressed) = match existing {
            Some(id) => {
                let allowed = self.content_update_allowed(id, config)?;
                let mut patch = ContentPatch {
                    status: Some(status),
                    author_id,
                    ..Default::default()
                };
                if allowed {
                    patch.title = Some(title);
                    patch.content_html = Some(body);
                    patch.excerpt = Some(excerpt);
                }
                self.content.update(id, patch, now)?;
                (UpsertAction::Updated, id, !allowed)
            }
            None => {
                let draft = ContentDraft {
                    post_type: config.post_type.clone(),
                    status,
                    title,
                    content_html: body,
                    excerpt,
                    author_id,
                    date: payload.parsed_date(),
                };
                (UpsertAction::Created, self.content.create(draft, now)?, false)
            }
        };

        self.stamp(id, payload, &ingest_id, source_url, config)?;

        let featured = match &payload.featured_image {
            Some(image) => apply_featured_image(
                self.content.as_ref(),
                self.media.as_ref(),
                id,
                image,
                config.featured_image_mode,
            )?,
            None => stored_outcome(self.content.as_ref(), id)?,
        };

        if !payload.media_manifest.is_empty() {
            let manifest = serde_json::to_string(&payload.media_manifest)
                .map_err(|e| StoreError::backend("encode_failed", e.to_string()))?;
            self.content.set_meta(id, keys::MEDIA_MANIFEST, &manifest)?;
        }
        self.content
            .set_meta(id, keys::LAST_INGESTED_AT, &now.to_rfc3339())?;

        let taxonomy = apply_taxonomies(self.content.as_ref(), id, payload, config);

        Ok(ReconciliationOutcome {
            action,
            content_id: id,
            content_update_suppressed,
            prepend_featured_applied,
            featured,
            taxonomy,
        })
    }

    fn find_existing(
        &self,
        payload: &ContentPayload,
        config: &ReceiverConfig,
        source_url: &str,
    ) -> Result<Option<ContentId>, StoreError> {
        let key = config.source_url_meta_key.as_str();
        let hash = payload.source_hash.trim();
        if config.dedup_mode == DedupMode::SourceHashAndUrl && !hash.is_empty() {
            if let Some(id) = self.content.find_by_keys(
                &config.post_type,
                (key, source_url),
                (keys::SOURCE_HASH, hash),
            )? {
                return Ok(Some(id));
            }
        }
        self.content.find_by_key(&config.post_type, key, source_url)
    }

    /// Whether title, body and excerpt of `id` may be overwritten.
    fn content_update_allowed(
        &self,
        id: ContentId,
        config: &ReceiverConfig,
    ) -> Result<bool, StoreError> {
        if config.update_strategy == UpdateStrategy::OverwriteAll {
            return Ok(true);
        }
        let locked = self
            .content
            .get_meta(id, keys::LOCKED)?
            .is_some_and(|v| !v.trim().is_empty() && v.trim() != "0");
        if locked {
            return Ok(false);
        }
        let last_ingested = self
            .content
            .get_meta(id, keys::LAST_INGESTED_AT)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));
        if let (Some(last), Some(item)) = (last_ingested, self.content.get(id)?) {
            if item.modified_at > last {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn stamp(
        &self,
        id: ContentId,
        payload: &ContentPayload,
        ingest_id: &str,
        source_url: &str,
        config: &ReceiverConfig,
    ) -> Result<(), StoreError> {
        self.content.set_meta(id, keys::INGEST_ID, ingest_id)?;
        self.content
            .set_meta(id, &config.source_url_meta_key, source_url)?;
        let hash = sanitize_text(&payload.source_hash);
        if !hash.is_empty() {
            self.content.set_meta(id, keys::SOURCE_HASH, &hash)?;
        }
        Ok(())
    }
}

/// Receiver status for a payload: the configured default, or the sender's
/// status when overrides are allowed. Anything outside the allowed set
/// becomes `pending`.
fn resolve_status(payload: &ContentPayload, config: &ReceiverConfig) -> String {
    let mut status = config.default_status.clone();
    if config.allow_sender_status_override {
        let requested: String = payload
            .status
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if !requested.is_empty() {
            status = requested;
        }
    }
    if ALLOWED_STATUSES.contains(&status.as_str()) {
        status
    } else {
        "pending".into()
    }
}

/// Per-key mutexes, dropped once no request holds them.
#[derive(Default)]
struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Handle on one key's mutex; removes the map entry on drop when unused.
struct KeyedLock<'a> {
    owner: &'a KeyedLocks,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl KeyedLocks {
    fn handle(&self, key: &str) -> KeyedLock<'_> {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        KeyedLock {
            owner: self,
            key: key.to_string(),
            lock,
        }
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

impl KeyedLock<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for KeyedLock<'_> {
    fn drop(&mut self) {
        // One reference in the map, one here.
        self.owner
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}
