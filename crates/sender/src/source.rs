//! Where the sender reads content from.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use canonical::AttachmentResolver;
use chrono::{DateTime, Utc};
use protocol::{Author, FeaturedImage};
use serde::{Deserialize, Serialize};

pub type ContentId = u64;

/// One local content item as the sender sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ContentRecord {
    pub id: ContentId,
    pub post_type: String,
    pub status: String,
    pub title: String,
    pub content_html: String,
    pub excerpt: String,
    /// Canonical public URL. Records without one cannot be sent.
    pub permalink: String,
    pub date: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
    pub author: Option<Author>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub featured_image: Option<FeaturedImage>,
    /// Set on items that were themselves ingested from another node. They
    /// are never sent back out.
    pub remote_origin: bool,
}

/// Filter for backfill candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub post_type: String,
    pub status: String,
    /// Inclusive lower bound on `date`.
    pub date_after: Option<DateTime<Utc>>,
}

/// Read access to local content.
pub trait ContentSource: AttachmentResolver + Send + Sync {
    fn fetch(&self, id: ContentId) -> Option<ContentRecord>;

    /// Records matching `query`, oldest first (date ascending, then id).
    fn candidates(&self, query: &CandidateQuery) -> Vec<ContentRecord>;
}

/// In-process [`ContentSource`].
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    records: RwLock<BTreeMap<ContentId, ContentRecord>>,
    attachments: RwLock<HashMap<u64, (String, Option<String>)>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ContentRecord) {
        self.records
            .write()
            .expect("content source lock poisoned")
            .insert(record.id, record);
    }

    pub fn remove(&self, id: ContentId) -> Option<ContentRecord> {
        self.records
            .write()
            .expect("content source lock poisoned")
            .remove(&id)
    }

    /// Register an attachment's public URL and optional `srcset`.
    pub fn add_attachment(&self, id: u64, url: impl Into<String>, srcset: Option<String>) {
        self.attachments
            .write()
            .expect("attachment lock poisoned")
            .insert(id, (url.into(), srcset));
    }
}

impl AttachmentResolver for MemoryContentSource {
    fn attachment_url(&self, attachment_id: u64) -> Option<String> {
        self.attachments
            .read()
            .expect("attachment lock poisoned")
            .get(&attachment_id)
            .map(|(url, _)| url.clone())
    }

    fn attachment_srcset(&self, attachment_id: u64) -> Option<String> {
        self.attachments
            .read()
            .expect("attachment lock poisoned")
            .get(&attachment_id)
            .and_then(|(_, srcset)| srcset.clone())
    }
}

impl ContentSource for MemoryContentSource {
    fn fetch(&self, id: ContentId) -> Option<ContentRecord> {
        self.records
            .read()
            .expect("content source lock poisoned")
            .get(&id)
            .cloned()
    }

    fn candidates(&self, query: &CandidateQuery) -> Vec<ContentRecord> {
        let mut matched: Vec<ContentRecord> = self
            .records
            .read()
            .expect("content source lock poisoned")
            .values()
            .filter(|r| r.post_type == query.post_type && r.status == query.status)
            .filter(|r| match (query.date_after, r.date) {
                (Some(after), Some(date)) => date >= after,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        matched
    }
}
