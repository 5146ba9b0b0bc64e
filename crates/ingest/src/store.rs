//! Storage collaborators of the receiver.
//!
//! The pipeline never talks to a database directly. It works through three
//! traits:
//!
//! - [`ContentStore`]: content items, their meta values and taxonomy terms
//! - [`MediaStore`]: media items used as primary images
//! - [`AuthorDirectory`]: user lookups for author resolution
//!
//! In-memory implementations are bundled for tests and single-process
//! deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

pub type ContentId = u64;
pub type MediaId = u64;
pub type TermId = u64;
pub type UserId = u64;

/// Failures reported by a storage collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    #[error("content {0} not found")]
    NotFound(ContentId),

    /// Backend specific failure with a short machine code.
    #[error("{message}")]
    Backend { code: String, message: String },
}

impl StoreError {
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Backend { code, .. } => code,
        }
    }
}

/// Taxonomies the bridge assigns terms in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    Category,
    Tag,
}

impl Taxonomy {
    pub fn name(&self) -> &'static str {
        match self {
            Taxonomy::Category => "category",
            Taxonomy::Tag => "post_tag",
        }
    }
}

/// A content item as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredContent {
    pub id: ContentId,
    pub post_type: String,
    pub status: String,
    pub title: String,
    pub content_html: String,
    pub excerpt: String,
    pub author_id: Option<UserId>,
    pub date: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
}

/// Fields for a new item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentDraft {
    pub post_type: String,
    pub status: String,
    pub title: String,
    pub content_html: String,
    pub excerpt: String,
    pub author_id: Option<UserId>,
    pub date: Option<DateTime<Utc>>,
}

/// Changes to an existing item. `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentPatch {
    pub status: Option<String>,
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub excerpt: Option<String>,
    pub author_id: Option<UserId>,
}

/// Content repository the receiver writes into.
pub trait ContentStore: Send + Sync {
    /// First item of `post_type` whose meta `key` equals `value`.
    fn find_by_key(
        &self,
        post_type: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<ContentId>, StoreError>;

    /// First item of `post_type` matching both meta pairs.
    fn find_by_keys(
        &self,
        post_type: &str,
        first: (&str, &str),
        second: (&str, &str),
    ) -> Result<Option<ContentId>, StoreError>;

    fn get(&self, id: ContentId) -> Result<Option<StoredContent>, StoreError>;

    fn create(&self, draft: ContentDraft, now: DateTime<Utc>) -> Result<ContentId, StoreError>;

    fn update(&self, id: ContentId, patch: ContentPatch, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    fn set_meta(&self, id: ContentId, key: &str, value: &str) -> Result<(), StoreError>;

    fn get_meta(&self, id: ContentId, key: &str) -> Result<Option<String>, StoreError>;

    fn delete_meta(&self, id: ContentId, key: &str) -> Result<(), StoreError>;

    /// Whether items of `post_type` can carry terms of `taxonomy`.
    fn supports_taxonomy(&self, post_type: &str, taxonomy: Taxonomy) -> bool;

    fn find_term(&self, taxonomy: Taxonomy, name: &str) -> Result<Option<TermId>, StoreError>;

    fn create_term(&self, taxonomy: Taxonomy, name: &str) -> Result<TermId, StoreError>;

    /// Replace the item's terms in `taxonomy`. Returns the number assigned.
    fn set_terms(
        &self,
        id: ContentId,
        taxonomy: Taxonomy,
        terms: &[TermId],
    ) -> Result<usize, StoreError>;
}

/// Media library used for featured images.
pub trait MediaStore: Send + Sync {
    fn find_by_source_url(&self, url: &str) -> Result<Option<MediaId>, StoreError>;

    /// Download `url` into the library, owned by `owner`.
    fn sideload(&self, url: &str, owner: ContentId, alt: &str) -> Result<MediaId, StoreError>;

    fn set_as_primary_image(&self, content: ContentId, media: MediaId) -> Result<(), StoreError>;

    fn set_meta(&self, media: MediaId, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Contributor,
    Subscriber,
}

impl Role {
    /// Roles allowed to own ingested content when matched by name or email.
    pub fn may_own_content(&self) -> bool {
        matches!(self, Role::Administrator | Role::Editor | Role::Author)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub display_name: String,
    pub email: String,
    pub roles: Vec<Role>,
}

/// User lookups needed to pick an author.
pub trait AuthorDirectory: Send + Sync {
    fn by_login(&self, login: &str) -> Option<User>;
    fn by_display_name(&self, name: &str) -> Option<User>;
    fn by_email(&self, email: &str) -> Option<User>;
    /// Ids of users holding `role`, in directory order.
    fn with_role(&self, role: Role) -> Vec<UserId>;
}

#[derive(Debug, Default)]
struct ContentTables {
    items: BTreeMap<ContentId, StoredContent>,
    meta: HashMap<ContentId, BTreeMap<String, String>>,
    terms: HashMap<(ContentId, Taxonomy), Vec<TermId>>,
}

/// In-process [`ContentStore`].
///
/// Every post type supports both taxonomies unless it was registered with
/// [`MemoryContentStore::without_taxonomy`].
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    tables: RwLock<ContentTables>,
    term_names: DashMap<(Taxonomy, String), TermId>,
    unsupported: Vec<(String, Taxonomy)>,
    next_id: AtomicU64,
    next_term: AtomicU64,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store in which `post_type` items cannot carry `taxonomy` terms.
    pub fn without_taxonomy(mut self, post_type: &str, taxonomy: Taxonomy) -> Self {
        self.unsupported.push((post_type.to_string(), taxonomy));
        self
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the terms assigned to `id`, in assignment order.
    pub fn term_names(&self, id: ContentId, taxonomy: Taxonomy) -> Vec<String> {
        let ids = self
            .read()
            .terms
            .get(&(id, taxonomy))
            .cloned()
            .unwrap_or_default();
        ids.iter()
            .filter_map(|term| {
                self.term_names
                    .iter()
                    .find(|entry| entry.key().0 == taxonomy && entry.value() == term)
                    .map(|entry| entry.key().1.clone())
            })
            .collect()
    }

    /// Apply a local edit, as an editor on the receiving site would.
    pub fn edit<F>(&self, id: ContentId, at: DateTime<Utc>, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoredContent),
    {
        let mut tables = self.write();
        let item = tables.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(item);
        item.modified_at = at;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ContentTables> {
        self.tables.read().expect("content store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ContentTables> {
        self.tables.write().expect("content store lock poisoned")
    }

    fn meta_matches(tables: &ContentTables, id: ContentId, key: &str, value: &str) -> bool {
        tables
            .meta
            .get(&id)
            .and_then(|meta| meta.get(key))
            .is_some_and(|v| v == value)
    }
}

impl ContentStore for MemoryContentStore {
    fn find_by_key(
        &self,
        post_type: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<ContentId>, StoreError> {
        let tables = self.read();
        Ok(tables
            .items
            .values()
            .filter(|item| item.post_type == post_type)
            .find(|item| Self::meta_matches(&tables, item.id, key, value))
            .map(|item| item.id))
    }

    fn find_by_keys(
        &self,
        post_type: &str,
        first: (&str, &str),
        second: (&str, &str),
    ) -> Result<Option<ContentId>, StoreError> {
        let tables = self.read();
        Ok(tables
            .items
            .values()
            .filter(|item| item.post_type == post_type)
            .find(|item| {
                Self::meta_matches(&tables, item.id, first.0, first.1)
                    && Self::meta_matches(&tables, item.id, second.0, second.1)
            })
            .map(|item| item.id))
    }

    fn get(&self, id: ContentId) -> Result<Option<StoredContent>, StoreError> {
        Ok(self.read().items.get(&id).cloned())
    }

    fn create(&self, draft: ContentDraft, now: DateTime<Utc>) -> Result<ContentId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let item = StoredContent {
            id,
            post_type: draft.post_type,
            status: draft.status,
            title: draft.title,
            content_html: draft.content_html,
            excerpt: draft.excerpt,
            author_id: draft.author_id,
            date: draft.date.or(Some(now)),
            modified_at: now,
        };
        self.write().items.insert(id, item);
        Ok(id)
    }

    fn update(
        &self,
        id: ContentId,
        patch: ContentPatch,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        let item = tables.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(status) = patch.status {
            item.status = status;
        }
        if let Some(title) = patch.title {
            item.title = title;
        }
        if let Some(html) = patch.content_html {
            item.content_html = html;
        }
        if let Some(excerpt) = patch.excerpt {
            item.excerpt = excerpt;
        }
        if patch.author_id.is_some() {
            item.author_id = patch.author_id;
        }
        item.modified_at = now;
        Ok(())
    }

    fn set_meta(&self, id: ContentId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut tables = self.write();
        if !tables.items.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        tables
            .meta
            .entry(id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_meta(&self, id: ContentId, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .read()
            .meta
            .get(&id)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    fn delete_meta(&self, id: ContentId, key: &str) -> Result<(), StoreError> {
        if let Some(meta) = self.write().meta.get_mut(&id) {
            meta.remove(key);
        }
        Ok(())
    }

    fn supports_taxonomy(&self, post_type: &str, taxonomy: Taxonomy) -> bool {
        !self
            .unsupported
            .iter()
            .any(|(pt, tax)| pt == post_type && *tax == taxonomy)
    }

    fn find_term(&self, taxonomy: Taxonomy, name: &str) -> Result<Option<TermId>, StoreError> {
        Ok(self
            .term_names
            .get(&(taxonomy, name.to_string()))
            .map(|id| *id))
    }

    fn create_term(&self, taxonomy: Taxonomy, name: &str) -> Result<TermId, StoreError> {
        let id = *self
            .term_names
            .entry((taxonomy, name.to_string()))
            .or_insert_with(|| self.next_term.fetch_add(1, Ordering::Relaxed) + 1);
        Ok(id)
    }

    fn set_terms(
        &self,
        id: ContentId,
        taxonomy: Taxonomy,
        terms: &[TermId],
    ) -> Result<usize, StoreError> {
        let mut tables = self.write();
        if !tables.items.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        tables.terms.insert((id, taxonomy), terms.to_vec());
        Ok(terms.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub id: MediaId,
    pub url: String,
    pub owner: ContentId,
    pub meta: BTreeMap<String, String>,
}

/// In-process [`MediaStore`]. Sideloading records the URL without fetching.
#[derive(Debug, Default)]
pub struct MemoryMediaStore {
    items: DashMap<MediaId, MediaItem>,
    primary: DashMap<ContentId, MediaId>,
    next_id: AtomicU64,
    sideload_failure: Option<StoreError>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose sideloads always fail with `err`.
    pub fn failing_sideload(err: StoreError) -> Self {
        Self {
            sideload_failure: Some(err),
            ..Self::default()
        }
    }

    pub fn primary_image(&self, content: ContentId) -> Option<MediaId> {
        self.primary.get(&content).map(|id| *id)
    }

    pub fn get(&self, media: MediaId) -> Option<MediaItem> {
        self.items.get(&media).map(|item| item.clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl MediaStore for MemoryMediaStore {
    fn find_by_source_url(&self, url: &str) -> Result<Option<MediaId>, StoreError> {
        Ok(self
            .items
            .iter()
            .find(|item| {
                item.meta
                    .get(crate::keys::MEDIA_SOURCE_URL)
                    .is_some_and(|v| v == url)
            })
            .map(|item| item.id))
    }

    fn sideload(&self, url: &str, owner: ContentId, _alt: &str) -> Result<MediaId, StoreError> {
        if let Some(err) = &self.sideload_failure {
            return Err(err.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.items.insert(
            id,
            MediaItem {
                id,
                url: url.to_string(),
                owner,
                meta: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn set_as_primary_image(&self, content: ContentId, media: MediaId) -> Result<(), StoreError> {
        self.primary.insert(content, media);
        Ok(())
    }

    fn set_meta(&self, media: MediaId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut item = self
            .items
            .get_mut(&media)
            .ok_or_else(|| StoreError::backend("media_not_found", format!("media {media} not found")))?;
        item.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// In-process [`AuthorDirectory`] over a fixed user list.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuthorDirectory {
    users: Vec<User>,
}

impl MemoryAuthorDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }
}

impl AuthorDirectory for MemoryAuthorDirectory {
    fn by_login(&self, login: &str) -> Option<User> {
        self.users.iter().find(|u| u.login == login).cloned()
    }

    fn by_display_name(&self, name: &str) -> Option<User> {
        self.users.iter().find(|u| u.display_name == name).cloned()
    }

    fn by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    fn with_role(&self, role: Role) -> Vec<UserId> {
        self.users
            .iter()
            .filter(|u| u.roles.contains(&role))
            .map(|u| u.id)
            .collect()
    }
}
