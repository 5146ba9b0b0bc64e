//! Last delivered fingerprint per content item.

use dashmap::DashMap;

use crate::source::ContentId;

/// Remembers what was last delivered so unchanged content is not re-sent.
pub trait DeliveryLedger: Send + Sync {
    fn fingerprint(&self, id: ContentId) -> Option<String>;

    fn record(&self, id: ContentId, fingerprint: &str);

    /// Whether `id` has never been delivered.
    fn is_unsent(&self, id: ContentId) -> bool {
        self.fingerprint(id).map_or(true, |fp| fp.is_empty())
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    hashes: DashMap<ContentId, String>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl DeliveryLedger for MemoryLedger {
    fn fingerprint(&self, id: ContentId) -> Option<String> {
        self.hashes.get(&id).map(|entry| entry.value().clone())
    }

    fn record(&self, id: ContentId, fingerprint: &str) {
        self.hashes.insert(id, fingerprint.to_string());
    }
}
