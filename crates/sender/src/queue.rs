//! Ordered queue of items waiting for the next batch tick.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::ContentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub content_id: ContentId,
    pub fingerprint_hash: String,
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO of pending deliveries, at most one entry per content item.
///
/// Items are removed one at a time so an enqueue racing a drain is never
/// lost.
pub trait BatchQueue: Send + Sync {
    /// Append `item` unless its content id is already queued. Returns
    /// whether it was added.
    fn enqueue(&self, item: QueueItem) -> bool;

    /// Snapshot of the queue, oldest first.
    fn items(&self) -> Vec<QueueItem>;

    fn remove(&self, id: ContentId) -> bool;

    fn len(&self) -> usize {
        self.items().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryBatchQueue {
    items: Mutex<VecDeque<QueueItem>>,
}

impl MemoryBatchQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchQueue for MemoryBatchQueue {
    fn enqueue(&self, item: QueueItem) -> bool {
        let mut items = self.items.lock().expect("batch queue lock poisoned");
        if items.iter().any(|queued| queued.content_id == item.content_id) {
            return false;
        }
        items.push_back(item);
        true
    }

    fn items(&self) -> Vec<QueueItem> {
        self.items
            .lock()
            .expect("batch queue lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn remove(&self, id: ContentId) -> bool {
        let mut items = self.items.lock().expect("batch queue lock poisoned");
        let before = items.len();
        items.retain(|item| item.content_id != id);
        items.len() != before
    }

    fn len(&self) -> usize {
        self.items.lock().expect("batch queue lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: ContentId) -> QueueItem {
        QueueItem {
            content_id: id,
            fingerprint_hash: format!("h{id}"),
            enqueued_at: Utc::now(),
        }
    }

    #[test]
    fn enqueue_deduplicates_by_content_id() {
        let queue = MemoryBatchQueue::new();
        assert!(queue.enqueue(item(1)));
        assert!(queue.enqueue(item(2)));
        assert!(!queue.enqueue(item(1)));
        let ids: Vec<_> = queue.items().iter().map(|i| i.content_id).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn remove_keeps_order() {
        let queue = MemoryBatchQueue::new();
        for id in 1..=3 {
            queue.enqueue(item(id));
        }
        assert!(queue.remove(2));
        assert!(!queue.remove(2));
        let ids: Vec<_> = queue.items().iter().map(|i| i.content_id).collect();
        assert_eq!(ids, [1, 3]);
        assert_eq!(queue.len(), 2);
    }
}
