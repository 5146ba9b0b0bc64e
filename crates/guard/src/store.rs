//! Shared replay state.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Nonce prune kicks in once the map grows past this many entries.
const NONCE_PRUNE_THRESHOLD: usize = 4096;

/// Storage for seen nonces and per-minute request counters.
///
/// Both mutating operations must be atomic with respect to concurrent
/// callers: two requests racing on the same nonce must never both win
/// [`claim_nonce`](ReplayStore::claim_nonce).
pub trait ReplayStore: Send + Sync {
    /// Whether `key` was claimed and has not yet expired at `now`.
    fn nonce_seen(&self, key: &str, now: i64) -> bool;

    /// Atomically record `key` until `now + ttl`. Returns `false` if an
    /// unexpired claim already exists.
    fn claim_nonce(&self, key: &str, now: i64, ttl: i64) -> bool;

    /// Atomically count one request in `window`. Returns `false` once
    /// `limit` requests have already been counted.
    fn hit_window(&self, window: &str, limit: u32) -> bool;
}

/// In-process [`ReplayStore`] backed by `DashMap` entry locking.
#[derive(Debug, Default)]
pub struct MemoryReplayStore {
    nonces: DashMap<String, i64>,
    windows: DashMap<String, u32>,
}

impl MemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nonce_count(&self) -> usize {
        self.nonces.len()
    }

    fn prune_nonces(&self, now: i64) {
        if self.nonces.len() > NONCE_PRUNE_THRESHOLD {
            self.nonces.retain(|_, expires_at| *expires_at > now);
        }
    }
}

impl ReplayStore for MemoryReplayStore {
    fn nonce_seen(&self, key: &str, now: i64) -> bool {
        self.nonces
            .get(key)
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false)
    }

    fn claim_nonce(&self, key: &str, now: i64, ttl: i64) -> bool {
        let claimed = match self.nonces.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(now + ttl);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                true
            }
        };
        self.prune_nonces(now);
        claimed
    }

    fn hit_window(&self, window: &str, limit: u32) -> bool {
        let allowed = {
            let mut count = self.windows.entry(window.to_string()).or_insert(0);
            if *count >= limit {
                false
            } else {
                *count += 1;
                true
            }
        };
        if self.windows.len() > 1 {
            self.windows.retain(|key, _| key.as_str() >= window);
        }
        allowed
    }
}
