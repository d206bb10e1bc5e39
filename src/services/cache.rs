//! Response cache shared by all sources of one orchestrator.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::EnrichedFragment;

#[derive(Debug, Clone)]
struct CacheEntry {
    stored_at: Instant,
    value: Option<EnrichedFragment>,
}

/// TTL cache of source results keyed by `source:query`.
///
/// "No signal" results are cached too, so a gym that one source knows
/// nothing about is not re-queried within the TTL.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// A zero TTL disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: (!ttl.is_zero()).then_some(ttl),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn key(source: &str, query: &str) -> String {
        format!("{source}:{query}")
    }

    /// `Some(result)` on a fresh hit, `None` on miss or expiry.
    pub fn get(&self, key: &str) -> Option<Option<EnrichedFragment>> {
        let ttl = self.ttl?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: Option<EnrichedFragment>) {
        if self.ttl.is_none() {
            return;
        }
        self.entries.lock().insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
