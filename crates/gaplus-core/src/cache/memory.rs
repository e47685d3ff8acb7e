//! In-process TTL store
//!
//! Always available. Bounded by entry count: when full, expired entries go
//! first, then the oldest quarter by creation time.

use super::{glob_to_regex, CacheStore};
use crate::error::CacheError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    created_at: Instant,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// DashMap-backed store (per-key atomic, last writer wins)
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make room for one insert
    fn evict(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));

        if self.entries.len() >= self.max_entries {
            let mut by_age: Vec<(String, Instant)> = self
                .entries
                .iter()
                .map(|e| (e.key().clone(), e.value().created_at))
                .collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);

            let to_drop = (by_age.len() / 4).max(1);
            for (key, _) in by_age.into_iter().take(to_drop) {
                self.entries.remove(&key);
            }
        }

        debug!(
            before,
            after = self.entries.len(),
            "Memory cache evicted entries"
        );
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.remove_expired(key, now);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Drop `key` only if the entry stored now is still expired; a concurrent
    /// set between the read and the removal survives
    fn remove_expired(&self, key: &str, now: Instant) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict(now);
        }

        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live_value(key, Instant::now()).is_some())
    }

    async fn clear_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex = glob_to_regex(pattern)?;
        let before = self.entries.len();
        self.entries.retain(|key, _| !regex.is_match(key));
        Ok(before - self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_delete() {
        let store = MemoryStore::new(10);
        store.set("k", "v".into(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap(), "Second delete is a no-op");
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new(10);
        store.set("k", "v".into(), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty(), "Expired entry removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_read_keeps_fresh_write() {
        let store = MemoryStore::new(10);
        store.set("k", "old".into(), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        let seen_at = Instant::now();
        assert!(store.entries.get("k").unwrap().is_expired(seen_at));

        // Another writer refreshes the key after the reader saw it expired
        store.set("k", "new".into(), Duration::from_secs(60)).await.unwrap();
        assert!(!store.remove_expired("k", seen_at));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.remove_expired("k", Instant::now()));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_drops_oldest_quarter() {
        let store = MemoryStore::new(8);
        for i in 0..8 {
            store
                .set(&format!("k{}", i), i.to_string(), Duration::from_secs(600))
                .await
                .unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        store.set("k8", "8".into(), Duration::from_secs(600)).await.unwrap();

        assert_eq!(store.len(), 7, "8 entries - 2 oldest + 1 new");
        assert!(!store.exists("k0").await.unwrap());
        assert!(!store.exists("k1").await.unwrap());
        assert!(store.exists("k2").await.unwrap());
        assert!(store.exists("k8").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_prefers_expired() {
        let store = MemoryStore::new(4);
        store.set("short", "x".into(), Duration::from_secs(1)).await.unwrap();
        for i in 0..3 {
            store
                .set(&format!("long{}", i), "y".into(), Duration::from_secs(600))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set("new", "z".into(), Duration::from_secs(600)).await.unwrap();
        assert_eq!(store.len(), 4);
        assert!(store.exists("long0").await.unwrap(), "Live entries kept");
    }

    #[tokio::test]
    async fn test_clear_pattern() {
        let store = MemoryStore::new(10);
        for key in ["gaplus:query:aa", "gaplus:query:ab", "gaplus:other:aa"] {
            store.set(key, "v".into(), Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(store.clear_pattern("gaplus:query:*").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.clear_pattern("gaplus:other:a?").await.unwrap(), 1);
    }
}
