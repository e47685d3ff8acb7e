//! Result cache for gaplus-core
//!
//! [`QueryCache`] fronts two stores behind the [`CacheStore`] trait:
//! - an in-process [`MemoryStore`] that is always present
//! - an optional networked store (Redis) used while healthy
//!
//! Remote failures never surface to callers. The remote is bypassed for a
//! cool-down period after an error and retried afterwards. Writes always land
//! in memory too, so an outage keeps recent entries warm.

pub mod key;
pub mod memory;
pub mod redis_store;

pub use key::{query_digest, query_key};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::config::CacheConfig;
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Key/value store with per-entry TTL
///
/// Keys arrive fully prefixed. Values are opaque strings (JSON in practice).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend label for diagnostics
    fn kind(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove keys matching a glob (`*` any run, `?` one char); returns count removed
    async fn clear_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Compile a cache glob into an anchored regex
///
/// Only `*` and `?` are special; every other character matches itself.
pub(crate) fn glob_to_regex(glob: &str) -> Result<Regex, CacheError> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 2);
    pattern.push('^');
    let mut buf = [0u8; 4];
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| CacheError::Command(format!("bad pattern '{}': {}", glob, e)))
}

/// Value as written to a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedValue<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of cache activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
    pub memory_entries: usize,
    pub memory_capacity: usize,
    /// `hybrid` with a networked store configured, else `memory`
    pub cache_type: String,
    pub remote_connected: bool,
}

/// Result of [`QueryCache::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub memory: bool,
    /// None when no networked store is configured
    pub remote: Option<bool>,
}

/// Hybrid cache with silent degradation to memory
pub struct QueryCache {
    memory: MemoryStore,
    remote: Option<Arc<dyn CacheStore>>,
    prefix: String,
    remote_retry: Duration,
    remote_down_until: Mutex<Option<Instant>>,
    counters: Counters,
}

impl QueryCache {
    /// Memory-only cache
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            memory: MemoryStore::new(config.max_memory_entries),
            remote: None,
            prefix: config.key_prefix.clone(),
            remote_retry: Duration::from_secs(config.remote_retry_secs),
            remote_down_until: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Attach a networked store
    pub fn with_remote(mut self, remote: Arc<dyn CacheStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Build from config, attaching Redis when `redis_url` is set
    ///
    /// A malformed URL is logged and the cache runs memory-only.
    pub fn from_config(config: &CacheConfig) -> Self {
        let cache = Self::new(config);
        let Some(url) = config.redis_url.as_deref() else {
            debug!("No redis_url configured, using memory cache only");
            return cache;
        };

        match RedisStore::open(url, Duration::from_secs(2)) {
            Ok(store) => {
                info!("Networked cache configured");
                cache.with_remote(Arc::new(store))
            }
            Err(e) => {
                warn!(error = %e, "Invalid redis_url, using memory cache only");
                cache
            }
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Remote store if configured and not cooling down
    fn active_remote(&self) -> Option<&Arc<dyn CacheStore>> {
        let remote = self.remote.as_ref()?;
        let mut down_until = self.remote_down_until.lock();
        match *down_until {
            Some(until) if Instant::now() < until => None,
            Some(_) => {
                *down_until = None;
                info!("Retrying networked cache after cool-down");
                Some(remote)
            }
            None => Some(remote),
        }
    }

    fn remote_failed(&self, op: &'static str, err: &CacheError) {
        Counters::bump(&self.counters.errors);
        if err.is_connection() {
            *self.remote_down_until.lock() = Some(Instant::now() + self.remote_retry);
            warn!(op, error = %err, retry_secs = self.remote_retry.as_secs(), "Networked cache unavailable, degrading to memory");
        } else {
            warn!(op, error = %err, "Networked cache command failed");
        }
    }

    async fn lookup(&self, full_key: &str) -> Option<String> {
        if let Some(remote) = self.active_remote() {
            match remote.get(full_key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => self.remote_failed("get", &e),
            }
        }

        match self.memory.get(full_key).await {
            Ok(value) => value,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(error = %e, "Memory cache get failed");
                None
            }
        }
    }

    /// Raw lookup; counts a hit or a miss
    pub async fn get(&self, key: &str) -> Option<String> {
        let value = self.lookup(&self.full_key(key)).await;
        if value.is_some() {
            Counters::bump(&self.counters.hits);
        } else {
            Counters::bump(&self.counters.misses);
        }
        value
    }

    /// Raw write to every available store
    ///
    /// # Returns
    /// `true` once the in-process store accepted the value
    pub async fn set(&self, key: &str, value: String, ttl: Duration) -> bool {
        let full_key = self.full_key(key);
        Counters::bump(&self.counters.sets);

        if let Some(remote) = self.active_remote() {
            if let Err(e) = remote.set(&full_key, value.clone(), ttl).await {
                self.remote_failed("set", &e);
            }
        }

        match self.memory.set(&full_key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(error = %e, "Memory cache set failed");
                false
            }
        }
    }

    /// Remove a key everywhere; idempotent
    pub async fn delete(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        Counters::bump(&self.counters.deletes);

        let mut removed = false;
        if let Some(remote) = self.active_remote() {
            match remote.delete(&full_key).await {
                Ok(r) => removed |= r,
                Err(e) => self.remote_failed("delete", &e),
            }
        }
        removed |= self.memory.delete(&full_key).await.unwrap_or(false);
        removed
    }

    pub async fn exists(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        if let Some(remote) = self.active_remote() {
            match remote.exists(&full_key).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => self.remote_failed("exists", &e),
            }
        }
        self.memory.exists(&full_key).await.unwrap_or(false)
    }

    /// Remove every key matching `pattern` (relative to the store prefix)
    ///
    /// # Returns
    /// Largest count removed by any single store
    pub async fn clear_pattern(&self, pattern: &str) -> usize {
        let full_pattern = self.full_key(pattern);
        let mut removed = 0;

        if let Some(remote) = self.active_remote() {
            match remote.clear_pattern(&full_pattern).await {
                Ok(n) => removed = n,
                Err(e) => self.remote_failed("clear_pattern", &e),
            }
        }

        match self.memory.clear_pattern(&full_pattern).await {
            Ok(n) => removed = removed.max(n),
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(error = %e, pattern, "Memory cache clear failed");
            }
        }

        info!(pattern, removed, "Cache entries cleared");
        removed
    }

    /// Typed lookup; undecodable entries count as errors and misses
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<CachedValue<T>> {
        let raw = self.get(key).await?;
        match serde_json::from_str::<CachedValue<T>>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Typed write wrapped with `cached_at` and `ttl_secs`
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let wrapped = CachedValue {
            value,
            cached_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        match serde_json::to_string(&wrapped) {
            Ok(raw) => self.set(key, raw, ttl).await,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(key, error = %e, "Cache value not serializable");
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            memory_entries: self.memory.len(),
            memory_capacity: self.memory.capacity(),
            cache_type: (if self.remote.is_some() { "hybrid" } else { "memory" }).to_string(),
            remote_connected: self.remote.is_some() && self.remote_down_until.lock().is_none(),
        }
    }

    /// Ping the networked store; success ends any cool-down early
    pub async fn health_check(&self) -> CacheHealth {
        let Some(remote) = self.remote.as_ref() else {
            return CacheHealth {
                memory: true,
                remote: None,
            };
        };

        let healthy = match remote.ping().await {
            Ok(()) => {
                *self.remote_down_until.lock() = None;
                true
            }
            Err(e) => {
                self.remote_failed("ping", &e);
                false
            }
        };

        CacheHealth {
            memory: true,
            remote: Some(healthy),
        }
    }
}
