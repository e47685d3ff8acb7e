//! Networked store backed by Redis
//!
//! The connection is opened lazily and dropped on any transport error, so the
//! next call after an outage reconnects without outside help.

use super::CacheStore;
use crate::error::CacheError;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 200;

pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
}

impl RedisStore {
    /// Parse the URL; no network I/O happens until the first command
    pub fn open(url: &str, connect_timeout: Duration) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::Connection(redacted(&e)))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            connect_timeout,
        })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(conn) = self.connection.lock().as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CacheError::Connection("connection timeout".to_string()))?
        .map_err(|e| CacheError::Connection(redacted(&e)))?;

        debug!("Redis connection established");
        *self.connection.lock() = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the connection after a transport failure
    fn on_error(&self, err: redis::RedisError) -> CacheError {
        let err = CacheError::from(err);
        if err.is_connection() {
            warn!(error = %err, "Redis connection lost");
            *self.connection.lock() = None;
        }
        err
    }
}

/// Error text without the URL (which may carry a password)
fn redacted(err: &redis::RedisError) -> String {
    match err.detail() {
        Some(detail) if !detail.contains("://") => format!("{:?}: {}", err.kind(), detail),
        _ => format!("{:?}", err.kind()),
    }
}

/// Escape Redis glob metacharacters other than `*` and `?`
fn redis_match_pattern(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len());
    for c in glob.chars() {
        if matches!(c, '[' | ']' | '\\' | '^') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl CacheStore for RedisStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| self.on_error(e))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| self.on_error(e))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let removed: usize = conn.del(key).await.map_err(|e| self.on_error(e))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        conn.exists::<_, bool>(key)
            .await
            .map_err(|e| self.on_error(e))
    }

    async fn clear_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn().await?;
        let pattern = redis_match_pattern(pattern);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.on_error(e))?;

            if !keys.is_empty() {
                let n: usize = conn.del(&keys).await.map_err(|e| self.on_error(e))?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| self.on_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_pattern_escapes_brackets() {
        assert_eq!(redis_match_pattern("gaplus:query:*"), "gaplus:query:*");
        assert_eq!(redis_match_pattern("a[b]?"), "a\\[b\\]?");
    }

    #[test]
    fn test_open_rejects_bad_url() {
        let result = RedisStore::open("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(CacheError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let store = RedisStore::open("redis://127.0.0.1:1/0", Duration::from_millis(200)).unwrap();
        let err = store.get("gaplus:query:x").await.unwrap_err();
        assert!(err.is_connection());
    }
}
