//! Redis-backed counting store for production deployments.
//!
//! Counters use a single `INCR` + `EXPIRE` script that sets expiry whenever
//! the counter has none. Sliding windows use sorted sets, tightening and
//! CAPTCHA state use plain `SET ... EX` strings, and the violation log is a
//! capped list. Every round-trip is bounded by the configured timeout.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult, Script};
use std::future::Future;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::ports::{CountingStore, ScoredMember, StoreError};

/// Batch size hint for `SCAN`.
const SCAN_COUNT: u64 = 500;

/// Increment and expiry in one atomic step. A counter left without a TTL
/// (e.g. written by an older deployment) gets one on its next increment.
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Redis-backed counting store for multi-server deployments.
///
/// Each operation is a single atomic Redis command (or a `MULTI` pipeline
/// for the add-then-expire pairs), which is all the window algorithms need:
/// concurrent requests may race on the count but never lose an increment
/// or double a TTL.
#[derive(Clone)]
pub struct RedisCountingStore {
    conn: MultiplexedConnection,
    timeout: Duration,
    increment: Script,
}

impl RedisCountingStore {
    /// Wrap an existing connection.
    pub fn new(conn: MultiplexedConnection, timeout: Duration) -> Self {
        Self {
            conn,
            timeout,
            increment: Script::new(INCREMENT_SCRIPT),
        }
    }

    /// Open a multiplexed connection using `config`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {}", e)))?;

        let conn = tokio::time::timeout(config.timeout(), client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| StoreError::Timeout(config.timeout()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::debug!("Connected to Redis counting store");
        Ok(Self::new(conn, config.timeout()))
    }

    /// Await a Redis future under the configured timeout.
    async fn run<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(|e: redis::RedisError| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl CountingStore for RedisCountingStore {
    async fn increment_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .run(
                self.increment
                    .key(key)
                    .arg(ttl_secs)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(count)
    }

    async fn get_count(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.get(key)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        // -2: missing, -1: no expiry
        let ttl: i64 = self.run(conn.ttl(key)).await?;
        Ok((ttl >= 0).then_some(ttl as u64))
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = self
            .run(
                redis::pipe()
                    .atomic()
                    .cmd("ZADD")
                    .arg(key)
                    .arg(score)
                    .arg(member)
                    .ignore()
                    .cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_secs)
                    .ignore()
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn sorted_set_remove_below(&self, key: &str, min_score: i64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.run(
            redis::cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg("-inf")
                .arg(format!("({}", min_score))
                .query_async(&mut conn),
        )
        .await
    }

    async fn sorted_set_count(&self, key: &str, min_score: i64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        self.run(
            redis::cmd("ZCOUNT")
                .arg(key)
                .arg(min_score)
                .arg("+inf")
                .query_async(&mut conn),
        )
        .await
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        min_score: i64,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, f64)> = self
            .run(
                redis::cmd("ZRANGEBYSCORE")
                    .arg(key)
                    .arg(min_score)
                    .arg("+inf")
                    .arg("WITHSCORES")
                    .arg("LIMIT")
                    .arg(0)
                    .arg(limit)
                    .query_async(&mut conn),
            )
            .await?;

        Ok(raw
            .into_iter()
            .map(|(member, score)| ScoredMember {
                member,
                score: score as i64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = self
            .run(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // Reply is OK when written, nil when the key already exists
        let reply: Option<String> = self
            .run(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = self.run(conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let last_index = capacity.saturating_sub(1) as i64;
        let _: () = self
            .run(
                redis::pipe()
                    .atomic()
                    .cmd("LPUSH")
                    .arg(key)
                    .arg(value)
                    .ignore()
                    .cmd("LTRIM")
                    .arg(key)
                    .arg(0)
                    .arg(last_index)
                    .ignore()
                    .cmd("EXPIRE")
                    .arg(key)
                    .arg(ttl_secs)
                    .ignore()
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        self.run(
            redis::cmd("LRANGE")
                .arg(key)
                .arg(0)
                .arg(limit as i64 - 1)
                .query_async(&mut conn),
        )
        .await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .run(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl std::fmt::Debug for RedisCountingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCountingStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis: cargo test -- --ignored
    async fn increment_sets_ttl_on_first_hit() {
        let store = RedisCountingStore::connect(&local_config()).await.unwrap();
        let key = format!("rate_limit:test:{}", uuid::Uuid::new_v4());

        assert_eq!(store.increment_with_ttl(&key, 60).await.unwrap(), 1);
        assert_eq!(store.increment_with_ttl(&key, 60).await.unwrap(), 2);
        let ttl = store.ttl(&key).await.unwrap().unwrap();
        assert!(ttl > 0 && ttl <= 60);

        assert!(store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis: cargo test -- --ignored
    async fn increment_restores_missing_ttl() {
        let store = RedisCountingStore::connect(&local_config()).await.unwrap();
        let key = format!("rate_limit:test:{}", uuid::Uuid::new_v4());
        let mut conn = store.conn.clone();

        let _: () = conn.set(&key, 5_u64).await.unwrap();
        assert_eq!(store.ttl(&key).await.unwrap(), None);

        assert_eq!(store.increment_with_ttl(&key, 60).await.unwrap(), 6);
        let ttl = store.ttl(&key).await.unwrap().unwrap();
        assert!(ttl > 0 && ttl <= 60);

        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis: cargo test -- --ignored
    async fn sorted_set_round_trip() {
        let store = RedisCountingStore::connect(&local_config()).await.unwrap();
        let key = format!("rate_limit:test:{}", uuid::Uuid::new_v4());

        store.sorted_set_add(&key, "a", 100, 60).await.unwrap();
        store.sorted_set_add(&key, "b", 200, 60).await.unwrap();
        assert_eq!(store.sorted_set_count(&key, 150).await.unwrap(), 1);
        assert_eq!(store.sorted_set_remove_below(&key, 150).await.unwrap(), 1);
        let range = store.sorted_set_range(&key, i64::MIN, 1).await.unwrap();
        assert_eq!(range[0].member, "b");
        assert_eq!(range[0].score, 200);

        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let config = RedisConfig {
            url: "redis://127.0.0.1:1/".to_string(),
            timeout_secs: 1,
            ..Default::default()
        };
        let err = RedisCountingStore::connect(&config).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_) | StoreError::Timeout(_)));
    }
}
