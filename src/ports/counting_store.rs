//! Counting store port - the single seam over the shared key-value store.
//!
//! Both window algorithms, the violation tracker and the admin operations
//! go through this trait. Correctness under concurrency relies only on each
//! individual operation being atomic in the backing store; no multi-key
//! transactions are assumed.

use async_trait::async_trait;
use std::time::Duration;

/// A sorted-set member with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

/// Port for the shared counting store.
///
/// Implementations must be safe for concurrent use and should bound every
/// round-trip with a timeout, surfacing it as [`StoreError::Timeout`].
#[async_trait]
pub trait CountingStore: Send + Sync {
    /// Atomically increments the integer at `key` and returns the new value.
    ///
    /// When the increment creates the key (the result is 1) the key's TTL is
    /// set to `ttl_secs`. Later increments leave a running TTL alone but
    /// restore it if the key has none, so a counter can never outlive its
    /// window indefinitely.
    async fn increment_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError>;

    /// Current integer value at `key`, if any.
    async fn get_count(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Remaining time to live in whole seconds. `None` if the key is missing
    /// or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Adds `member` with `score` and refreshes the set's TTL.
    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Removes every member scored strictly below `min_score`. Returns the
    /// number removed.
    async fn sorted_set_remove_below(&self, key: &str, min_score: i64) -> Result<u64, StoreError>;

    /// Number of members scored at or above `min_score`.
    async fn sorted_set_count(&self, key: &str, min_score: i64) -> Result<u64, StoreError>;

    /// Up to `limit` members scored at or above `min_score`, lowest score first.
    async fn sorted_set_range(
        &self,
        key: &str,
        min_score: i64,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, StoreError>;

    /// String value at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` with a TTL, overwriting any previous value.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Stores `value` only if `key` does not exist. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64)
        -> Result<bool, StoreError>;

    /// Deletes `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Prepends `value` to the list at `key`, trims it to `capacity` entries
    /// (oldest evicted) and refreshes its TTL.
    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Up to `limit` entries of the list at `key`, newest first.
    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Keys matching a glob `pattern` (only `*` wildcards are used).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// Errors from the counting store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store backend is unreachable or returned an error.
    #[error("counting store unavailable: {0}")]
    Unavailable(String),

    /// A round-trip exceeded the configured timeout.
    #[error("counting store timed out after {0:?}")]
    Timeout(Duration),

    /// The key holds a value of an unexpected type.
    #[error("unexpected value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn CountingStore) {}

    #[test]
    fn store_error_messages() {
        let err = StoreError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "counting store timed out after 250ms");
        let err = StoreError::Unavailable("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}
