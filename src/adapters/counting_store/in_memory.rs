//! In-memory counting store for testing and single-instance development.
//!
//! Mirrors the Redis semantics the limiter relies on (counter TTL set
//! whenever missing, sorted sets ordered by score, capped lists) inside a
//! single `HashMap`. Expired entries are swept on write. Not suitable for
//! multi-server deployments.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adapters::clock::SystemClock;
use crate::domain::foundation::Timestamp;
use crate::ports::{Clock, CountingStore, ScoredMember, StoreError};

/// In-memory store with TTL expiry driven by an injectable clock.
pub struct InMemoryCountingStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    /// Simulated outage: every operation fails while set.
    unavailable: AtomicBool,
    /// Clock second of the last full expiry sweep.
    last_sweep_secs: AtomicU64,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    Text(String),
    SortedSet(Vec<ScoredMember>),
    List(VecDeque<String>),
}

impl Entry {
    fn is_live(&self, now: &Timestamp) -> bool {
        self.expires_at.map_or(true, |at| at.is_after(now))
    }
}

impl InMemoryCountingStore {
    /// Create a store that reads time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            unavailable: AtomicBool::new(false),
            last_sweep_secs: AtomicU64::new(0),
        }
    }

    /// Create a store on the wall clock.
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    // === Test Helpers ===

    /// Simulate the store going down (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every live key, sorted. Used to assert no raw identifiers leak into keys.
    pub async fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_live(&now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Entries physically held, expired or not.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Every live string and list value, for leak assertions.
    pub async fn stored_values(&self) -> Vec<String> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut values = Vec::new();
        for entry in entries.values().filter(|e| e.is_live(&now)) {
            match &entry.value {
                Value::Text(text) => values.push(text.clone()),
                Value::List(items) => values.extend(items.iter().cloned()),
                Value::SortedSet(members) => {
                    values.extend(members.iter().map(|m| m.member.clone()))
                }
                Value::Counter(_) => {}
            }
        }
        values
    }

    /// Clears the expiry of `key`, like Redis `PERSIST`. Returns whether the
    /// key existed.
    pub async fn persist(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key).filter(|e| e.is_live(&now)) {
            Some(entry) => {
                entry.expires_at = None;
                true
            }
            None => false,
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn expiry(&self, ttl_secs: u64) -> Option<Timestamp> {
        Some(self.clock.now().plus_secs(ttl_secs))
    }

    /// Drops `key` if it has expired so the next access sees it as absent.
    ///
    /// The first write in each clock second also drops every other expired
    /// entry, so keys that are never touched again do not accumulate.
    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, key: &str, now: &Timestamp) {
        let second = now.as_unix_secs();
        if self.last_sweep_secs.swap(second, Ordering::SeqCst) != second {
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            if entries.len() < before {
                tracing::trace!(evicted = before - entries.len(), "Swept expired entries");
            }
        } else if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
    }

    fn corrupt(key: &str, expected: &str) -> StoreError {
        StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("expected {}", expected),
        }
    }
}

#[async_trait]
impl CountingStore for InMemoryCountingStore {
    async fn increment_with_ttl(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key, &now);

        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Counter(count),
                expires_at,
            }) => {
                *count += 1;
                if expires_at.is_none() {
                    *expires_at = self.expiry(ttl_secs);
                }
                Ok(*count)
            }
            Some(_) => Err(Self::corrupt(key, "counter")),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(1),
                        expires_at: self.expiry(ttl_secs),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn get_count(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(&now)) {
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => Ok(Some(*count)),
            Some(_) => Err(Self::corrupt(key, "counter")),
            None => Ok(None),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(&now))
            .and_then(|e| e.expires_at)
            .map(|at| now.secs_until(&at)))
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl_secs);
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key, &now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::SortedSet(Vec::new()),
            expires_at,
        });
        let Value::SortedSet(members) = &mut entry.value else {
            return Err(Self::corrupt(key, "sorted set"));
        };

        members.retain(|m| m.member != member);
        let scored = ScoredMember {
            member: member.to_string(),
            score,
        };
        let at = members.partition_point(|m| (m.score, m.member.as_str()) < (score, member));
        members.insert(at, scored);
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn sorted_set_remove_below(&self, key: &str, min_score: i64) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key, &now);
        match entries.get_mut(key) {
            Some(Entry {
                value: Value::SortedSet(members),
                ..
            }) => {
                let before = members.len();
                members.retain(|m| m.score >= min_score);
                Ok((before - members.len()) as u64)
            }
            Some(_) => Err(Self::corrupt(key, "sorted set")),
            None => Ok(0),
        }
    }

    async fn sorted_set_count(&self, key: &str, min_score: i64) -> Result<u64, StoreError> {
        Ok(self.sorted_set_range(key, min_score, usize::MAX).await?.len() as u64)
    }

    async fn sorted_set_range(
        &self,
        key: &str,
        min_score: i64,
        limit: usize,
    ) -> Result<Vec<ScoredMember>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(&now)) {
            Some(Entry {
                value: Value::SortedSet(members),
                ..
            }) => Ok(members
                .iter()
                .filter(|m| m.score >= min_score)
                .take(limit)
                .cloned()
                .collect()),
            Some(_) => Err(Self::corrupt(key, "sorted set")),
            None => Ok(Vec::new()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(&now)) {
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => Ok(Some(count.to_string())),
            Some(_) => Err(Self::corrupt(key, "string")),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl_secs);
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key, &now);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl_secs);
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key, &now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(&now)))
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let expires_at = self.expiry(ttl_secs);
        let mut entries = self.entries.write().await;
        self.purge_expired(&mut entries, key, &now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at,
        });
        let Value::List(items) = &mut entry.value else {
            return Err(Self::corrupt(key, "list"));
        };
        items.push_front(value.to_string());
        items.truncate(capacity);
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(&now)) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.iter().take(limit).cloned().collect()),
            Some(_) => Err(Self::corrupt(key, "list")),
            None => Ok(Vec::new()),
        }
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| e.is_live(&now) && glob_matches(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for InMemoryCountingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCountingStore")
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Matches `text` against a pattern whose only wildcard is `*`.
fn glob_matches(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(at) => rest = &rest[at + middle.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, InMemoryCountingStore) {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let store = InMemoryCountingStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn increment_sets_ttl_only_on_creation() {
        let (clock, store) = store();
        assert_eq!(store.increment_with_ttl("k", 60).await.unwrap(), 1);
        clock.advance_secs(20);
        assert_eq!(store.increment_with_ttl("k", 60).await.unwrap(), 2);
        assert_eq!(store.ttl("k").await.unwrap(), Some(40));
    }

    #[tokio::test]
    async fn increment_restores_missing_ttl() {
        let (_clock, store) = store();
        store.increment_with_ttl("k", 60).await.unwrap();
        assert!(store.persist("k").await);
        assert_eq!(store.ttl("k").await.unwrap(), None);

        assert_eq!(store.increment_with_ttl("k", 60).await.unwrap(), 2);
        assert_eq!(store.ttl("k").await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn counter_expires_and_restarts() {
        let (clock, store) = store();
        store.increment_with_ttl("k", 60).await.unwrap();
        store.increment_with_ttl("k", 60).await.unwrap();
        clock.advance_secs(60);
        assert_eq!(store.get_count("k").await.unwrap(), None);
        assert_eq!(store.increment_with_ttl("k", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_keys_are_evicted_without_being_touched() {
        let (clock, store) = store();
        for i in 0..1000 {
            store.increment_with_ttl(&format!("ip:{}", i), 60).await.unwrap();
        }
        assert_eq!(store.entry_count().await, 1000);

        clock.advance_secs(3600);
        for i in 0..10 {
            store.increment_with_ttl(&format!("fresh:{}", i), 60).await.unwrap();
        }

        assert_eq!(store.keys().await.len(), 10);
        assert_eq!(store.entry_count().await, 10);
    }

    #[tokio::test]
    async fn sorted_set_orders_prunes_and_counts() {
        let (_clock, store) = store();
        store.sorted_set_add("z", "c", 30, 100).await.unwrap();
        store.sorted_set_add("z", "a", 10, 100).await.unwrap();
        store.sorted_set_add("z", "b", 20, 100).await.unwrap();

        let oldest = store.sorted_set_range("z", i64::MIN, 1).await.unwrap();
        assert_eq!(oldest[0].member, "a");
        assert_eq!(store.sorted_set_count("z", 20).await.unwrap(), 2);

        assert_eq!(store.sorted_set_remove_below("z", 20).await.unwrap(), 1);
        assert_eq!(store.sorted_set_count("z", i64::MIN).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn set_if_absent_only_writes_once() {
        let (clock, store) = store();
        assert!(store.set_if_absent("s", "one", 10).await.unwrap());
        assert!(!store.set_if_absent("s", "two", 10).await.unwrap());
        assert_eq!(store.get("s").await.unwrap().as_deref(), Some("one"));

        clock.advance_secs(10);
        assert!(store.set_if_absent("s", "three", 10).await.unwrap());
    }

    #[tokio::test]
    async fn capped_list_evicts_oldest() {
        let (_clock, store) = store();
        for i in 0..5 {
            store.list_push_capped("l", &i.to_string(), 3, 100).await.unwrap();
        }
        assert_eq!(store.list_range("l", 10).await.unwrap(), vec!["4", "3", "2"]);
        assert_eq!(store.list_range("l", 1).await.unwrap(), vec!["4"]);
    }

    #[tokio::test]
    async fn wrong_type_is_corrupt() {
        let (_clock, store) = store();
        store.set("k", "text", 10).await.unwrap();
        let err = store.increment_with_ttl("k", 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let (_clock, store) = store();
        store.set_unavailable(true);
        assert!(store.increment_with_ttl("k", 10).await.is_err());
        assert!(store.scan_keys("*").await.is_err());
        store.set_unavailable(false);
        assert!(store.increment_with_ttl("k", 10).await.is_ok());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let (_clock, store) = store();
        store.set("k", "v", 10).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn scan_matches_glob() {
        let (_clock, store) = store();
        store.increment_with_ttl("rate_limit:fixed:status:aa", 10).await.unwrap();
        store.increment_with_ttl("rate_limit:sliding:status:bb", 10).await.unwrap();
        let keys = store.scan_keys("rate_limit:fixed:*").await.unwrap();
        assert_eq!(keys, vec!["rate_limit:fixed:status:aa"]);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_matches("a:*", "a:b:c"));
        assert!(glob_matches("a:*:c", "a:b:c"));
        assert!(!glob_matches("a:*:d", "a:b:c"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("a*a", "a"));
    }
}
