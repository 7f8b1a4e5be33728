//! Window counting algorithms.
//!
//! Both algorithms only need the per-operation atomicity of the
//! [`CountingStore`]; neither uses multi-key transactions.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::{Algorithm, RateLimitResult};
use crate::ports::{Clock, CountingStore, StoreError};

/// A counting algorithm over one counter key.
#[async_trait]
pub trait WindowCounter: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Records a request against `key` and decides whether it is allowed.
    async fn hit(&self, key: &str, limit: u32, window_secs: u64)
        -> Result<RateLimitResult, StoreError>;

    /// Reports what the next [`hit`](Self::hit) would see, without recording.
    async fn peek(&self, key: &str, limit: u32, window_secs: u64)
        -> Result<RateLimitResult, StoreError>;
}

/// Fixed-window counter:
/// 1. INCR the key
/// 2. If the count is 1, set the TTL to the window length
/// 3. If the count exceeds the limit, deny
///
/// Denied requests still count, so a client hammering the endpoint cannot
/// shift its window forward. `reset_at` comes from the stored TTL, not from
/// a locally computed window start.
pub struct FixedWindow {
    store: Arc<dyn CountingStore>,
    clock: Arc<dyn Clock>,
}

impl FixedWindow {
    pub fn new(store: Arc<dyn CountingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn reset_secs(&self, key: &str, window_secs: u64) -> Result<u64, StoreError> {
        let ttl = self.store.ttl(key).await?;
        Ok(ttl.filter(|t| *t > 0).unwrap_or(window_secs))
    }
}

#[async_trait]
impl WindowCounter for FixedWindow {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Fixed
    }

    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateLimitResult, StoreError> {
        let count = self.store.increment_with_ttl(key, window_secs).await?;
        let reset_secs = self.reset_secs(key, window_secs).await?;
        let reset_at = self.clock.now().plus_secs(reset_secs);

        if count > u64::from(limit) {
            return Ok(RateLimitResult::denied(limit, reset_at, reset_secs));
        }

        let remaining = limit.saturating_sub(count as u32);
        Ok(RateLimitResult::allowed(limit, remaining, reset_at))
    }

    async fn peek(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateLimitResult, StoreError> {
        let count = self.store.get_count(key).await?.unwrap_or(0);
        let reset_secs = self.reset_secs(key, window_secs).await?;
        let reset_at = self.clock.now().plus_secs(reset_secs);

        if count >= u64::from(limit) {
            return Ok(RateLimitResult::denied(limit, reset_at, reset_secs));
        }

        let remaining = limit.saturating_sub(count as u32);
        Ok(RateLimitResult::allowed(limit, remaining, reset_at))
    }
}

/// Sliding-window log over a sorted set scored by request time (ms).
///
/// On each hit:
/// 1. Drop markers older than `now - window`
/// 2. Deny if the remaining count has reached the limit
/// 3. Otherwise add a unique marker and refresh the TTL to twice the window
pub struct SlidingWindow {
    store: Arc<dyn CountingStore>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindow {
    pub fn new(store: Arc<dyn CountingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Earliest moment a slot frees up: oldest marker plus the window.
    async fn reset_at(
        &self,
        key: &str,
        window_start_ms: i64,
        now: Timestamp,
        window_secs: u64,
    ) -> Result<Timestamp, StoreError> {
        let oldest = self.store.sorted_set_range(key, window_start_ms, 1).await?;
        Ok(match oldest.first() {
            Some(marker) => Timestamp::from_unix_millis(marker.score).plus_secs(window_secs),
            None => now.plus_secs(window_secs),
        })
    }
}

fn window_start_ms(now: &Timestamp, window_secs: u64) -> i64 {
    now.as_unix_millis()
        .saturating_sub((window_secs as i64).saturating_mul(1000))
}

#[async_trait]
impl WindowCounter for SlidingWindow {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Sliding
    }

    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.now();
        let window_start = window_start_ms(&now, window_secs);

        self.store.sorted_set_remove_below(key, window_start).await?;
        let count = self.store.sorted_set_count(key, window_start).await?;
        let reset_at = self.reset_at(key, window_start, now, window_secs).await?;

        if count >= u64::from(limit) {
            return Ok(RateLimitResult::denied(limit, reset_at, now.secs_until(&reset_at)));
        }

        // Timestamp plus random suffix keeps same-millisecond requests distinct
        let member = format!("{}-{}", now.as_unix_millis(), Uuid::new_v4());
        self.store
            .sorted_set_add(key, &member, now.as_unix_millis(), window_secs.saturating_mul(2))
            .await?;

        let remaining = limit.saturating_sub(count as u32 + 1);
        Ok(RateLimitResult::allowed(limit, remaining, reset_at))
    }

    async fn peek(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.now();
        let window_start = window_start_ms(&now, window_secs);

        let count = self.store.sorted_set_count(key, window_start).await?;
        let reset_at = self.reset_at(key, window_start, now, window_secs).await?;

        if count >= u64::from(limit) {
            return Ok(RateLimitResult::denied(limit, reset_at, now.secs_until(&reset_at)));
        }

        let remaining = limit.saturating_sub(count as u32);
        Ok(RateLimitResult::allowed(limit, remaining, reset_at))
    }
}
