//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the limiter to external systems:
//! - `counting_store` - Redis and in-memory counting stores
//! - `clock` - wall clock and a manual test clock
//! - `alerts` - abuse alert delivery
//! - `http` - axum middleware and admin routes

pub mod alerts;
pub mod clock;
pub mod counting_store;
pub mod http;

pub use clock::{ManualClock, SystemClock};
pub use counting_store::{InMemoryCountingStore, RedisCountingStore};
