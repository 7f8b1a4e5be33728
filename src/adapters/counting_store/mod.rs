//! Counting store adapters.
//!
//! - `InMemoryCountingStore` - single-process store for tests and local runs
//! - `RedisCountingStore` - shared store for multi-server deployments

mod in_memory;
mod redis;

pub use self::in_memory::InMemoryCountingStore;
pub use self::redis::RedisCountingStore;
