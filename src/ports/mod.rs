//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the limiter and the outside world. Adapters implement these ports.
//!
//! - `CountingStore` - atomic counters, sorted sets and TTL'd values
//! - `Clock` - current time
//! - `AlertPublisher` - fire-and-forget abuse alerts

mod alert_publisher;
mod clock;
mod counting_store;

pub use alert_publisher::{AbuseAlert, AlertPublisher};
pub use clock::Clock;
pub use counting_store::{CountingStore, ScoredMember, StoreError};
