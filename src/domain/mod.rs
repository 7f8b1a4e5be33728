//! Domain layer - pure types with no I/O.
//!
//! - `foundation` - shared value objects
//! - `rate_limit` - configs, identities, results and persisted state shapes

pub mod foundation;
pub mod rate_limit;
