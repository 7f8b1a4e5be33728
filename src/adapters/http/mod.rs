//! HTTP adapters - axum middleware and the admin API.

pub mod admin;
pub mod middleware;

pub use admin::{admin_router, AdminAppState};
pub use middleware::{rate_limit_middleware, RateLimitCheck, RateLimitRejection, RateLimitState};
