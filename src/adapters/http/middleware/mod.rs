//! HTTP middleware for axum.
//!
//! - `rate_limit` - Rate limit enforcement and response headers

pub mod rate_limit;

pub use rate_limit::{
    add_rate_limit_headers, client_request_from_parts, rate_limit_middleware, RateLimitCheck,
    RateLimitRejection, RateLimitState,
};
