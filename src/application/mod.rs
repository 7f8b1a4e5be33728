//! Application layer - orchestrates the rate limiting domain over the ports.
//!
//! The engine composes window counting, adaptive tightening, the CAPTCHA
//! gate and violation tracking into the operations callers use.

pub mod rate_limit;

pub use rate_limit::{RateLimitEngine, RateLimitEngineBuilder, SecondaryIdentifiers};
