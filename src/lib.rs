//! Adaptive Limiter - multi-factor rate limiting for wallet and payment endpoints
//!
//! Counts requests per endpoint and client under fixed or sliding windows,
//! tightens limits for repeat offenders and for system-wide abuse, and raises
//! a CAPTCHA gate for wallets that keep hitting their limits. Client
//! identifiers are hashed before they reach storage or logs.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
