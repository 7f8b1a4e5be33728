//! Rate limiting use cases.
//!
//! [`RateLimitEngine`] is the entry point; the other types are its parts
//! and are exposed for callers that want to compose them directly.

mod adaptive;
mod admin;
mod captcha;
mod engine;
mod tracker;
mod windows;

pub use adaptive::{AdaptiveTightener, EffectiveLimit};
pub use captcha::CaptchaGate;
pub use engine::{RateLimitEngine, RateLimitEngineBuilder, SecondaryIdentifiers};
pub use tracker::ViolationTracker;
pub use windows::{FixedWindow, SlidingWindow, WindowCounter};
