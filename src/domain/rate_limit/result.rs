//! Outcome of a rate limit check.

use serde::Serialize;

use crate::domain::foundation::Timestamp;

/// Decision plus the metadata callers surface as response headers.
///
/// Produced fresh per call and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Limit actually enforced for this client (after tightening).
    pub limit: u32,
    /// Earliest moment a slot frees up.
    pub reset_at: Timestamp,
    /// Seconds the client should wait; only set on denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Client must pass a challenge before the protected operation runs.
    pub requires_captcha: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_provider: Option<String>,
    /// A per-client or global tightening reduced the limit.
    pub adaptive_limit_applied: bool,
}

impl RateLimitResult {
    /// An allowed result with no escalation flags.
    pub fn allowed(limit: u32, remaining: u32, reset_at: Timestamp) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_at,
            retry_after_secs: None,
            requires_captcha: false,
            captcha_provider: None,
            adaptive_limit_applied: false,
        }
    }

    /// A denied result. `retry_after_secs` is clamped to at least one second.
    pub fn denied(limit: u32, reset_at: Timestamp, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_at,
            retry_after_secs: Some(retry_after_secs.max(1)),
            requires_captcha: false,
            captcha_provider: None,
            adaptive_limit_applied: false,
        }
    }

    /// Permissive result used when enforcement is bypassed or the store fails.
    pub fn fail_open(limit: u32, now: Timestamp, window_secs: u64) -> Self {
        Self::allowed(limit, limit, now.plus_secs(window_secs))
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Raises the CAPTCHA gate on this result.
    pub fn with_captcha(mut self, provider: impl Into<String>) -> Self {
        self.requires_captcha = true;
        self.captcha_provider = Some(provider.into());
        self
    }

    pub fn with_adaptive_limit(mut self, applied: bool) -> Self {
        self.adaptive_limit_applied = applied;
        self
    }
}
