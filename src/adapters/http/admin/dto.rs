//! HTTP DTOs for the rate limit admin endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::rate_limit::{Algorithm, RateLimitStats, ViolationRecord};

/// Default number of violations returned.
pub const DEFAULT_VIOLATION_LIMIT: usize = 100;

/// Upper bound on violations returned per request.
pub const MAX_VIOLATION_LIMIT: usize = 1000;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query for `GET /stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    /// Restrict to one endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Query for `GET /violations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViolationsQuery {
    /// Endpoint log to read; all endpoints when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ViolationsQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_VIOLATION_LIMIT)
            .min(MAX_VIOLATION_LIMIT)
    }
}

/// Body of `POST /reset`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetRequest {
    pub endpoint_name: String,
    /// Raw identifier (IP, wallet, email); hashed before lookup.
    pub identifier: String,
    pub algorithm: Algorithm,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct ViolationsResponse {
    pub count: usize,
    pub violations: Vec<ViolationRecord>,
}

impl From<Vec<ViolationRecord>> for ViolationsResponse {
    fn from(violations: Vec<ViolationRecord>) -> Self {
        Self {
            count: violations.len(),
            violations,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: RateLimitStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
