//! Per-endpoint rate limit configuration.
//!
//! A `RateLimitConfig` is supplied by the caller on every check. It is
//! validated once at construction so the engine never has to defend
//! against a zero limit or an empty window.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counting algorithm used for an endpoint.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Counter that resets entirely at fixed boundaries.
    Fixed,
    /// Continuously moving trailing interval.
    Sliding,
}

impl Algorithm {
    /// All algorithms, in key-space scan order.
    pub const ALL: [Algorithm; 2] = [Algorithm::Fixed, Algorithm::Sliding];

    /// Returns the string representation used in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Fixed => "fixed",
            Algorithm::Sliding => "sliding",
        }
    }

    /// Parses the storage-key representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fixed" => Some(Algorithm::Fixed),
            "sliding" => Some(Algorithm::Sliding),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitConfigError {
    #[error("endpoint name must not be empty")]
    EmptyEndpoint,

    #[error("endpoint name must not contain ':'")]
    InvalidEndpoint,

    #[error("max_requests must be positive")]
    ZeroMaxRequests,

    #[error("window_secs must be positive")]
    ZeroWindow,
}

/// Limit applied to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    endpoint_name: String,
    max_requests: u32,
    window_secs: u64,
    algorithm: Algorithm,
    explicit_identifier: Option<String>,
}

impl RateLimitConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitConfigError` for an empty endpoint name, a zero
    /// request budget or a zero-length window.
    pub fn new(
        endpoint_name: impl Into<String>,
        max_requests: u32,
        window_secs: u64,
        algorithm: Algorithm,
    ) -> Result<Self, RateLimitConfigError> {
        let endpoint_name = endpoint_name.into();
        if endpoint_name.trim().is_empty() {
            return Err(RateLimitConfigError::EmptyEndpoint);
        }
        // Endpoint names are embedded in colon-delimited storage keys
        if endpoint_name.contains(':') {
            return Err(RateLimitConfigError::InvalidEndpoint);
        }
        if max_requests == 0 {
            return Err(RateLimitConfigError::ZeroMaxRequests);
        }
        if window_secs == 0 {
            return Err(RateLimitConfigError::ZeroWindow);
        }
        Ok(Self {
            endpoint_name,
            max_requests,
            window_secs,
            algorithm,
            explicit_identifier: None,
        })
    }

    /// Keys this check on a caller-supplied identifier (e.g. a wallet address)
    /// instead of the client IP.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.explicit_identifier = Some(identifier.into());
        self
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn explicit_identifier(&self) -> Option<&str> {
        self.explicit_identifier.as_deref()
    }

    /// Limit for a secondary factor, scaled by `ratio` and rounded down.
    pub fn scaled_limit(&self, ratio: f64) -> u32 {
        scale_limit(self.max_requests, ratio)
    }
}

/// `floor(limit * ratio)`. Zero means every request is denied.
pub fn scale_limit(limit: u32, ratio: f64) -> u32 {
    ((limit as f64) * ratio).floor() as u32
}

/// Named endpoint configurations for the protected surfaces.
pub mod presets {
    use super::{Algorithm, RateLimitConfig};

    const HOUR: u64 = 3600;
    const MINUTE: u64 = 60;

    fn preset(name: &str, max_requests: u32, window_secs: u64, algorithm: Algorithm) -> RateLimitConfig {
        RateLimitConfig {
            endpoint_name: name.to_string(),
            max_requests,
            window_secs,
            algorithm,
            explicit_identifier: None,
        }
    }

    /// Wallet key storage: 10 per hour.
    pub fn store_key() -> RateLimitConfig {
        preset("store-key", 10, HOUR, Algorithm::Sliding)
    }

    /// Payment info storage: 20 per hour.
    pub fn store_payment_info() -> RateLimitConfig {
        preset("store-payment-info", 20, HOUR, Algorithm::Sliding)
    }

    /// Wallet email delivery: 5 per hour.
    pub fn send_email() -> RateLimitConfig {
        preset("send-email", 5, HOUR, Algorithm::Sliding)
    }

    /// Mnemonic decryption: 3 per hour.
    pub fn decrypt_mnemonic() -> RateLimitConfig {
        preset("decrypt-mnemonic", 3, HOUR, Algorithm::Sliding)
    }

    /// Status polling: 60 per minute.
    pub fn status_polling() -> RateLimitConfig {
        preset("status", 60, MINUTE, Algorithm::Fixed)
    }

    /// Wallet association: 10 per hour.
    pub fn associate_wallet() -> RateLimitConfig {
        preset("associate-wallet", 10, HOUR, Algorithm::Sliding)
    }

    /// General API traffic: 100 per minute.
    pub fn general_api() -> RateLimitConfig {
        preset("general", 100, MINUTE, Algorithm::Sliding)
    }
}
