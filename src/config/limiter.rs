//! Limiter engine configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Tunables for the rate limit engine.
///
/// Every field has a default so an empty `limiter` section is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Disable all enforcement (local development only)
    pub bypass: bool,

    /// Prefix of every storage key
    pub key_prefix: String,

    pub adaptive_enabled: bool,
    /// Violations per (endpoint, factor, client) that trigger tightening
    pub adaptive_violation_threshold: u64,
    /// Rolling window of the per-client violation counter
    pub adaptive_tightening_window_secs: u64,
    /// How long a tightening stays active
    pub adaptive_tightening_duration_secs: u64,
    pub adaptive_tightening_factor: f64,

    pub captcha_enabled: bool,
    /// Provider name surfaced to clients, e.g. `hcaptcha`
    pub captcha_provider: String,
    pub captcha_wallet_violation_threshold: u64,
    pub captcha_violation_window_secs: u64,
    pub captcha_ttl_secs: u64,

    /// Violations per minute across all endpoints that trigger global tightening
    pub global_violation_threshold: u64,
    pub global_tightening_duration_secs: u64,
    pub global_tightening_factor: f64,

    /// Share of the primary limit granted to wallet and email factors
    pub wallet_email_factor_ratio: f64,
    /// Share of the primary limit granted to the device fingerprint factor
    pub device_factor_ratio: f64,

    pub violation_log_capacity: usize,
    pub violation_log_ttl_secs: u64,

    /// Run violation tracking on a spawned task instead of inline
    pub background_tracking: bool,
}

impl EngineConfig {
    /// Validate engine configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_prefix.is_empty() {
            return Err(ValidationError::MissingRequired("LIMITER__KEY_PREFIX"));
        }

        let factors = [
            ("adaptive_tightening_factor", self.adaptive_tightening_factor),
            ("global_tightening_factor", self.global_tightening_factor),
            ("wallet_email_factor_ratio", self.wallet_email_factor_ratio),
            ("device_factor_ratio", self.device_factor_ratio),
        ];
        for (name, value) in factors {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ValidationError::InvalidFactor(name));
            }
        }

        let positives = [
            ("adaptive_violation_threshold", self.adaptive_violation_threshold),
            ("adaptive_tightening_window_secs", self.adaptive_tightening_window_secs),
            ("adaptive_tightening_duration_secs", self.adaptive_tightening_duration_secs),
            ("captcha_wallet_violation_threshold", self.captcha_wallet_violation_threshold),
            ("captcha_violation_window_secs", self.captcha_violation_window_secs),
            ("captcha_ttl_secs", self.captcha_ttl_secs),
            ("global_violation_threshold", self.global_violation_threshold),
            ("global_tightening_duration_secs", self.global_tightening_duration_secs),
            ("violation_log_capacity", self.violation_log_capacity as u64),
            ("violation_log_ttl_secs", self.violation_log_ttl_secs),
        ];
        for (name, value) in positives {
            if value == 0 {
                return Err(ValidationError::MustBePositive(name));
            }
        }

        if self.captcha_enabled && self.captcha_provider.trim().is_empty() {
            return Err(ValidationError::MissingRequired("LIMITER__CAPTCHA_PROVIDER"));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bypass: false,
            key_prefix: "rate_limit".to_string(),
            adaptive_enabled: true,
            adaptive_violation_threshold: 5,
            adaptive_tightening_window_secs: 300,
            adaptive_tightening_duration_secs: 3600,
            adaptive_tightening_factor: 0.5,
            captcha_enabled: true,
            captcha_provider: "hcaptcha".to_string(),
            captcha_wallet_violation_threshold: 3,
            captcha_violation_window_secs: 3600,
            captcha_ttl_secs: 3600,
            global_violation_threshold: 100,
            global_tightening_duration_secs: 600,
            global_tightening_factor: 0.5,
            wallet_email_factor_ratio: 0.7,
            device_factor_ratio: 0.8,
            violation_log_capacity: 1000,
            violation_log_ttl_secs: 86_400,
            background_tracking: true,
        }
    }
}
