//! Storage key layout.
//!
//! Every client-scoped key embeds the hashed identifier, never the raw one.

use super::config::Algorithm;
use super::identity::{FactorType, HashedClientId};

/// Builds every key the limiter reads or writes under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}:{algorithm}:{endpoint}:{hash}`
    pub fn counter(&self, algorithm: Algorithm, endpoint: &str, client: &HashedClientId) -> String {
        format!("{}:{}:{}:{}", self.prefix, algorithm.as_str(), endpoint, client)
    }

    /// Scan pattern matching every counter of one algorithm.
    pub fn counter_pattern(&self, algorithm: Algorithm) -> String {
        format!("{}:{}:*", self.prefix, algorithm.as_str())
    }

    /// Extracts the endpoint name from a counter key.
    pub fn endpoint_of_counter<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix(':')?;
        let mut parts = rest.splitn(3, ':');
        let algorithm = parts.next()?;
        Algorithm::parse(algorithm)?;
        let endpoint = parts.next()?;
        parts.next()?;
        Some(endpoint)
    }

    pub fn violation_log(&self, endpoint: &str) -> String {
        format!("{}:violations:{}", self.prefix, endpoint)
    }

    /// Log receiving every violation regardless of endpoint.
    pub fn global_violation_log(&self) -> String {
        format!("{}:violations:_all", self.prefix)
    }

    pub fn violation_count(&self, endpoint: &str, factor: FactorType, client: &HashedClientId) -> String {
        format!(
            "{}:violation_count:{}:{}:{}",
            self.prefix,
            endpoint,
            factor.as_str(),
            client
        )
    }

    pub fn adaptive(&self, endpoint: &str, client: &HashedClientId) -> String {
        format!("{}:adaptive:{}:{}", self.prefix, endpoint, client)
    }

    pub fn wallet_violations(&self, client: &HashedClientId) -> String {
        format!("{}:captcha_violations:{}", self.prefix, client)
    }

    pub fn captcha(&self, client: &HashedClientId) -> String {
        format!("{}:captcha:{}", self.prefix, client)
    }

    /// Per-minute bucket of the global violation counter.
    pub fn global_violations(&self, unix_minute: u64) -> String {
        format!("{}:global_violations:{}", self.prefix, unix_minute)
    }

    pub fn global_tightening(&self) -> String {
        format!("{}:global_tightening", self.prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("rate_limit")
    }
}
