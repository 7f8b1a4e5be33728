//! Persisted, self-expiring state shapes.
//!
//! All of these are stored as JSON under TTL'd keys. A record that fails to
//! parse is treated as absent by its reader.

use serde::{Deserialize, Serialize};

use super::identity::{FactorType, HashedClientId};
use crate::domain::foundation::Timestamp;

/// Maximum characters of a user agent kept in a violation record.
pub const MAX_USER_AGENT_LEN: usize = 256;

/// One denied attempt, appended to a capped per-endpoint log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub timestamp: Timestamp,
    pub endpoint_name: String,
    pub hashed_client_id: HashedClientId,
    pub factor: FactorType,
    /// Hash of the resolved client IP, never the raw address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<HashedClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ViolationRecord {
    /// Truncates the user agent to [`MAX_USER_AGENT_LEN`] characters.
    pub fn truncate_user_agent(user_agent: &str) -> String {
        user_agent.chars().take(MAX_USER_AGENT_LEN).collect()
    }
}

/// Active per-client tightening for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveState {
    pub endpoint_name: String,
    pub hashed_client_id: HashedClientId,
    pub applied_at: Timestamp,
    pub expires_at: Timestamp,
}

impl AdaptiveState {
    pub fn is_active_at(&self, now: &Timestamp) -> bool {
        self.expires_at.is_after(now)
    }
}

/// Flag requiring a client to pass a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptchaState {
    pub hashed_client_id: HashedClientId,
    pub required_since: Timestamp,
    pub wallet_violations: u64,
}

/// System-wide clamp applied to every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTighteningState {
    pub applied_at: Timestamp,
    pub expires_at: Timestamp,
    pub violations_observed: u64,
    pub factor: f64,
}

impl GlobalTighteningState {
    pub fn is_active_at(&self, now: &Timestamp) -> bool {
        self.expires_at.is_after(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rate_limit::{IdentifierHasher, Sha256IdentifierHasher};

    #[test]
    fn adaptive_state_expiry_is_exclusive() {
        let applied = Timestamp::from_unix_secs(1_000);
        let state = AdaptiveState {
            endpoint_name: "store-key".into(),
            hashed_client_id: Sha256IdentifierHasher.hash("1.2.3.4"),
            applied_at: applied,
            expires_at: applied.plus_secs(60),
        };
        assert!(state.is_active_at(&applied.plus_secs(59)));
        assert!(!state.is_active_at(&applied.plus_secs(60)));
    }

    #[test]
    fn violation_record_json_omits_missing_fields() {
        let record = ViolationRecord {
            timestamp: Timestamp::from_unix_secs(0),
            endpoint_name: "send-email".into(),
            hashed_client_id: Sha256IdentifierHasher.hash("bob@example.com"),
            factor: FactorType::Email,
            ip: None,
            user_agent: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("user_agent"));
        assert!(!json.contains("bob@example.com"));
        let back: ViolationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn user_agent_truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_USER_AGENT_LEN + 10);
        let truncated = ViolationRecord::truncate_user_agent(&long);
        assert_eq!(truncated.chars().count(), MAX_USER_AGENT_LEN);
    }
}
