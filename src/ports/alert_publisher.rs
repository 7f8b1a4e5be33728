//! AlertPublisher port - non-blocking hand-off of abuse alerts.
//!
//! The request path only enqueues; delivery to webhooks or a SIEM happens
//! elsewhere and can never delay or fail an allow/deny decision.

use serde::Serialize;

use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::HashedClientId;

/// Alert raised by the violation tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbuseAlert {
    /// Total violations per minute crossed the global threshold.
    GlobalTighteningActivated {
        violations_observed: u64,
        factor: f64,
        expires_at: Timestamp,
    },
    /// One client's limit on one endpoint was reduced.
    AdaptiveTighteningActivated {
        endpoint_name: String,
        hashed_client_id: HashedClientId,
        expires_at: Timestamp,
    },
    /// A wallet must now pass a CAPTCHA.
    CaptchaRequired {
        hashed_client_id: HashedClientId,
        wallet_violations: u64,
    },
}

impl AbuseAlert {
    pub fn kind(&self) -> &'static str {
        match self {
            AbuseAlert::GlobalTighteningActivated { .. } => "global_tightening_activated",
            AbuseAlert::AdaptiveTighteningActivated { .. } => "adaptive_tightening_activated",
            AbuseAlert::CaptchaRequired { .. } => "captcha_required",
        }
    }
}

/// Port for publishing alerts.
///
/// `publish` must return immediately. Implementations drop alerts rather
/// than block when their queue is full.
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, alert: AbuseAlert);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn AlertPublisher) {}

    #[test]
    fn alerts_serialize_with_kind_tag() {
        let alert = AbuseAlert::GlobalTighteningActivated {
            violations_observed: 120,
            factor: 0.5,
            expires_at: Timestamp::from_unix_secs(0),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], alert.kind());
        assert_eq!(json["violations_observed"], 120);
    }
}
