//! Violation tracking.
//!
//! Records every denial and drives escalation: per-client adaptive
//! tightening, wallet CAPTCHA escalation and global tightening. Each step
//! is best effort. Failures are logged and never reach the caller.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::{FactorType, HashedClientId, KeySpace, ViolationRecord};
use crate::ports::{AbuseAlert, AlertPublisher, CountingStore, StoreError};

use super::adaptive::AdaptiveTightener;
use super::captcha::CaptchaGate;

/// Seconds per global violation bucket.
const GLOBAL_BUCKET_SECS: u64 = 60;

/// Records denials and escalates repeat offenders.
pub struct ViolationTracker {
    store: Arc<dyn CountingStore>,
    keys: KeySpace,
    config: Arc<EngineConfig>,
    adaptive: AdaptiveTightener,
    captcha: CaptchaGate,
    alerts: Option<Arc<dyn AlertPublisher>>,
}

impl ViolationTracker {
    pub fn new(
        store: Arc<dyn CountingStore>,
        keys: KeySpace,
        config: Arc<EngineConfig>,
        adaptive: AdaptiveTightener,
        captcha: CaptchaGate,
        alerts: Option<Arc<dyn AlertPublisher>>,
    ) -> Self {
        Self {
            store,
            keys,
            config,
            adaptive,
            captcha,
            alerts,
        }
    }

    /// Processes one denial.
    pub async fn record(&self, violation: ViolationRecord) {
        let now = violation.timestamp;

        if let Err(e) = self.append_log(&violation).await {
            tracing::warn!(endpoint = %violation.endpoint_name, error = %e, "Failed to log violation");
        }

        if let Err(e) = self.track_client(&violation, now).await {
            tracing::warn!(
                endpoint = %violation.endpoint_name,
                client = %violation.hashed_client_id,
                error = %e,
                "Failed to update adaptive tightening"
            );
        }

        if violation.factor == FactorType::Wallet {
            if let Err(e) = self.track_wallet(&violation.hashed_client_id, now).await {
                tracing::warn!(
                    client = %violation.hashed_client_id,
                    error = %e,
                    "Failed to update CAPTCHA escalation"
                );
            }
        }

        if let Err(e) = self.track_global(now).await {
            tracing::warn!(error = %e, "Failed to update global violation count");
        }
    }

    async fn append_log(&self, violation: &ViolationRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(violation).map_err(|e| StoreError::Corrupt {
            key: self.keys.violation_log(&violation.endpoint_name),
            reason: e.to_string(),
        })?;

        for key in [
            self.keys.violation_log(&violation.endpoint_name),
            self.keys.global_violation_log(),
        ] {
            self.store
                .list_push_capped(
                    &key,
                    &json,
                    self.config.violation_log_capacity,
                    self.config.violation_log_ttl_secs,
                )
                .await?;
        }
        Ok(())
    }

    async fn track_client(&self, violation: &ViolationRecord, now: Timestamp) -> Result<(), StoreError> {
        let key = self.keys.violation_count(
            &violation.endpoint_name,
            violation.factor,
            &violation.hashed_client_id,
        );
        let count = self
            .store
            .increment_with_ttl(&key, self.config.adaptive_tightening_window_secs)
            .await?;

        if !self.config.adaptive_enabled || count < self.config.adaptive_violation_threshold {
            return Ok(());
        }

        if let Some(state) = self
            .adaptive
            .activate(&violation.endpoint_name, &violation.hashed_client_id, now)
            .await?
        {
            tracing::info!(
                endpoint = %state.endpoint_name,
                client = %state.hashed_client_id,
                violations = count,
                expires_at = %state.expires_at,
                "Adaptive tightening activated"
            );
            self.publish(AbuseAlert::AdaptiveTighteningActivated {
                endpoint_name: state.endpoint_name,
                hashed_client_id: state.hashed_client_id,
                expires_at: state.expires_at,
            });
        }
        Ok(())
    }

    async fn track_wallet(&self, client: &HashedClientId, now: Timestamp) -> Result<(), StoreError> {
        if let Some(state) = self.captcha.record_wallet_violation(client, now).await? {
            tracing::info!(
                client = %state.hashed_client_id,
                violations = state.wallet_violations,
                "CAPTCHA required"
            );
            self.publish(AbuseAlert::CaptchaRequired {
                hashed_client_id: state.hashed_client_id,
                wallet_violations: state.wallet_violations,
            });
        }
        Ok(())
    }

    async fn track_global(&self, now: Timestamp) -> Result<(), StoreError> {
        let minute = now.as_unix_secs() / GLOBAL_BUCKET_SECS;
        let count = self
            .store
            .increment_with_ttl(&self.keys.global_violations(minute), GLOBAL_BUCKET_SECS)
            .await?;

        if count < self.config.global_violation_threshold {
            return Ok(());
        }

        if let Some(state) = self.adaptive.activate_global(count, now).await? {
            tracing::warn!(
                violations = state.violations_observed,
                factor = state.factor,
                expires_at = %state.expires_at,
                "Global tightening activated"
            );
            self.publish(AbuseAlert::GlobalTighteningActivated {
                violations_observed: state.violations_observed,
                factor: state.factor,
                expires_at: state.expires_at,
            });
        }
        Ok(())
    }

    fn publish(&self, alert: AbuseAlert) {
        match &self.alerts {
            Some(alerts) => alerts.publish(alert),
            None => tracing::debug!(kind = alert.kind(), "No alert publisher configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::alerts::RecordingAlertPublisher;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::counting_store::InMemoryCountingStore;
    use crate::domain::rate_limit::{IdentifierHasher, Sha256IdentifierHasher};
    use crate::ports::Clock;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<InMemoryCountingStore>,
        alerts: Arc<RecordingAlertPublisher>,
        adaptive: AdaptiveTightener,
        captcha: CaptchaGate,
        tracker: ViolationTracker,
    }

    fn fixture(config: EngineConfig) -> Fixture {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let store = Arc::new(InMemoryCountingStore::new(clock.clone()));
        let alerts = Arc::new(RecordingAlertPublisher::new());
        let config = Arc::new(config);
        let keys = KeySpace::default();
        let adaptive = AdaptiveTightener::new(store.clone(), keys.clone(), config.clone());
        let captcha = CaptchaGate::new(store.clone(), keys.clone(), config.clone());
        let tracker = ViolationTracker::new(
            store.clone(),
            keys,
            config,
            adaptive.clone(),
            captcha.clone(),
            Some(alerts.clone()),
        );
        Fixture {
            clock,
            store,
            alerts,
            adaptive,
            captcha,
            tracker,
        }
    }

    fn violation(identifier: &str, at: Timestamp) -> ViolationRecord {
        ViolationRecord {
            timestamp: at,
            endpoint_name: "store-key".into(),
            hashed_client_id: Sha256IdentifierHasher.hash(identifier),
            factor: FactorType::infer(identifier),
            ip: None,
            user_agent: Some("test-agent".into()),
        }
    }

    #[tokio::test]
    async fn records_into_endpoint_and_global_logs() {
        let f = fixture(EngineConfig::default());
        f.tracker.record(violation("1.2.3.4", f.clock.now())).await;

        let keys = KeySpace::default();
        assert_eq!(f.store.list_range(&keys.violation_log("store-key"), 10).await.unwrap().len(), 1);
        assert_eq!(f.store.list_range(&keys.global_violation_log(), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn log_is_capped() {
        let f = fixture(EngineConfig {
            violation_log_capacity: 3,
            ..Default::default()
        });
        for _ in 0..5 {
            f.tracker.record(violation("1.2.3.4", f.clock.now())).await;
        }
        let log = KeySpace::default().violation_log("store-key");
        assert_eq!(f.store.list_range(&log, 100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tightening_activates_at_threshold() {
        let f = fixture(EngineConfig::default());
        let client = Sha256IdentifierHasher.hash("1.2.3.4");

        for _ in 0..4 {
            f.tracker.record(violation("1.2.3.4", f.clock.now())).await;
        }
        let limit = f.adaptive.effective_limit("store-key", &client, 10, &f.clock.now()).await;
        assert!(!limit.tightened);

        f.tracker.record(violation("1.2.3.4", f.clock.now())).await;
        let limit = f.adaptive.effective_limit("store-key", &client, 10, &f.clock.now()).await;
        assert_eq!(limit.limit, 5);
        assert!(f.alerts.has_alert("adaptive_tightening_activated"));
    }

    #[tokio::test]
    async fn violations_outside_window_do_not_accumulate() {
        let f = fixture(EngineConfig::default());
        let client = Sha256IdentifierHasher.hash("1.2.3.4");

        for _ in 0..4 {
            f.tracker.record(violation("1.2.3.4", f.clock.now())).await;
        }
        f.clock.advance_secs(300);
        f.tracker.record(violation("1.2.3.4", f.clock.now())).await;

        let limit = f.adaptive.effective_limit("store-key", &client, 10, &f.clock.now()).await;
        assert!(!limit.tightened);
    }

    #[tokio::test]
    async fn wallet_violations_raise_captcha() {
        let f = fixture(EngineConfig::default());
        let wallet = Sha256IdentifierHasher.hash("0xabc");

        for _ in 0..3 {
            f.tracker.record(violation("0xabc", f.clock.now())).await;
        }
        assert!(f.captcha.is_required(&wallet).await);
        assert!(f.alerts.has_alert("captcha_required"));
    }

    #[tokio::test]
    async fn ip_violations_never_raise_captcha() {
        let f = fixture(EngineConfig::default());
        for _ in 0..5 {
            f.tracker.record(violation("1.2.3.4", f.clock.now())).await;
        }
        assert!(!f.captcha.is_required(&Sha256IdentifierHasher.hash("1.2.3.4")).await);
    }

    #[tokio::test]
    async fn global_threshold_activates_once_and_alerts() {
        let f = fixture(EngineConfig {
            global_violation_threshold: 3,
            adaptive_enabled: false,
            ..Default::default()
        });
        for i in 0..5 {
            f.tracker.record(violation(&format!("10.0.0.{}", i), f.clock.now())).await;
        }

        let global: Vec<_> = f
            .alerts
            .published_alerts()
            .into_iter()
            .filter(|a| a.kind() == "global_tightening_activated")
            .collect();
        assert_eq!(global.len(), 1);

        let other = Sha256IdentifierHasher.hash("192.168.0.1");
        let limit = f.adaptive.effective_limit("status", &other, 60, &f.clock.now()).await;
        assert_eq!(limit.limit, 30);
    }

    #[tokio::test]
    async fn outage_is_swallowed() {
        let f = fixture(EngineConfig::default());
        f.store.set_unavailable(true);
        f.tracker.record(violation("0xabc", f.clock.now())).await;
        assert_eq!(f.alerts.alert_count(), 0);
    }
}
