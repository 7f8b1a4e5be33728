//! CAPTCHA gate: flags wallets that keep hitting their limits.
//!
//! Only the decision to require a challenge lives here. Absence of the flag
//! (including any read failure) means no challenge is required.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::{CaptchaState, HashedClientId, KeySpace};
use crate::ports::{CountingStore, StoreError};

#[derive(Clone)]
pub struct CaptchaGate {
    store: Arc<dyn CountingStore>,
    keys: KeySpace,
    config: Arc<EngineConfig>,
}

impl CaptchaGate {
    pub fn new(store: Arc<dyn CountingStore>, keys: KeySpace, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    pub fn provider(&self) -> &str {
        &self.config.captcha_provider
    }

    /// Whether `client` must pass a challenge.
    pub async fn is_required(&self, client: &HashedClientId) -> bool {
        if !self.config.captcha_enabled {
            return false;
        }

        let key = self.keys.captcha(client);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(client = %client, error = %e, "Failed to read CAPTCHA flag");
                return false;
            }
        };

        if serde_json::from_str::<CaptchaState>(&raw).is_ok() {
            return true;
        }

        tracing::warn!(client = %client, "Discarding corrupt CAPTCHA flag");
        if let Err(e) = self.store.delete(&key).await {
            tracing::warn!(client = %client, error = %e, "Failed to delete CAPTCHA flag");
        }
        false
    }

    /// Counts one wallet violation and raises the flag at the threshold.
    ///
    /// Returns the new flag when this call raised it.
    pub async fn record_wallet_violation(
        &self,
        client: &HashedClientId,
        now: Timestamp,
    ) -> Result<Option<CaptchaState>, StoreError> {
        if !self.config.captcha_enabled {
            return Ok(None);
        }

        let violations = self
            .store
            .increment_with_ttl(
                &self.keys.wallet_violations(client),
                self.config.captcha_violation_window_secs,
            )
            .await?;

        if violations < self.config.captcha_wallet_violation_threshold {
            return Ok(None);
        }

        let state = CaptchaState {
            hashed_client_id: client.clone(),
            required_since: now,
            wallet_violations: violations,
        };
        let key = self.keys.captcha(client);
        let json = serde_json::to_string(&state).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let created = self
            .store
            .set_if_absent(&key, &json, self.config.captcha_ttl_secs)
            .await?;

        Ok(created.then_some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::counting_store::InMemoryCountingStore;
    use crate::domain::rate_limit::{IdentifierHasher, Sha256IdentifierHasher};
    use crate::ports::Clock;

    fn gate(config: EngineConfig) -> (Arc<ManualClock>, Arc<InMemoryCountingStore>, CaptchaGate) {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let store = Arc::new(InMemoryCountingStore::new(clock.clone()));
        let gate = CaptchaGate::new(store.clone(), KeySpace::default(), Arc::new(config));
        (clock, store, gate)
    }

    #[tokio::test]
    async fn flag_raised_on_third_wallet_violation() {
        let (clock, _store, gate) = gate(EngineConfig::default());
        let wallet = Sha256IdentifierHasher.hash("0xabc");

        for _ in 0..2 {
            assert!(gate.record_wallet_violation(&wallet, clock.now()).await.unwrap().is_none());
            assert!(!gate.is_required(&wallet).await);
        }

        let state = gate.record_wallet_violation(&wallet, clock.now()).await.unwrap();
        assert_eq!(state.map(|s| s.wallet_violations), Some(3));
        assert!(gate.is_required(&wallet).await);
    }

    #[tokio::test]
    async fn flag_expires_after_ttl() {
        let (clock, _store, gate) = gate(EngineConfig {
            captcha_wallet_violation_threshold: 1,
            ..Default::default()
        });
        let wallet = Sha256IdentifierHasher.hash("0xabc");

        gate.record_wallet_violation(&wallet, clock.now()).await.unwrap();
        assert!(gate.is_required(&wallet).await);

        clock.advance_secs(3600);
        assert!(!gate.is_required(&wallet).await);
    }

    #[tokio::test]
    async fn disabled_gate_never_requires() {
        let (clock, _store, gate) = gate(EngineConfig {
            captcha_enabled: false,
            captcha_wallet_violation_threshold: 1,
            ..Default::default()
        });
        let wallet = Sha256IdentifierHasher.hash("0xabc");

        assert!(gate.record_wallet_violation(&wallet, clock.now()).await.unwrap().is_none());
        assert!(!gate.is_required(&wallet).await);
    }

    #[tokio::test]
    async fn corrupt_flag_means_not_required() {
        let (_clock, store, gate) = gate(EngineConfig::default());
        let wallet = Sha256IdentifierHasher.hash("0xabc");
        let key = KeySpace::default().captcha(&wallet);
        store.set(&key, "garbage", 60).await.unwrap();

        assert!(!gate.is_required(&wallet).await);
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn outage_means_not_required() {
        let (_clock, store, gate) = gate(EngineConfig::default());
        store.set_unavailable(true);
        assert!(!gate.is_required(&Sha256IdentifierHasher.hash("0xabc")).await);
    }
}
