//! Administrative operations on the rate limit engine.

use std::collections::HashMap;

use crate::domain::rate_limit::{
    normalize_identifier, Algorithm, FactorType, HashedClientId, RateLimitStats, ViolationRecord,
};
use crate::ports::StoreError;

use super::engine::RateLimitEngine;

impl RateLimitEngine {
    /// Clears one client's counter, its per-factor violation counts and any
    /// per-client tightening.
    ///
    /// Returns `false` if the store could not be reached.
    pub async fn reset_rate_limit(
        &self,
        endpoint_name: &str,
        identifier: &str,
        algorithm: Algorithm,
    ) -> bool {
        let client = self.hasher.hash(&normalize_identifier(identifier));

        match self.clear_client(endpoint_name, &client, algorithm).await {
            Ok(_) => {
                tracing::info!(endpoint = endpoint_name, client = %client, %algorithm, "Rate limit reset");
                true
            }
            Err(e) => {
                tracing::warn!(endpoint = endpoint_name, client = %client, error = %e, "Rate limit reset failed");
                false
            }
        }
    }

    async fn clear_client(
        &self,
        endpoint_name: &str,
        client: &HashedClientId,
        algorithm: Algorithm,
    ) -> Result<(), StoreError> {
        self.store
            .delete(&self.keys.counter(algorithm, endpoint_name, client))
            .await?;
        for factor in FactorType::ALL {
            self.store
                .delete(&self.keys.violation_count(endpoint_name, factor, client))
                .await?;
        }
        self.adaptive.clear(endpoint_name, client).await?;
        Ok(())
    }

    /// Most recent violations, newest first.
    ///
    /// `None` reads the log shared by all endpoints. Entries that fail to
    /// parse are skipped.
    pub async fn get_rate_limit_violations(
        &self,
        endpoint_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        let key = match endpoint_name {
            Some(endpoint) => self.keys.violation_log(endpoint),
            None => self.keys.global_violation_log(),
        };

        let entries = self.store.list_range(&key, limit).await?;
        Ok(entries
            .iter()
            .filter_map(|raw| match serde_json::from_str(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Skipping unreadable violation record");
                    None
                }
            })
            .collect())
    }

    /// Counter key statistics, optionally restricted to one endpoint.
    ///
    /// A key is active while it still carries a TTL.
    pub async fn get_rate_limit_stats(
        &self,
        endpoint_name: Option<&str>,
    ) -> Result<RateLimitStats, StoreError> {
        let mut stats = RateLimitStats::default();
        let mut per_endpoint = HashMap::new();

        for algorithm in Algorithm::ALL {
            for key in self.store.scan_keys(&self.keys.counter_pattern(algorithm)).await? {
                let Some(endpoint) = self.keys.endpoint_of_counter(&key) else {
                    continue;
                };
                if endpoint_name.is_some_and(|wanted| wanted != endpoint) {
                    continue;
                }
                let active = self.store.ttl(&key).await?.is_some();
                stats.record_key(algorithm, active, endpoint, &mut per_endpoint);
            }
        }

        Ok(stats.finish(per_endpoint))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::adapters::clock::ManualClock;
    use crate::adapters::counting_store::InMemoryCountingStore;
    use crate::application::rate_limit::RateLimitEngine;
    use crate::config::EngineConfig;
    use crate::domain::rate_limit::{Algorithm, ClientRequest, FactorType, RateLimitConfig};
    use crate::ports::CountingStore;

    fn engine() -> (Arc<InMemoryCountingStore>, RateLimitEngine) {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let store = Arc::new(InMemoryCountingStore::new(clock.clone()));
        let config = EngineConfig {
            background_tracking: false,
            ..Default::default()
        };
        let engine = RateLimitEngine::builder(store.clone(), clock, config).build();
        (store, engine)
    }

    #[tokio::test]
    async fn reset_restores_full_budget() {
        let (_store, engine) = engine();
        let request = ClientRequest::from_ip("1.2.3.4");
        let config = RateLimitConfig::new("status", 1, 60, Algorithm::Fixed).unwrap();

        engine.check_rate_limit(&request, &config).await;
        assert!(engine.check_rate_limit(&request, &config).await.is_denied());

        assert!(engine.reset_rate_limit("status", "1.2.3.4", Algorithm::Fixed).await);
        assert!(engine.check_rate_limit(&request, &config).await.is_allowed());
    }

    #[tokio::test]
    async fn reset_reports_store_failure() {
        let (store, engine) = engine();
        store.set_unavailable(true);
        assert!(!engine.reset_rate_limit("status", "1.2.3.4", Algorithm::Fixed).await);
    }

    #[tokio::test]
    async fn violations_are_listed_newest_first() {
        let (_store, engine) = engine();
        let config = RateLimitConfig::new("send-email", 1, 3600, Algorithm::Sliding).unwrap();

        for ip in ["1.1.1.1", "2.2.2.2"] {
            let request = ClientRequest::from_ip(ip);
            engine.check_rate_limit(&request, &config).await;
            engine.check_rate_limit(&request, &config).await;
        }

        let violations = engine
            .get_rate_limit_violations(Some("send-email"), 10)
            .await
            .unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].factor, FactorType::Ip);
        assert_ne!(violations[0].hashed_client_id, violations[1].hashed_client_id);

        let all = engine.get_rate_limit_violations(None, 1).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], violations[0]);
    }

    #[tokio::test]
    async fn unreadable_violation_entries_are_skipped() {
        let (store, engine) = engine();
        store
            .list_push_capped("rate_limit:violations:status", "not json", 10, 60)
            .await
            .unwrap();
        let violations = engine.get_rate_limit_violations(Some("status"), 10).await.unwrap();
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn stats_count_keys_per_algorithm_and_endpoint() {
        let (_store, engine) = engine();
        let status = RateLimitConfig::new("status", 60, 60, Algorithm::Fixed).unwrap();
        let store_key = RateLimitConfig::new("store-key", 10, 3600, Algorithm::Sliding).unwrap();

        for ip in ["1.1.1.1", "2.2.2.2"] {
            engine.check_rate_limit(&ClientRequest::from_ip(ip), &status).await;
        }
        engine.check_rate_limit(&ClientRequest::from_ip("1.1.1.1"), &store_key).await;

        let stats = engine.get_rate_limit_stats(None).await.unwrap();
        assert_eq!(stats.total_keys, 3);
        assert_eq!(stats.active_keys, 3);
        assert_eq!(stats.algorithm_counts.get(&Algorithm::Fixed), Some(&2));
        assert_eq!(stats.algorithm_counts.get(&Algorithm::Sliding), Some(&1));
        assert_eq!(stats.top_endpoints[0].endpoint_name, "status");

        let filtered = engine.get_rate_limit_stats(Some("store-key")).await.unwrap();
        assert_eq!(filtered.total_keys, 1);
    }
}
