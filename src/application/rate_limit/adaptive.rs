//! Adaptive tightening: applies per-client and global limit reductions.
//!
//! Tightening is triggered by the violation tracker; this module reads,
//! writes and clears the state. Expired or unparsable state is deleted on
//! read and treated as absent.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::{
    scale_limit, AdaptiveState, GlobalTighteningState, HashedClientId, KeySpace,
};
use crate::ports::{CountingStore, StoreError};

/// Limit to enforce after tightening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveLimit {
    pub limit: u32,
    pub tightened: bool,
}

/// Reads and writes tightening state.
#[derive(Clone)]
pub struct AdaptiveTightener {
    store: Arc<dyn CountingStore>,
    keys: KeySpace,
    config: Arc<EngineConfig>,
}

impl AdaptiveTightener {
    pub fn new(store: Arc<dyn CountingStore>, keys: KeySpace, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    /// Limit for `client` on `endpoint` given any active tightening.
    ///
    /// When both a per-client and a global tightening are active the
    /// smaller limit wins. Store errors leave the limit untouched.
    pub async fn effective_limit(
        &self,
        endpoint: &str,
        client: &HashedClientId,
        max_requests: u32,
        now: &Timestamp,
    ) -> EffectiveLimit {
        let mut candidates = Vec::with_capacity(2);

        if self.config.adaptive_enabled {
            let key = self.keys.adaptive(endpoint, client);
            let state: Option<AdaptiveState> = self.read_state(&key).await;
            if let Some(state) = state {
                if state.is_active_at(now) {
                    candidates.push(scale_limit(
                        max_requests,
                        self.config.adaptive_tightening_factor,
                    ));
                } else {
                    self.discard(&key).await;
                }
            }
        }

        let key = self.keys.global_tightening();
        let global: Option<GlobalTighteningState> = self.read_state(&key).await;
        if let Some(global) = global {
            if global.is_active_at(now) {
                candidates.push(scale_limit(max_requests, global.factor));
            } else {
                self.discard(&key).await;
            }
        }

        match candidates.into_iter().min() {
            Some(limit) => EffectiveLimit {
                limit,
                tightened: true,
            },
            None => EffectiveLimit {
                limit: max_requests,
                tightened: false,
            },
        }
    }

    /// Creates per-client tightening unless one already exists.
    ///
    /// Returns the new state when this call created it.
    pub async fn activate(
        &self,
        endpoint: &str,
        client: &HashedClientId,
        now: Timestamp,
    ) -> Result<Option<AdaptiveState>, StoreError> {
        let duration = self.config.adaptive_tightening_duration_secs;
        let state = AdaptiveState {
            endpoint_name: endpoint.to_string(),
            hashed_client_id: client.clone(),
            applied_at: now,
            expires_at: now.plus_secs(duration),
        };
        let created = self
            .write_if_absent(&self.keys.adaptive(endpoint, client), &state, duration)
            .await?;
        Ok(created.then_some(state))
    }

    /// Creates the global tightening unless one is already active.
    pub async fn activate_global(
        &self,
        violations_observed: u64,
        now: Timestamp,
    ) -> Result<Option<GlobalTighteningState>, StoreError> {
        let duration = self.config.global_tightening_duration_secs;
        let state = GlobalTighteningState {
            applied_at: now,
            expires_at: now.plus_secs(duration),
            violations_observed,
            factor: self.config.global_tightening_factor,
        };
        let created = self
            .write_if_absent(&self.keys.global_tightening(), &state, duration)
            .await?;
        Ok(created.then_some(state))
    }

    /// Removes per-client tightening. Returns whether one existed.
    pub async fn clear(&self, endpoint: &str, client: &HashedClientId) -> Result<bool, StoreError> {
        self.store.delete(&self.keys.adaptive(endpoint, client)).await
    }

    async fn write_if_absent<T: serde::Serialize>(
        &self,
        key: &str,
        state: &T,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        let json = serde_json::to_string(state).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set_if_absent(key, &json, ttl_secs).await
    }

    async fn read_state<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read tightening state");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupt tightening state");
                self.discard(key).await;
                None
            }
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::warn!(key, error = %e, "Failed to delete tightening state");
        }
    }
}
