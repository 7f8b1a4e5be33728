//! RateLimitEngine - single entry point for allow/deny decisions.
//!
//! Resolves the client identity, applies any active tightening, runs the
//! configured window algorithm and hands denials to the violation tracker.
//! Every store failure on the decision path fails open.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::foundation::Timestamp;
use crate::domain::rate_limit::{
    device_fingerprint, normalize_identifier, resolve_identifier, Algorithm, ClientRequest,
    FactorType, HashedClientId, IdentifierHasher, KeySpace, RateLimitConfig, RateLimitResult,
    Sha256IdentifierHasher, ViolationRecord,
};
use crate::ports::{AlertPublisher, Clock, CountingStore, StoreError};

use super::adaptive::AdaptiveTightener;
use super::captcha::CaptchaGate;
use super::tracker::ViolationTracker;
use super::windows::{FixedWindow, SlidingWindow, WindowCounter};

/// Extra identities checked alongside the primary one.
///
/// Each present identifier is limited independently on the same endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryIdentifiers {
    pub wallet: Option<String>,
    pub email: Option<String>,
    pub device_fingerprint: Option<String>,
}

impl SecondaryIdentifiers {
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Uses the fingerprint derived from the request headers.
    pub fn with_device_from(mut self, request: &ClientRequest) -> Self {
        self.device_fingerprint = Some(device_fingerprint(request));
        self
    }
}

/// Adaptive multi-factor rate limiter.
pub struct RateLimitEngine {
    pub(super) store: Arc<dyn CountingStore>,
    pub(super) config: Arc<EngineConfig>,
    pub(super) keys: KeySpace,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) hasher: Arc<dyn IdentifierHasher>,
    fixed: FixedWindow,
    sliding: SlidingWindow,
    pub(super) adaptive: AdaptiveTightener,
    captcha: CaptchaGate,
    tracker: Arc<ViolationTracker>,
}

/// Builder for [`RateLimitEngine`].
pub struct RateLimitEngineBuilder {
    store: Arc<dyn CountingStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    hasher: Arc<dyn IdentifierHasher>,
    alerts: Option<Arc<dyn AlertPublisher>>,
}

impl RateLimitEngineBuilder {
    pub fn hasher(mut self, hasher: Arc<dyn IdentifierHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn alerts(mut self, alerts: Arc<dyn AlertPublisher>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn build(self) -> RateLimitEngine {
        let keys = KeySpace::new(self.config.key_prefix.clone());
        let config = Arc::new(self.config);
        let adaptive = AdaptiveTightener::new(self.store.clone(), keys.clone(), config.clone());
        let captcha = CaptchaGate::new(self.store.clone(), keys.clone(), config.clone());
        let tracker = Arc::new(ViolationTracker::new(
            self.store.clone(),
            keys.clone(),
            config.clone(),
            adaptive.clone(),
            captcha.clone(),
            self.alerts,
        ));

        RateLimitEngine {
            fixed: FixedWindow::new(self.store.clone(), self.clock.clone()),
            sliding: SlidingWindow::new(self.store.clone(), self.clock.clone()),
            store: self.store,
            config,
            keys,
            clock: self.clock,
            hasher: self.hasher,
            adaptive,
            captcha,
            tracker,
        }
    }
}

/// One identity to check on behalf of a request.
struct Identity<'a> {
    raw: &'a str,
    factor: FactorType,
    limit: u32,
}

impl RateLimitEngine {
    /// Starts a builder using the SHA-256 hasher and no alert publisher.
    pub fn builder(
        store: Arc<dyn CountingStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> RateLimitEngineBuilder {
        RateLimitEngineBuilder {
            store,
            clock,
            config,
            hasher: Arc::new(Sha256IdentifierHasher),
            alerts: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn captcha_provider(&self) -> &str {
        self.captcha.provider()
    }

    /// Checks and records one request against `config`.
    pub async fn check_rate_limit(
        &self,
        request: &ClientRequest,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        if self.config.bypass {
            return self.full_budget(config);
        }

        match self.check_primary(request, config).await {
            Ok(result) => result,
            Err(_) => self.full_budget(config),
        }
    }

    /// Checks the primary identity and then every secondary identity.
    ///
    /// The request is denied if any factor denies. Wallet and email use a
    /// stricter share of the primary limit than the device fingerprint.
    /// A store failure on any factor fails the whole request open with the
    /// configured budget.
    pub async fn check_multi_factor_rate_limit(
        &self,
        request: &ClientRequest,
        config: &RateLimitConfig,
        secondary: &SecondaryIdentifiers,
    ) -> RateLimitResult {
        if self.config.bypass {
            return self.full_budget(config);
        }

        match self.check_all_factors(request, config, secondary).await {
            Ok(result) => result,
            Err(_) => self.full_budget(config),
        }
    }

    async fn check_all_factors(
        &self,
        request: &ClientRequest,
        config: &RateLimitConfig,
        secondary: &SecondaryIdentifiers,
    ) -> Result<RateLimitResult, StoreError> {
        let mut combined = self.check_primary(request, config).await?;
        if combined.is_denied() {
            return Ok(combined);
        }

        let factors = [
            (
                secondary.wallet.as_deref(),
                FactorType::Wallet,
                self.config.wallet_email_factor_ratio,
            ),
            (
                secondary.email.as_deref(),
                FactorType::Email,
                self.config.wallet_email_factor_ratio,
            ),
            (
                secondary.device_fingerprint.as_deref(),
                FactorType::Device,
                self.config.device_factor_ratio,
            ),
        ];

        for (value, factor, ratio) in factors {
            let Some(raw) = value.map(normalize_identifier).filter(|v| !v.is_empty()) else {
                continue;
            };
            let identity = Identity {
                raw: &raw,
                factor,
                limit: config.scaled_limit(ratio),
            };
            let result = self.check_identity(request, config, identity).await?;

            if result.is_denied() {
                return Ok(self.carry_captcha(result, &combined));
            }
            combined = merge_allowed(combined, result);
        }

        Ok(combined)
    }

    /// Reports the current state for the request's identity without
    /// recording a hit.
    pub async fn get_rate_limit_status(
        &self,
        request: &ClientRequest,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        if self.config.bypass {
            return self.full_budget(config);
        }

        let now = self.clock.now();
        let raw = resolve_identifier(request, config.explicit_identifier());
        let client = self.hasher.hash(&raw);
        let key = self
            .keys
            .counter(config.algorithm(), config.endpoint_name(), &client);
        let effective = self
            .adaptive
            .effective_limit(config.endpoint_name(), &client, config.max_requests(), &now)
            .await;

        let result = match self
            .window(config.algorithm())
            .peek(&key, effective.limit, config.window_secs())
            .await
        {
            Ok(result) => result.with_adaptive_limit(effective.tightened),
            Err(e) => {
                tracing::warn!(
                    endpoint = config.endpoint_name(),
                    client = %client,
                    error = %e,
                    "Rate limit status unavailable, failing open"
                );
                return RateLimitResult::fail_open(config.max_requests(), now, config.window_secs());
            }
        };

        self.apply_captcha(result, &client).await
    }

    pub(super) fn window(&self, algorithm: Algorithm) -> &dyn WindowCounter {
        match algorithm {
            Algorithm::Fixed => &self.fixed,
            Algorithm::Sliding => &self.sliding,
        }
    }

    fn full_budget(&self, config: &RateLimitConfig) -> RateLimitResult {
        RateLimitResult::fail_open(config.max_requests(), self.clock.now(), config.window_secs())
    }

    async fn check_primary(
        &self,
        request: &ClientRequest,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, StoreError> {
        let raw = resolve_identifier(request, config.explicit_identifier());
        let identity = Identity {
            raw: &raw,
            factor: FactorType::infer(&raw),
            limit: config.max_requests(),
        };
        self.check_identity(request, config, identity).await
    }

    /// Runs one identity through its window. Store errors are logged and
    /// returned so the caller can fail open.
    async fn check_identity(
        &self,
        request: &ClientRequest,
        config: &RateLimitConfig,
        identity: Identity<'_>,
    ) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.now();
        let endpoint = config.endpoint_name();
        let client = self.hasher.hash(identity.raw);
        let key = self.keys.counter(config.algorithm(), endpoint, &client);

        let effective = self
            .adaptive
            .effective_limit(endpoint, &client, identity.limit, &now)
            .await;

        let result = match self
            .window(config.algorithm())
            .hit(&key, effective.limit, config.window_secs())
            .await
        {
            Ok(result) => result.with_adaptive_limit(effective.tightened),
            Err(e) => {
                tracing::warn!(
                    endpoint,
                    client = %client,
                    algorithm = %config.algorithm(),
                    error = %e,
                    "Rate limit store unavailable, failing open"
                );
                return Err(e);
            }
        };

        if result.is_denied() {
            tracing::debug!(
                endpoint,
                client = %client,
                factor = %identity.factor,
                limit = result.limit,
                "Rate limit exceeded"
            );
            self.track(self.violation(request, endpoint, client.clone(), identity.factor, now))
                .await;
        }

        Ok(self.apply_captcha(result, &client).await)
    }

    fn violation(
        &self,
        request: &ClientRequest,
        endpoint: &str,
        client: HashedClientId,
        factor: FactorType,
        now: Timestamp,
    ) -> ViolationRecord {
        let ip = resolve_identifier(request, None);
        ViolationRecord {
            timestamp: now,
            endpoint_name: endpoint.to_string(),
            hashed_client_id: client,
            factor,
            ip: Some(self.hasher.hash(&ip)),
            user_agent: request
                .user_agent
                .as_deref()
                .map(ViolationRecord::truncate_user_agent),
        }
    }

    async fn track(&self, violation: ViolationRecord) {
        if self.config.background_tracking {
            let tracker = Arc::clone(&self.tracker);
            tokio::spawn(async move { tracker.record(violation).await });
        } else {
            self.tracker.record(violation).await;
        }
    }

    async fn apply_captcha(&self, result: RateLimitResult, client: &HashedClientId) -> RateLimitResult {
        if self.captcha.is_required(client).await {
            result.with_captcha(self.captcha.provider())
        } else {
            result
        }
    }

    fn carry_captcha(&self, denied: RateLimitResult, earlier: &RateLimitResult) -> RateLimitResult {
        if earlier.requires_captcha && !denied.requires_captcha {
            denied.with_captcha(self.captcha.provider())
        } else {
            denied
        }
    }
}

/// Most conservative combination of two allowed results.
fn merge_allowed(a: RateLimitResult, b: RateLimitResult) -> RateLimitResult {
    RateLimitResult {
        allowed: true,
        remaining: a.remaining.min(b.remaining),
        limit: a.limit.min(b.limit),
        reset_at: a.reset_at.max(b.reset_at),
        retry_after_secs: None,
        requires_captcha: a.requires_captcha || b.requires_captcha,
        captcha_provider: a.captcha_provider.or(b.captcha_provider),
        adaptive_limit_applied: a.adaptive_limit_applied || b.adaptive_limit_applied,
    }
}
