//! Rate limiting middleware for axum.
//!
//! Enforces one [`RateLimitConfig`] through the [`RateLimitEngine`]. When an
//! earlier layer placed [`SecondaryIdentifiers`] in the request extensions
//! the multi-factor check runs instead of the single-identity check.
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the current window
//! - `X-RateLimit-Reset`: RFC 3339 time when a slot frees up
//! - `Retry-After`: Seconds to wait (only on 429 response)
//! - `X-Captcha-Required` / `X-Captcha-Provider`: set when a challenge is due
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post, middleware};
//!
//! let state = RateLimitState::new(engine, presets::store_key());
//!
//! let app = Router::new()
//!     .route("/keys", post(store_key))
//!     .layer(middleware::from_fn_with_state(state, rate_limit_middleware));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::rate_limit::{RateLimitEngine, SecondaryIdentifiers};
use crate::domain::rate_limit::{ClientRequest, RateLimitConfig, RateLimitResult};

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// RFC 3339 time when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
    /// Present with value `true` when the client must solve a challenge.
    pub static X_CAPTCHA_REQUIRED: HeaderName = HeaderName::from_static("x-captcha-required");
    /// Challenge provider the client should use.
    pub static X_CAPTCHA_PROVIDER: HeaderName = HeaderName::from_static("x-captcha-provider");
}

/// Rate limiter middleware state: the engine plus the endpoint being guarded.
#[derive(Clone)]
pub struct RateLimitState {
    engine: Arc<RateLimitEngine>,
    config: Arc<RateLimitConfig>,
}

impl RateLimitState {
    pub fn new(engine: Arc<RateLimitEngine>, config: RateLimitConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}

/// Rate limiting middleware for one endpoint configuration.
///
/// This middleware:
/// 1. Builds a [`ClientRequest`] from forwarded headers and `ConnectInfo`
/// 2. Runs the multi-factor check if secondary identifiers are present,
///    otherwise the single-identity check
/// 3. Returns 429 Too Many Requests on denial
/// 4. Adds rate limit headers to all responses
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_request_from_parts(request.headers(), connect_info.as_ref());

    let secondary = request.extensions().get::<SecondaryIdentifiers>().cloned();

    let result = match secondary {
        Some(secondary) => {
            state
                .engine
                .check_multi_factor_rate_limit(&client, &state.config, &secondary)
                .await
        }
        None => state.engine.check_rate_limit(&client, &state.config).await,
    };

    if result.is_denied() {
        return RateLimitRejection::from(result).into_response();
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(response.headers_mut(), &result);
    response
}

/// Build a [`ClientRequest`] from request headers and the peer address.
///
/// Reads `X-Forwarded-For`, `X-Real-IP`, `User-Agent`, `Accept-Language`
/// and `Accept-Encoding`. Headers that are not valid UTF-8 are ignored.
pub fn client_request_from_parts(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> ClientRequest {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    };

    ClientRequest {
        forwarded_for: header("x-forwarded-for"),
        real_ip: header("x-real-ip"),
        remote_addr: connect_info.map(|ci| ci.0.ip().to_string()),
        user_agent: header("user-agent"),
        accept_language: header("accept-language"),
        accept_encoding: header("accept-encoding"),
    }
}

/// Add rate limit (and CAPTCHA) headers to a response.
pub fn add_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(result.limit));
    headers.insert(
        headers::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(result.remaining),
    );
    if let Ok(reset) = HeaderValue::from_str(&result.reset_at.to_rfc3339()) {
        headers.insert(headers::X_RATELIMIT_RESET.clone(), reset);
    }

    if result.requires_captcha {
        headers.insert(
            headers::X_CAPTCHA_REQUIRED.clone(),
            HeaderValue::from_static("true"),
        );
        if let Some(provider) = result
            .captcha_provider
            .as_deref()
            .and_then(|p| HeaderValue::from_str(p).ok())
        {
            headers.insert(headers::X_CAPTCHA_PROVIDER.clone(), provider);
        }
    }
}

/// Rate limit checker for handlers that pick the identity themselves,
/// e.g. a wallet address from the request body.
///
/// # Example
///
/// ```ignore
/// async fn decrypt(
///     State(check): State<RateLimitCheck>,
///     headers: HeaderMap,
///     Json(body): Json<DecryptRequest>,
/// ) -> Result<impl IntoResponse, RateLimitRejection> {
///     let client = client_request_from_parts(&headers, None);
///     let config = presets::decrypt_mnemonic().with_identifier(&body.wallet);
///     check.check(&client, &config).await?;
///     // ... handle request
/// }
/// ```
#[derive(Clone)]
pub struct RateLimitCheck {
    engine: Arc<RateLimitEngine>,
}

impl RateLimitCheck {
    pub fn new(engine: Arc<RateLimitEngine>) -> Self {
        Self { engine }
    }

    /// Check a single identity; denial becomes a rejection.
    pub async fn check(
        &self,
        client: &ClientRequest,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitRejection> {
        let result = self.engine.check_rate_limit(client, config).await;
        if result.is_denied() {
            return Err(result.into());
        }
        Ok(result)
    }

    /// Check every identity axis; denial on any becomes a rejection.
    pub async fn check_multi_factor(
        &self,
        client: &ClientRequest,
        config: &RateLimitConfig,
        secondary: &SecondaryIdentifiers,
    ) -> Result<RateLimitResult, RateLimitRejection> {
        let result = self
            .engine
            .check_multi_factor_rate_limit(client, config, secondary)
            .await;
        if result.is_denied() {
            return Err(result.into());
        }
        Ok(result)
    }
}

/// Rejection for rate limit exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitRejection {
    pub result: RateLimitResult,
}

impl From<RateLimitResult> for RateLimitRejection {
    fn from(result: RateLimitResult) -> Self {
        Self { result }
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let retry_after_secs = self.result.retry_after_secs.unwrap_or(1);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Rate limit exceeded",
                "code": "RATE_LIMIT_EXCEEDED",
                "retry_after_secs": retry_after_secs,
                "requires_captcha": self.result.requires_captcha,
            })),
        )
            .into_response();

        let headers = response.headers_mut();
        add_rate_limit_headers(headers, &self.result);
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(retry_after_secs),
        );

        response
    }
}
