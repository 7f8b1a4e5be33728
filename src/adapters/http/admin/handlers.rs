//! HTTP handlers for the rate limit admin endpoints.
//!
//! These endpoints expose engine internals and must sit behind whatever
//! operator authentication the deployment uses.

use std::sync::Arc;

use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::rate_limit::RateLimitEngine;
use crate::ports::StoreError;

use super::dto::{
    ErrorResponse, ResetRequest, ResetResponse, StatsQuery, StatsResponse, ViolationsQuery,
    ViolationsResponse,
};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminAppState {
    pub engine: Arc<RateLimitEngine>,
}

/// Store failures surfaced to operators.
#[derive(Debug)]
pub struct AdminApiError(pub StoreError);

impl From<StoreError> for AdminApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Admin request failed");
        let (status, code) = match self.0 {
            StoreError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "STORE_TIMEOUT"),
            StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
            StoreError::Corrupt { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_CORRUPT"),
        };
        (status, Json(ErrorResponse::new(code, self.0.to_string()))).into_response()
    }
}

/// GET /stats - Counter key statistics
pub async fn get_stats(
    State(state): State<AdminAppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AdminApiError> {
    let stats = state
        .engine
        .get_rate_limit_stats(query.endpoint.as_deref())
        .await?;
    Ok(Json(StatsResponse { stats }))
}

/// GET /violations - Most recent violations, newest first
pub async fn get_violations(
    State(state): State<AdminAppState>,
    Query(query): Query<ViolationsQuery>,
) -> Result<impl IntoResponse, AdminApiError> {
    let violations = state
        .engine
        .get_rate_limit_violations(query.endpoint.as_deref(), query.effective_limit())
        .await?;
    Ok(Json(ViolationsResponse::from(violations)))
}

/// POST /reset - Clear one client's counter and tightening
pub async fn reset_rate_limit(
    State(state): State<AdminAppState>,
    Json(request): Json<ResetRequest>,
) -> impl IntoResponse {
    let reset = state
        .engine
        .reset_rate_limit(&request.endpoint_name, &request.identifier, request.algorithm)
        .await;
    let status = if reset {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ResetResponse { reset }))
}
