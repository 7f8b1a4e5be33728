//! Axum router configuration for the rate limit admin endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{get_stats, get_violations, reset_rate_limit, AdminAppState};

/// Create the admin API router.
///
/// # Routes
/// - `GET /stats?endpoint=` - Counter key statistics
/// - `GET /violations?endpoint=&limit=` - Recent violations
/// - `POST /reset` - Reset one client on one endpoint
pub fn admin_routes() -> Router<AdminAppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/violations", get(get_violations))
        .route("/reset", post(reset_rate_limit))
}

/// Admin router with state applied, ready to nest or serve.
pub fn admin_router(state: AdminAppState) -> Router {
    admin_routes().with_state(state)
}
