//! HTTP adapter for rate limit administration.
//!
//! - `GET /stats` - Key counts per algorithm and busiest endpoints
//! - `GET /violations` - Recent violation records
//! - `POST /reset` - Clear a client's counter and tightening

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AdminApiError, AdminAppState};
pub use routes::{admin_router, admin_routes};
