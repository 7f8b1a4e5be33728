//! Rate limiting domain - configs, identities, results and state shapes.

mod config;
mod identity;
mod keys;
mod result;
mod state;
mod stats;

pub use config::{presets, scale_limit, Algorithm, RateLimitConfig, RateLimitConfigError};
pub use identity::{
    device_fingerprint, normalize_identifier, resolve_identifier, ClientRequest, FactorType,
    HashedClientId, IdentifierHasher, Sha256IdentifierHasher, HASHED_ID_LEN, UNKNOWN_CLIENT,
};
pub use keys::KeySpace;
pub use result::RateLimitResult;
pub use state::{AdaptiveState, CaptchaState, GlobalTighteningState, ViolationRecord, MAX_USER_AGENT_LEN};
pub use stats::{EndpointKeyCount, RateLimitStats, TOP_ENDPOINTS};
