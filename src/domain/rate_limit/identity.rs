//! Client identity resolution and privacy-preserving hashing.
//!
//! Every identifier (IP, wallet, email, device fingerprint) is reduced to a
//! `HashedClientId` before it touches a storage key or a log line. The raw
//! value only lives for the duration of a single check.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier used when a request carries no address information at all.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Hex characters kept from the SHA-256 digest.
pub const HASHED_ID_LEN: usize = 16;

/// Request metadata the limiter needs, detached from any HTTP framework.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRequest {
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header value.
    pub real_ip: Option<String>,
    /// Peer address of the connection.
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
}

impl ClientRequest {
    /// Request seen directly from `ip` with no proxy headers.
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(ip.into()),
            ..Default::default()
        }
    }

    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    pub fn with_user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }
}

/// Identity axis an identifier belongs to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    Ip,
    Wallet,
    Email,
    Device,
}

impl FactorType {
    pub const ALL: [FactorType; 4] = [
        FactorType::Ip,
        FactorType::Wallet,
        FactorType::Email,
        FactorType::Device,
    ];

    /// Infers the factor from the identifier's shape.
    ///
    /// `@` means email, a `0x` prefix means wallet, anything else is an IP.
    pub fn infer(identifier: &str) -> Self {
        if identifier.contains('@') {
            FactorType::Email
        } else if identifier.starts_with("0x") {
            FactorType::Wallet
        } else {
            FactorType::Ip
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FactorType::Ip => "ip",
            FactorType::Wallet => "wallet",
            FactorType::Email => "email",
            FactorType::Device => "device",
        }
    }
}

impl fmt::Display for FactorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One-way digest of a client identifier. Safe to persist and log.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashedClientId(String);

impl HashedClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashedClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic one-way hashing of identifiers into storage-safe ids.
pub trait IdentifierHasher: Send + Sync {
    fn hash(&self, identifier: &str) -> HashedClientId;
}

/// SHA-256, hex encoded, truncated to [`HASHED_ID_LEN`] characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256IdentifierHasher;

impl IdentifierHasher for Sha256IdentifierHasher {
    fn hash(&self, identifier: &str) -> HashedClientId {
        let digest = Sha256::digest(identifier.as_bytes());
        let mut hex = format!("{:x}", digest);
        hex.truncate(HASHED_ID_LEN);
        HashedClientId(hex)
    }
}

/// Normalizes an explicit identifier: trimmed and lower-cased.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Derives the raw identifier for a request, normalized the same way
/// regardless of source so admin lookups hash to the same key.
///
/// Order of precedence:
/// 1. Explicit identifier supplied by the caller (normalized)
/// 2. First entry of `X-Forwarded-For`
/// 3. `X-Real-IP`
/// 4. Connection peer address
/// 5. The literal `"unknown"`
pub fn resolve_identifier(request: &ClientRequest, explicit: Option<&str>) -> String {
    if let Some(explicit) = explicit.map(normalize_identifier).filter(|s| !s.is_empty()) {
        return explicit;
    }

    if let Some(first) = request
        .forwarded_for
        .as_deref()
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return normalize_identifier(first);
    }

    [request.real_ip.as_deref(), request.remote_addr.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(normalize_identifier)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Combines user agent, accept-language and accept-encoding into a device
/// fingerprint. Missing headers contribute an empty segment.
pub fn device_fingerprint(request: &ClientRequest) -> String {
    format!(
        "{}|{}|{}",
        request.user_agent.as_deref().unwrap_or_default().trim(),
        request.accept_language.as_deref().unwrap_or_default().trim(),
        request.accept_encoding.as_deref().unwrap_or_default().trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn explicit_identifier_wins_and_is_normalized() {
        let request = ClientRequest::from_ip("10.0.0.1");
        assert_eq!(
            resolve_identifier(&request, Some("  0xAbCdEf  ")),
            "0xabcdef"
        );
    }

    #[test]
    fn blank_explicit_identifier_falls_back_to_ip() {
        let request = ClientRequest::from_ip("10.0.0.1");
        assert_eq!(resolve_identifier(&request, Some("   ")), "10.0.0.1");
    }

    #[test]
    fn first_forwarded_for_entry_is_used() {
        let request = ClientRequest::from_ip("10.0.0.1").with_forwarded_for(" 1.2.3.4 , 5.6.7.8");
        assert_eq!(resolve_identifier(&request, None), "1.2.3.4");
    }

    #[test]
    fn real_ip_precedes_peer_address() {
        let request = ClientRequest {
            real_ip: Some("9.8.7.6".into()),
            remote_addr: Some("10.0.0.1".into()),
            ..Default::default()
        };
        assert_eq!(resolve_identifier(&request, None), "9.8.7.6");
    }

    #[test]
    fn empty_request_resolves_to_unknown() {
        assert_eq!(resolve_identifier(&ClientRequest::default(), None), UNKNOWN_CLIENT);
        let blank = ClientRequest::default().with_forwarded_for(" ,1.1.1.1");
        assert_eq!(resolve_identifier(&blank, None), UNKNOWN_CLIENT);
    }

    #[test]
    fn device_fingerprint_joins_headers() {
        let request = ClientRequest {
            user_agent: Some("Mozilla/5.0".into()),
            accept_language: Some("en-US".into()),
            accept_encoding: None,
            ..Default::default()
        };
        assert_eq!(device_fingerprint(&request), "Mozilla/5.0|en-US|");
    }

    #[test]
    fn factor_inference_by_shape() {
        assert_eq!(FactorType::infer("alice@example.com"), FactorType::Email);
        assert_eq!(FactorType::infer("0x52908400098527886e0f7030069857d2e4169ee7"), FactorType::Wallet);
        assert_eq!(FactorType::infer("203.0.113.9"), FactorType::Ip);
        assert_eq!(FactorType::infer(UNKNOWN_CLIENT), FactorType::Ip);
    }

    #[test]
    fn sha256_hash_is_truncated_hex() {
        let hashed = Sha256IdentifierHasher.hash("abc");
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(hashed.as_str(), "ba7816bf8f01cfea");
    }

    proptest! {
        #[test]
        fn hashing_is_deterministic_and_hides_input(raw in "[a-zA-Z0-9@.]{20,64}") {
            let a = Sha256IdentifierHasher.hash(&raw);
            let b = Sha256IdentifierHasher.hash(&raw);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.as_str().len(), HASHED_ID_LEN);
            prop_assert!(!a.as_str().contains(raw.as_str()));
        }

        #[test]
        fn normalization_is_idempotent(raw in "[ \\ta-zA-Z0-9@.]{0,40}") {
            let once = normalize_identifier(&raw);
            prop_assert_eq!(normalize_identifier(&once), once.clone());
        }
    }
}
