//! Domain Entities
//!
//! Core business entities for the admission domain.

use chrono::{DateTime, Utc};
use kernel::id::PowSessionId;
use std::fmt;

/// A signed, stateless PoW challenge.
///
/// Wire form is `<salt hex>.<issued_at_ms>.<signature hex>`. Nothing is
/// stored server-side; the signature proves the server issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub salt: String,
    pub issued_at_ms: i64,
    pub signature: String,
}

impl Challenge {
    /// Split a wire-form challenge. Returns `None` for anything that is
    /// not three well-formed parts; the signature is not checked here.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('.');
        let salt = parts.next()?;
        let issued_at_ms = parts.next()?.parse::<i64>().ok()?;
        let signature = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let is_hex = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit());
        if !is_hex(salt) || !is_hex(signature) {
            return None;
        }

        Some(Self {
            salt: salt.to_string(),
            issued_at_ms,
            signature: signature.to_string(),
        })
    }

    /// The part covered by the signature
    pub fn signed_payload(&self) -> String {
        format!("{}.{}", self.salt, self.issued_at_ms)
    }

    pub fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.issued_at_ms > ttl_ms
    }

    /// Challenges from the future are clock skew or forgery
    pub fn is_from_future(&self, now_ms: i64, tolerance_ms: i64) -> bool {
        self.issued_at_ms - now_ms > tolerance_ms
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.salt, self.issued_at_ms, self.signature)
    }
}

/// PowSession entity - a verified client allowed to skip PoW until expiry
#[derive(Debug, Clone)]
pub struct PowSession {
    pub id: PowSessionId,
    /// [`platform::client::ClientIdentity::key`] the session is bound to
    pub identity_key: String,
    pub created_at: DateTime<Utc>,
}

impl PowSession {
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            id: PowSessionId::new(),
            identity_key: identity_key.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_roundtrip() {
        let raw = "0a1b2c.1700000000000.ffee";
        let challenge = Challenge::parse(raw).unwrap();
        assert_eq!(challenge.salt, "0a1b2c");
        assert_eq!(challenge.issued_at_ms, 1_700_000_000_000);
        assert_eq!(challenge.to_string(), raw);
        assert_eq!(challenge.signed_payload(), "0a1b2c.1700000000000");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Challenge::parse("abc").is_none());
        assert!(Challenge::parse("ab.12").is_none());
        assert!(Challenge::parse("ab.xx.cd").is_none());
        assert!(Challenge::parse("zz.12.cd").is_none());
        assert!(Challenge::parse("ab.12.cd.ef").is_none());
        assert!(Challenge::parse(".12.cd").is_none());
    }

    #[test]
    fn test_expiry() {
        let challenge = Challenge::parse("ab.1000.cd").unwrap();
        assert!(!challenge.is_expired(1500, 1000));
        assert!(challenge.is_expired(2001, 1000));
        assert!(challenge.is_from_future(0, 500));
        assert!(!challenge.is_from_future(900, 500));
    }
}
