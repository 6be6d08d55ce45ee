//! Client identification utilities
//!
//! Resolves the identity a request is accounted against. Anonymous
//! callers are identified by a salted hash of their IP so raw addresses
//! never reach the shared store.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::{env_flag, env_or, env_string};
use crate::crypto::sha256_hex;

const USER_ID_HEADER: &str = "x-user-id";
const USER_TIER_HEADER: &str = "x-user-tier";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const MAX_USER_ID_LEN: usize = 128;

/// Quota tier of a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Anonymous callers and authenticated users without a plan
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }
}

/// Identity used as the key for sessions and per-identity quotas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// `ip:<hash>` or `user:<id>`
    pub key: String,
    pub tier: Tier,
    /// Client IP address (for logging only)
    pub ip: Option<IpAddr>,
}

impl ClientIdentity {
    pub fn anonymous(ip: Option<IpAddr>, salt: &str) -> Self {
        let raw = ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
        let hash = sha256_hex(format!("{salt}{raw}").as_bytes());
        Self {
            key: format!("ip:{hash}"),
            tier: Tier::Free,
            ip,
        }
    }

    pub fn user(user_id: &str, tier: Tier, ip: Option<IpAddr>) -> Self {
        Self {
            key: format!("user:{user_id}"),
            tier,
            ip,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.key.starts_with("user:")
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // hashes are long; a prefix is enough to correlate log lines
        let shown: String = self.key.chars().take(20).collect();
        write!(f, "{shown}")
    }
}

/// How identities are derived from requests
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Salt mixed into IP hashes
    pub ip_salt: String,
    /// Accept `X-User-Id` / `X-User-Tier` set by an authenticating proxy
    pub trust_user_header: bool,
    /// Reverse proxies in front of the gateway that append to
    /// `X-Forwarded-For`. Zero means the header is ignored and the socket
    /// address is the client.
    pub trusted_proxy_hops: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            ip_salt: "briefing-gateway".to_string(),
            trust_user_header: false,
            trusted_proxy_hops: 0,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ip_salt: env_string("IP_HASH_SALT").unwrap_or(defaults.ip_salt),
            trust_user_header: env_flag("TRUST_USER_HEADER", defaults.trust_user_header),
            trusted_proxy_hops: env_or("TRUSTED_PROXY_HOPS", defaults.trusted_proxy_hops),
        }
    }
}

/// Resolve the identity of a request.
///
/// User headers are only honoured when the deployment says a trusted proxy
/// sets them; otherwise any client could claim a pro account. The same
/// holds for `X-Forwarded-For`, see [`client_ip`].
pub fn resolve_identity(
    headers: &HeaderMap,
    socket_ip: Option<IpAddr>,
    config: &IdentityConfig,
) -> ClientIdentity {
    let client_ip = client_ip(headers, socket_ip, config.trusted_proxy_hops);

    if config.trust_user_header {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_USER_ID_LEN);

        if let Some(user_id) = user_id {
            let tier = match headers.get(USER_TIER_HEADER).and_then(|v| v.to_str().ok()) {
                Some(t) if t.trim().eq_ignore_ascii_case("pro") => Tier::Pro,
                _ => Tier::Free,
            };
            return ClientIdentity::user(user_id, tier, client_ip);
        }
    }

    ClientIdentity::anonymous(client_ip, &config.ip_salt)
}

/// Client IP address for a request
///
/// With `trusted_proxy_hops = 0` this is the socket address. Otherwise each
/// trusted proxy appended one entry to `X-Forwarded-For`, so the client is
/// the entry `trusted_proxy_hops` places from the right; anything left of
/// it was written by the client and is ignored. A header shorter than that
/// falls back to the socket address.
pub fn client_ip(
    headers: &HeaderMap,
    socket_ip: Option<IpAddr>,
    trusted_proxy_hops: usize,
) -> Option<IpAddr> {
    if trusted_proxy_hops == 0 {
        return socket_ip;
    }

    let hops: Vec<&str> = headers
        .get_all(FORWARDED_FOR_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect();

    hops.iter()
        .rev()
        .nth(trusted_proxy_hops - 1)
        .and_then(|hop| hop.parse::<IpAddr>().ok())
        .or(socket_ip)
}

/// Extractor for the peer socket address, present when the server was
/// started with connect info. Forwarding headers are applied later by
/// [`resolve_identity`], which knows whether they can be trusted.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let socket_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Ok(ClientIp(socket_ip))
    }
}
