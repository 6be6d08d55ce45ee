//! Rate Limiting Infrastructure
//!
//! Two independent gates over the shared [`KvStore`]:
//! - a global gate, one counter for all callers over a fixed window
//! - a per-identity daily gate, keyed by [`ClientIdentity::key`] with a
//!   tier-dependent quota
//!
//! What happens when the store itself fails is decided per gate by a
//! [`StoreErrorPolicy`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use kernel::error::app_error::AppError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::client::{ClientIdentity, Tier};
use crate::config::{env_or, env_secs_or};
use crate::kv::{KvError, KvStore};

/// Behaviour of a gate when its backing store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorPolicy {
    /// Fail open: let the request through
    Allow,
    /// Fail closed: reject with 503
    Deny,
}

impl FromStr for StoreErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" | "open" => Ok(StoreErrorPolicy::Allow),
            "deny" | "closed" => Ok(StoreErrorPolicy::Deny),
            other => Err(format!("unknown store error policy: {other}")),
        }
    }
}

/// Global ceiling shared by every caller
#[derive(Debug, Clone)]
pub struct GlobalLimit {
    pub ceiling: u32,
    pub window: Duration,
    pub on_store_error: StoreErrorPolicy,
}

/// Per-identity quota, reset at UTC midnight
#[derive(Debug, Clone)]
pub struct DailyQuota {
    pub free: u32,
    pub pro: u32,
    pub on_store_error: StoreErrorPolicy,
}

impl DailyQuota {
    pub fn limit_for(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.free,
            Tier::Pro => self.pro,
        }
    }
}

/// Rate limit configuration for one call site
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Key namespace, so call sites never share counters
    pub scope: String,
    pub global: Option<GlobalLimit>,
    pub daily: DailyQuota,
}

impl RateLimitConfig {
    /// Gates in front of the briefing endpoint. Both fail closed by
    /// default: every admitted request there costs model tokens.
    pub fn briefing() -> Self {
        Self {
            scope: "briefing".to_string(),
            global: Some(GlobalLimit {
                ceiling: 300,
                window: Duration::from_secs(60),
                on_store_error: StoreErrorPolicy::Deny,
            }),
            daily: DailyQuota {
                free: 20,
                pro: 200,
                on_store_error: StoreErrorPolicy::Deny,
            },
        }
    }

    /// Per-IP counter in front of challenge issuance. Fails open: a
    /// challenge costs nothing but a random string.
    pub fn challenge() -> Self {
        Self {
            scope: "challenge".to_string(),
            global: None,
            daily: DailyQuota {
                free: 30,
                pro: 30,
                on_store_error: StoreErrorPolicy::Allow,
            },
        }
    }

    pub fn briefing_from_env() -> Self {
        let defaults = Self::briefing();
        let global = defaults.global.unwrap_or(GlobalLimit {
            ceiling: 300,
            window: Duration::from_secs(60),
            on_store_error: StoreErrorPolicy::Deny,
        });
        Self {
            scope: defaults.scope,
            global: Some(GlobalLimit {
                ceiling: env_or("GLOBAL_RATE_LIMIT", global.ceiling),
                window: env_secs_or("GLOBAL_RATE_WINDOW_SECS", global.window.as_secs()),
                on_store_error: env_or("GLOBAL_GATE_ON_STORE_ERROR", global.on_store_error),
            }),
            daily: DailyQuota {
                free: env_or("DAILY_QUOTA_FREE", defaults.daily.free),
                pro: env_or("DAILY_QUOTA_PRO", defaults.daily.pro),
                on_store_error: env_or(
                    "IDENTITY_GATE_ON_STORE_ERROR",
                    defaults.daily.on_store_error,
                ),
            },
        }
    }

    pub fn challenge_from_env() -> Self {
        let defaults = Self::challenge();
        let limit = env_or("CHALLENGE_RATE_LIMIT", defaults.daily.free);
        Self {
            scope: defaults.scope,
            global: None,
            daily: DailyQuota {
                free: limit,
                pro: limit,
                on_store_error: env_or(
                    "CHALLENGE_GATE_ON_STORE_ERROR",
                    defaults.daily.on_store_error,
                ),
            },
        }
    }
}

/// Outcome of an admitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    /// `None` when the store failed and the gate let the request through
    pub remaining: Option<u32>,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Global request ceiling reached")]
    GlobalExceeded { retry_after_secs: u64 },

    #[error("Daily quota of {limit} requests reached")]
    IdentityExceeded { limit: u32, retry_after_secs: u64 },

    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(#[source] KvError),
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::GlobalExceeded { retry_after_secs } => AppError::too_many_requests(
                "The service is busy right now. Please try again in a minute.",
            )
            .with_label("Rate limit exceeded")
            .with_retry_after(retry_after_secs),
            RateLimitError::IdentityExceeded {
                limit,
                retry_after_secs,
            } => AppError::too_many_requests(format!(
                "You have used all {limit} requests for today. The limit resets at midnight UTC."
            ))
            .with_label("Rate limit exceeded")
            .with_detail("limit", limit)
            .with_detail("remaining", 0)
            .with_retry_after(retry_after_secs),
            RateLimitError::StoreUnavailable(source) => AppError::from(source),
        }
    }
}

pub struct RateLimiter<K>
where
    K: KvStore,
{
    store: Arc<K>,
    config: Arc<RateLimitConfig>,
}

impl<K> Clone for RateLimiter<K>
where
    K: KvStore,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<K> RateLimiter<K>
where
    K: KvStore,
{
    pub fn new(store: Arc<K>, config: Arc<RateLimitConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Both gates; the global one first so a flood is cut before any
    /// per-identity bookkeeping.
    pub async fn check(&self, identity: &ClientIdentity) -> Result<RateLimitStatus, RateLimitError> {
        self.check_global().await?;
        self.check_identity(identity).await
    }

    /// Increment-then-compare. Rejected requests are not decremented, so
    /// the counter may overshoot the ceiling under a race.
    pub async fn check_global(&self) -> Result<(), RateLimitError> {
        let Some(global) = &self.config.global else {
            return Ok(());
        };

        let key = format!("ratelimit:{}:global", self.config.scope);
        let count = match self.store.incr_with_expiry(&key, 1, global.window).await {
            Ok(count) => count,
            Err(e) => return self.on_store_error(global.on_store_error, "global", e).map(|_| ()),
        };

        if count > i64::from(global.ceiling) {
            tracing::warn!(
                scope = %self.config.scope,
                count,
                ceiling = global.ceiling,
                "Global rate limit exceeded"
            );
            let retry_after_secs = match self.store.ttl(&key).await {
                Ok(Some(left)) => left.as_secs() + u64::from(left.subsec_nanos() > 0),
                _ => global.window.as_secs(),
            };
            return Err(RateLimitError::GlobalExceeded {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        Ok(())
    }

    /// Read-then-conditionally-increment against the tier quota.
    pub async fn check_identity(
        &self,
        identity: &ClientIdentity,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let daily = &self.config.daily;
        let limit = daily.limit_for(identity.tier);
        let key = format!("ratelimit:{}:daily:{}", self.config.scope, identity.key);

        let current = match self.store.get(&key).await {
            Ok(value) => value.and_then(|v| v.parse::<u32>().ok()).unwrap_or(0),
            Err(e) => return self.on_store_error(daily.on_store_error, "identity", e),
        };

        let until_reset = seconds_until_utc_midnight(Utc::now());
        if current >= limit {
            tracing::warn!(
                scope = %self.config.scope,
                identity = %identity,
                tier = identity.tier.as_str(),
                limit,
                "Daily quota exhausted"
            );
            return Err(RateLimitError::IdentityExceeded {
                limit,
                retry_after_secs: until_reset,
            });
        }

        let count = match self
            .store
            .incr_with_expiry(&key, 1, Duration::from_secs(until_reset))
            .await
        {
            Ok(count) => count,
            Err(e) => return self.on_store_error(daily.on_store_error, "identity", e),
        };

        let used = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        Ok(RateLimitStatus {
            limit,
            remaining: Some(limit.saturating_sub(used)),
        })
    }

    fn on_store_error(
        &self,
        policy: StoreErrorPolicy,
        gate: &'static str,
        error: KvError,
    ) -> Result<RateLimitStatus, RateLimitError> {
        match policy {
            StoreErrorPolicy::Allow => {
                tracing::warn!(
                    scope = %self.config.scope,
                    gate,
                    error = %error,
                    "Rate limit store failed, allowing request"
                );
                Ok(RateLimitStatus {
                    limit: self.config.daily.free,
                    remaining: None,
                })
            }
            StoreErrorPolicy::Deny => {
                tracing::error!(
                    scope = %self.config.scope,
                    gate,
                    error = %error,
                    "Rate limit store failed, denying request"
                );
                Err(RateLimitError::StoreUnavailable(error))
            }
        }
    }
}

/// Seconds until the next UTC midnight, at least 1
pub fn seconds_until_utc_midnight(now: DateTime<Utc>) -> u64 {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    let midnight = tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now + ChronoDuration::days(1));
    u64::try_from((midnight - now).num_seconds()).unwrap_or(1).max(1)
}
