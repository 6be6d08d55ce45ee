//! Shared Key-Value Store
//!
//! All cross-request state of the gateway (session tokens, rate-limit
//! counters, usage tallies) lives behind [`KvStore`]. Operations are
//! assumed atomic individually; no multi-key transactions are used.

use kernel::error::app_error::AppError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{env_secs_or, env_string};

pub type KvResult<T> = Result<T, KvError>;

#[derive(Debug, Clone, Error)]
pub enum KvError {
    /// Store unreachable, timed out or answered with a non-success status
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store answered but the reply made no sense
    #[error("Store protocol error: {0}")]
    Protocol(String),
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        AppError::service_unavailable("Service temporarily unavailable, please retry shortly")
            .with_source(err)
    }
}

/// Shared store trait
#[trait_variant::make(KvStore: Send)]
pub trait LocalKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// SET with expiry
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;

    /// INCRBY, setting `ttl` only when the key did not exist yet.
    /// Returns the post-increment value.
    async fn incr_with_expiry(&self, key: &str, by: i64, ttl: Duration) -> KvResult<i64>;

    async fn del(&self, key: &str) -> KvResult<()>;

    /// Remaining time to live; `None` for a missing key or one without expiry
    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Writes between two sweeps of expired entries
const SWEEP_INTERVAL: u32 = 256;

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    writes_since_sweep: u32,
}

impl Entries {
    /// Keys that are written but never read again would otherwise stay
    /// forever; drop the expired ones every [`SWEEP_INTERVAL`] writes.
    fn insert(&mut self, key: &str, entry: Entry, now: Instant) {
        self.map.insert(key.to_string(), entry);
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_INTERVAL {
            self.map.retain(|_, e| e.is_live(now));
            self.writes_since_sweep = 0;
        }
    }
}

/// Process-local store for development and tests.
///
/// Uses `tokio::time::Instant`, so tests can pause the clock and advance
/// it past a TTL.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .map
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    #[cfg(test)]
    async fn stored(&self) -> usize {
        self.entries.lock().await.map.len()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(now + ttl),
        };
        self.entries.lock().await.insert(key, entry, now);
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, by: i64, ttl: Duration) -> KvResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let live = entries.map.get(key).filter(|e| e.is_live(now)).cloned();
        let entry = match live {
            Some(existing) => {
                let current: i64 = existing.value.parse().map_err(|_| {
                    KvError::Protocol(format!("value at {key} is not an integer"))
                })?;
                Entry {
                    value: (current + by).to_string(),
                    expires_at: existing.expires_at,
                }
            }
            None => Entry {
                value: by.to_string(),
                expires_at: Some(now + ttl),
            },
        };

        let value = entry.value.parse().unwrap_or(by);
        entries.insert(key, entry, now);
        Ok(value)
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.entries.lock().await.map.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .map
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at - now))
    }
}

// ============================================================================
// Upstash Redis REST store
// ============================================================================

/// Upstash connection settings
#[derive(Debug, Clone)]
pub struct UpstashConfig {
    pub rest_url: String,
    pub rest_token: String,
    pub timeout: Duration,
}

impl UpstashConfig {
    /// `None` when either the URL or the token is missing.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            rest_url: env_string("UPSTASH_REDIS_REST_URL")?
                .trim_end_matches('/')
                .to_string(),
            rest_token: env_string("UPSTASH_REDIS_REST_TOKEN")?,
            timeout: env_secs_or("KV_TIMEOUT_SECS", 5),
        })
    }
}

/// Redis over the Upstash REST protocol: a command is a JSON array posted
/// to the base URL, a pipeline is an array of arrays posted to `/pipeline`.
#[derive(Debug, Clone)]
pub struct UpstashKvStore {
    client: reqwest::Client,
    config: Arc<UpstashConfig>,
}

impl UpstashKvStore {
    pub fn new(config: UpstashConfig) -> KvResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KvError::Unavailable(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    async fn post(&self, url: &str, body: &Value) -> KvResult<Value> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.rest_token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KvError::Unavailable("request timed out".to_string())
                } else {
                    KvError::Unavailable(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KvError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| KvError::Protocol(format!("invalid reply body: {e}")))
    }

    async fn command(&self, args: &[&str]) -> KvResult<Value> {
        let reply = self.post(&self.config.rest_url, &Value::from(args.to_vec())).await?;
        parse_reply(reply)
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> KvResult<Vec<Value>> {
        let url = format!("{}/pipeline", self.config.rest_url);
        let body = Value::from(
            commands
                .iter()
                .map(|c| Value::from(c.clone()))
                .collect::<Vec<_>>(),
        );
        match self.post(&url, &body).await? {
            Value::Array(replies) => replies.into_iter().map(parse_reply).collect(),
            other => Err(KvError::Protocol(format!("pipeline reply not an array: {other}"))),
        }
    }
}

impl KvStore for UpstashKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        match self.command(&["GET", key]).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let secs = ttl.as_secs().max(1).to_string();
        self.command(&["SET", key, value, "EX", &secs]).await?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, by: i64, ttl: Duration) -> KvResult<i64> {
        let secs = ttl.as_secs().max(1).to_string();
        let replies = self
            .pipeline(&[
                vec!["INCRBY".to_string(), key.to_string(), by.to_string()],
                vec!["EXPIRE".to_string(), key.to_string(), secs, "NX".to_string()],
            ])
            .await?;

        replies
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| KvError::Protocol(format!("INCRBY {key} returned no integer")))
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.command(&["DEL", key]).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<Duration>> {
        // -2 missing key, -1 no expiry
        match self.command(&["PTTL", key]).await?.as_i64() {
            Some(ms) if ms >= 0 => Ok(Some(Duration::from_millis(ms.unsigned_abs()))),
            Some(_) => Ok(None),
            None => Err(KvError::Protocol(format!("PTTL {key} returned no integer"))),
        }
    }
}

/// Unwrap `{"result": ...}` / `{"error": "..."}`.
fn parse_reply(reply: Value) -> KvResult<Value> {
    match reply {
        Value::Object(mut fields) => {
            if let Some(err) = fields.remove("error") {
                return Err(KvError::Protocol(err.as_str().unwrap_or("error").to_string()));
            }
            fields
                .remove("result")
                .ok_or_else(|| KvError::Protocol("reply without result".to_string()))
        }
        other => Err(KvError::Protocol(format!("unexpected reply: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_reply, Duration, KvError, KvStore, MemoryKvStore, Value, SWEEP_INTERVAL};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_set_get_and_expiry() {
        let store = MemoryKvStore::new();
        store
            .set_ex("session:a", "ip:1", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("session:a").await.unwrap().as_deref(), Some("ip:1"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("session:a").await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_first_expiry() {
        let store = MemoryKvStore::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr_with_expiry("c", 1, ttl).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(store.incr_with_expiry("c", 1, ttl).await.unwrap(), 2);

        // expiry counted from the first increment, not the second
        tokio::time::advance(Duration::from_secs(21)).await;
        assert_eq!(store.incr_with_expiry("c", 5, ttl).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryKvStore::new();
        store.set_ex("k", "abc", Duration::from_secs(5)).await.unwrap();
        let err = store
            .incr_with_expiry("k", 1, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_del() {
        let store = MemoryKvStore::new();
        store.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_counts_down() {
        let store = MemoryKvStore::new();
        store.incr_with_expiry("c", 1, Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(store.ttl("c").await.unwrap(), Some(Duration::from_secs(15)));
        assert_eq!(store.ttl("missing").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(store.ttl("c").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_expired_keys_are_swept() {
        let store = MemoryKvStore::new();
        for i in 0..100 {
            let key = format!("ratelimit:daily:ip:{i}");
            store.incr_with_expiry(&key, 1, Duration::from_secs(5)).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.stored().await, 100);

        for _ in 0..SWEEP_INTERVAL {
            store.incr_with_expiry("hot", 1, Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(store.stored().await, 1);
        assert_eq!(store.get("hot").await.unwrap().as_deref(), Some("256"));
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(json!({"result": 3})).unwrap(), json!(3));
        assert_eq!(parse_reply(json!({"result": null})).unwrap(), Value::Null);
        assert!(matches!(
            parse_reply(json!({"error": "WRONGTYPE"})),
            Err(KvError::Protocol(msg)) if msg == "WRONGTYPE"
        ));
        assert!(parse_reply(json!([1, 2])).is_err());
    }
}
