//! Key-Value Store Repository Implementations

use chrono::{DateTime, TimeZone, Utc};
use kernel::id::PowSessionId;
use platform::kv::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::entities::PowSession;
use crate::domain::repository::PowSessionRepository;
use crate::error::{AdmissionError, AdmissionResult};

const SESSION_KEY_PREFIX: &str = "pow_session:";

/// Stored value of a session
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    identity: String,
    created_at_ms: i64,
}

/// Sessions in the shared store; expiry is the store's TTL.
pub struct KvPowSessionRepository<K>
where
    K: KvStore,
{
    store: Arc<K>,
}

impl<K> Clone for KvPowSessionRepository<K>
where
    K: KvStore,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K> KvPowSessionRepository<K>
where
    K: KvStore,
{
    pub fn new(store: Arc<K>) -> Self {
        Self { store }
    }

    fn key(id: &PowSessionId) -> String {
        format!("{SESSION_KEY_PREFIX}{}", id.simple())
    }
}

impl<K> PowSessionRepository for KvPowSessionRepository<K>
where
    K: KvStore + Sync,
{
    async fn create(&self, pow_session: &PowSession, ttl: Duration) -> AdmissionResult<()> {
        let record = SessionRecord {
            identity: pow_session.identity_key.clone(),
            created_at_ms: pow_session.created_at.timestamp_millis(),
        };
        let value =
            serde_json::to_string(&record).map_err(|e| AdmissionError::Internal(e.to_string()))?;

        self.store
            .set_ex(&Self::key(&pow_session.id), &value, ttl)
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        pow_session_id: PowSessionId,
        identity_key: &str,
    ) -> AdmissionResult<Option<PowSession>> {
        let Some(raw) = self.store.get(&Self::key(&pow_session_id)).await? else {
            return Ok(None);
        };

        let record: SessionRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    pow_session_id = %pow_session_id,
                    error = %e,
                    "Unreadable session record"
                );
                return Ok(None);
            }
        };

        if record.identity != identity_key {
            tracing::warn!(
                pow_session_id = %pow_session_id,
                "Session token presented by a different identity"
            );
            return Ok(None);
        }

        let created_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(record.created_at_ms)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(Some(PowSession {
            id: pow_session_id,
            identity_key: record.identity,
            created_at,
        }))
    }

    async fn delete(&self, pow_session_id: PowSessionId) -> AdmissionResult<()> {
        self.store.del(&Self::key(&pow_session_id)).await?;
        Ok(())
    }
}
