//! Repository Traits
//!
//! Interfaces for session persistence. Implementation is in infrastructure layer.

use crate::domain::entities::PowSession;
use crate::error::AdmissionResult;
use kernel::id::PowSessionId;
use std::time::Duration;

/// PowSession repository trait
#[trait_variant::make(PowSessionRepository: Send)]
pub trait LocalPowSessionRepository {
    /// Persist a session that expires after `ttl`
    async fn create(&self, pow_session: &PowSession, ttl: Duration) -> AdmissionResult<()>;

    /// Get a live pow session bound to `identity_key`
    async fn get(
        &self,
        pow_session_id: PowSessionId,
        identity_key: &str,
    ) -> AdmissionResult<Option<PowSession>>;

    /// Delete a pow session
    async fn delete(&self, pow_session_id: PowSessionId) -> AdmissionResult<()>;
}
