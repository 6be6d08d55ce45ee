//! Check Session Use Case

use kernel::id::PowSessionId;
use std::sync::Arc;

use crate::application::config::AdmissionConfig;
use crate::application::verify_solution::SESSION_TOKEN_PREFIX;
use crate::domain::repository::PowSessionRepository;
use crate::error::AdmissionResult;

/// Check Pow Session Use Case
pub struct CheckPowSessionUseCase<S>
where
    S: PowSessionRepository,
{
    pow_session_repo: Arc<S>,
    config: Arc<AdmissionConfig>,
}

impl<S> CheckPowSessionUseCase<S>
where
    S: PowSessionRepository,
{
    pub fn new(pow_session_repo: Arc<S>, config: Arc<AdmissionConfig>) -> Self {
        Self {
            pow_session_repo,
            config,
        }
    }

    /// Check if a session token is valid for `identity_key`.
    ///
    /// Forged tokens are rejected before touching the store; store errors
    /// are returned, not treated as "invalid".
    pub async fn check(&self, token: &str, identity_key: &str) -> AdmissionResult<bool> {
        let pow_session_id = match verify_session_token(token, &self.config.session_secret) {
            Some(id) => id,
            None => {
                tracing::debug!("Session token failed signature check");
                return Ok(false);
            }
        };

        Ok(self
            .pow_session_repo
            .get(pow_session_id, identity_key)
            .await?
            .is_some())
    }
}

/// Verify and extract pow session ID from signed token
pub fn verify_session_token(token: &str, secret: &[u8; 32]) -> Option<PowSessionId> {
    let encoded = token.strip_prefix(SESSION_TOKEN_PREFIX)?;
    let token_data = platform::crypto::from_base64url(encoded).ok()?;
    if token_data.len() != 48 {
        // 16 (UUID) + 32 (HMAC)
        return None;
    }

    let id_bytes: [u8; 16] = token_data[0..16].try_into().ok()?;
    let provided_signature: &[u8] = &token_data[16..48];

    let expected_signature = platform::crypto::hmac_sha256(secret, &id_bytes);

    // Constant-time comparison
    if !platform::crypto::constant_time_eq(provided_signature, &expected_signature) {
        return None;
    }

    Some(PowSessionId::from_bytes(id_bytes))
}
