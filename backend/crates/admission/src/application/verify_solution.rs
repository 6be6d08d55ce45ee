//! Verify Solution Use Case

use chrono::Utc;
use kernel::id::PowSessionId;
use std::sync::Arc;

use crate::application::config::AdmissionConfig;
use crate::domain::entities::{Challenge, PowSession};
use crate::domain::repository::PowSessionRepository;
use crate::domain::services::{verify_challenge_signature, verify_pow};
use crate::domain::value_objects::PowSolution;
use crate::error::AdmissionResult;

/// Prefix of every session token
pub const SESSION_TOKEN_PREFIX: &str = "tok_";

/// Longest nonce worth hashing
const MAX_NONCE_LEN: usize = 64;

/// Tolerated clock skew between replicas signing challenges
const FUTURE_SKEW_MS: i64 = 5_000;

/// Why a solution was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Malformed,
    BadSignature,
    Expired,
    InsufficientWork,
}

/// Output of verification
#[derive(Debug, Clone)]
pub enum SolutionOutcome {
    Verified {
        session_id: PowSessionId,
        session_token: String,
    },
    Rejected(RejectReason),
}

/// Verify Solution Use Case
pub struct VerifySolutionUseCase<S>
where
    S: PowSessionRepository,
{
    pow_session_repo: Arc<S>,
    config: Arc<AdmissionConfig>,
}

impl<S> VerifySolutionUseCase<S>
where
    S: PowSessionRepository,
{
    pub fn new(pow_session_repo: Arc<S>, config: Arc<AdmissionConfig>) -> Self {
        Self {
            pow_session_repo,
            config,
        }
    }

    /// Verify `solution` and, on success, mint a session bound to `identity_key`.
    pub async fn execute(
        &self,
        solution: &PowSolution,
        identity_key: &str,
    ) -> AdmissionResult<SolutionOutcome> {
        if let Err(reason) = self.check(solution) {
            tracing::warn!(?reason, "PoW solution rejected");
            return Ok(SolutionOutcome::Rejected(reason));
        }

        let pow_session = PowSession::new(identity_key);
        self.pow_session_repo
            .create(&pow_session, self.config.session_ttl)
            .await?;

        let token = create_session_token(&pow_session.id, &self.config.session_secret);

        tracing::info!(
            pow_session_id = %pow_session.id,
            "PoW verification successful"
        );

        Ok(SolutionOutcome::Verified {
            session_id: pow_session.id,
            session_token: token,
        })
    }

    /// Pure checks, cheapest first so forged challenges cost one HMAC.
    fn check(&self, solution: &PowSolution) -> Result<(), RejectReason> {
        if solution.nonce.is_empty() || solution.nonce.len() > MAX_NONCE_LEN {
            return Err(RejectReason::Malformed);
        }
        let challenge = Challenge::parse(&solution.challenge).ok_or(RejectReason::Malformed)?;

        if !verify_challenge_signature(&self.config.session_secret, &challenge) {
            return Err(RejectReason::BadSignature);
        }

        let now_ms = Utc::now().timestamp_millis();
        if challenge.is_expired(now_ms, self.config.challenge_ttl_ms())
            || challenge.is_from_future(now_ms, FUTURE_SKEW_MS)
        {
            return Err(RejectReason::Expired);
        }

        if !verify_pow(&solution.challenge, &solution.nonce, self.config.difficulty) {
            return Err(RejectReason::InsufficientWork);
        }

        Ok(())
    }
}

/// Create a signed session token: `tok_` + base64url(id || hmac(id))
pub fn create_session_token(pow_session_id: &PowSessionId, secret: &[u8; 32]) -> String {
    let id_bytes = pow_session_id.as_bytes();
    let signature = platform::crypto::hmac_sha256(secret, id_bytes);
    let mut token_data = Vec::with_capacity(16 + 32);
    token_data.extend_from_slice(id_bytes);
    token_data.extend_from_slice(&signature);
    format!(
        "{SESSION_TOKEN_PREFIX}{}",
        platform::crypto::to_base64url(&token_data)
    )
}
