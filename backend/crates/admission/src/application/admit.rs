//! Admission Controller
//!
//! Decides whether a request may proceed:
//!
//! ```text
//! NO_CREDENTIAL -> (challenge) -> CHALLENGED -> (solve) -> VERIFIED
//!     -> (token) -> SESSION_ACTIVE -> (expiry) -> NO_CREDENTIAL
//! ```
//!
//! Every rejection carries a freshly issued challenge.

use std::sync::Arc;

use crate::application::check_session::CheckPowSessionUseCase;
use crate::application::config::AdmissionConfig;
use crate::application::issue_challenge::{IssueChallengeUseCase, IssuedChallenge};
use crate::application::verify_solution::{SolutionOutcome, VerifySolutionUseCase};
use crate::domain::repository::PowSessionRepository;
use crate::domain::value_objects::PowSolution;
use crate::error::{AdmissionError, AdmissionResult, RequiredReason};

/// Credentials presented with one request
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    pub session_token: Option<&'a str>,
    pub solution: Option<&'a PowSolution>,
    pub identity_key: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    /// An existing session token was accepted
    SessionActive,
    /// A PoW solution was verified and a token minted
    Verified,
}

/// A request that may proceed
#[derive(Debug, Clone)]
pub struct Admission {
    pub state: AdmissionState,
    /// Set when this request minted a token; must reach the client first
    pub minted_token: Option<String>,
}

pub struct AdmissionController<S>
where
    S: PowSessionRepository,
{
    sessions: Arc<S>,
    config: Arc<AdmissionConfig>,
}

impl<S> Clone for AdmissionController<S>
where
    S: PowSessionRepository,
{
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> AdmissionController<S>
where
    S: PowSessionRepository,
{
    pub fn new(sessions: Arc<S>, config: Arc<AdmissionConfig>) -> Self {
        Self { sessions, config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn issue_challenge(&self) -> IssuedChallenge {
        IssueChallengeUseCase::new(self.config.clone()).execute()
    }

    /// Whether `token` currently authorizes `identity_key`
    pub async fn session_valid(&self, token: &str, identity_key: &str) -> AdmissionResult<bool> {
        CheckPowSessionUseCase::new(self.sessions.clone(), self.config.clone())
            .check(token, identity_key)
            .await
    }

    /// A presented token is decisive: an invalid one is never rescued by
    /// a solution sent alongside it.
    pub async fn admit(&self, request: AdmissionRequest<'_>) -> AdmissionResult<Admission> {
        let token = request.session_token.filter(|t| !t.is_empty());

        if let Some(token) = token {
            if self.session_valid(token, request.identity_key).await? {
                return Ok(Admission {
                    state: AdmissionState::SessionActive,
                    minted_token: None,
                });
            }
            return Err(AdmissionError::Required {
                reason: RequiredReason::SessionExpired,
                challenge: self.issue_challenge(),
            });
        }

        if let Some(solution) = request.solution {
            let outcome = VerifySolutionUseCase::new(self.sessions.clone(), self.config.clone())
                .execute(solution, request.identity_key)
                .await?;
            return match outcome {
                SolutionOutcome::Verified { session_token, .. } => Ok(Admission {
                    state: AdmissionState::Verified,
                    minted_token: Some(session_token),
                }),
                // brute-force attempts are not counted, only logged
                SolutionOutcome::Rejected(_) => Err(AdmissionError::Invalid {
                    challenge: self.issue_challenge(),
                }),
            };
        }

        Err(AdmissionError::Required {
            reason: RequiredReason::NoCredential,
            challenge: self.issue_challenge(),
        })
    }
}
