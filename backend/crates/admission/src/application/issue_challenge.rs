//! Issue Challenge Use Case

use chrono::Utc;
use platform::crypto::random_hex;
use std::sync::Arc;

use crate::application::config::AdmissionConfig;
use crate::domain::entities::Challenge;
use crate::domain::services::sign_challenge;
use crate::domain::value_objects::Difficulty;

/// A challenge as handed to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub challenge: String,
    pub difficulty: Difficulty,
    pub expires_at_ms: i64,
}

/// Issue Challenge Use Case
///
/// Stateless: nothing is written anywhere, so this never fails.
pub struct IssueChallengeUseCase {
    config: Arc<AdmissionConfig>,
}

impl IssueChallengeUseCase {
    pub fn new(config: Arc<AdmissionConfig>) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> IssuedChallenge {
        let salt = random_hex(self.config.challenge_salt_len);
        let issued_at_ms = Utc::now().timestamp_millis();
        let signature = sign_challenge(&self.config.session_secret, &salt, issued_at_ms);
        let challenge = Challenge {
            salt,
            issued_at_ms,
            signature,
        };

        tracing::debug!(
            difficulty = %self.config.difficulty,
            "Issued challenge"
        );

        IssuedChallenge {
            challenge: challenge.to_string(),
            difficulty: self.config.difficulty,
            expires_at_ms: issued_at_ms + self.config.challenge_ttl_ms(),
        }
    }
}
