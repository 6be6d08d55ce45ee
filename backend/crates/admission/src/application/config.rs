//! Application Configuration
//!
//! Configuration for the admission application layer.

use platform::config::{env_or, env_secs_or};
use std::time::Duration;

use crate::domain::value_objects::Difficulty;

/// Admission application configuration
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Random bytes in a challenge salt
    pub challenge_salt_len: usize,
    /// Difficulty in leading zero bits, fixed server-side
    pub difficulty: Difficulty,
    /// How long an issued challenge may be solved
    pub challenge_ttl: Duration,
    /// Session TTL
    pub session_ttl: Duration,
    /// Secret for challenge and session token HMACs (32 bytes)
    pub session_secret: [u8; 32],
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            challenge_salt_len: 16,
            difficulty: Difficulty::DEFAULT,
            challenge_ttl: Duration::from_secs(300),
            session_ttl: Duration::from_secs(3600),
            session_secret: [0u8; 32],
        }
    }
}

impl AdmissionConfig {
    /// Create config with a random session secret (for development)
    pub fn with_random_secret() -> Self {
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&platform::crypto::random_bytes(32));
        Self {
            session_secret: secret,
            ..Default::default()
        }
    }

    /// Read the numeric knobs from the environment; the secret is supplied
    /// by the caller.
    pub fn from_env(session_secret: [u8; 32]) -> Self {
        let defaults = Self::default();
        let bits = env_or("POW_DIFFICULTY_BITS", defaults.difficulty.bits());
        let difficulty = Difficulty::new(bits).unwrap_or_else(|| {
            tracing::warn!(bits, "POW_DIFFICULTY_BITS out of range, using default");
            defaults.difficulty
        });

        Self {
            difficulty,
            challenge_ttl: env_secs_or("POW_CHALLENGE_TTL_SECS", defaults.challenge_ttl.as_secs()),
            session_ttl: env_secs_or("SESSION_TTL_SECS", defaults.session_ttl.as_secs()),
            session_secret,
            ..defaults
        }
    }

    pub fn challenge_ttl_ms(&self) -> i64 {
        self.challenge_ttl.as_millis() as i64
    }
}
