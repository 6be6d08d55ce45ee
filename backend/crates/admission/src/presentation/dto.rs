//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

use crate::application::issue_challenge::IssuedChallenge;
use crate::domain::value_objects::PowSolution;

/// Header carrying a session token outside of a JSON body
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Response for GET /api/pow/challenge
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge: String,
    pub difficulty: u32,
    pub expires_at_ms: i64,
}

impl From<IssuedChallenge> for ChallengeResponse {
    fn from(issued: IssuedChallenge) -> Self {
        Self {
            challenge: issued.challenge,
            difficulty: issued.difficulty.bits(),
            expires_at_ms: issued.expires_at_ms,
        }
    }
}

/// Response for GET /api/pow/status
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub passed: bool,
}

/// Solvers send the nonce either as a string or as a JSON number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NonceDto {
    Text(String),
    Number(u64),
}

/// `powSolution` field of a request body
#[derive(Debug, Clone, Deserialize)]
pub struct PowSolutionDto {
    pub challenge: String,
    pub nonce: NonceDto,
}

impl From<PowSolutionDto> for PowSolution {
    fn from(dto: PowSolutionDto) -> Self {
        let nonce = match dto.nonce {
            NonceDto::Text(s) => s,
            NonceDto::Number(n) => n.to_string(),
        };
        PowSolution::new(dto.challenge, nonce)
    }
}
