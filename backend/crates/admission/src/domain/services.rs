//! Domain Services
//!
//! Pure domain logic for PoW verification and challenge signing.

use platform::crypto::{constant_time_eq, hmac_sha256};
use sha2::{Digest, Sha256};

use crate::domain::entities::Challenge;
use crate::domain::value_objects::Difficulty;

/// Count leading zero bits in a digest
pub fn count_leading_zero_bits(hash: &[u8]) -> u32 {
    let mut count = 0u32;
    for &byte in hash {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Verify that a hash meets the difficulty requirement
pub fn verify_difficulty(hash: &[u8; 32], difficulty_bits: u32) -> bool {
    count_leading_zero_bits(hash) >= difficulty_bits
}

/// SHA-256 of the challenge string immediately followed by the nonce string
pub fn compute_pow_hash(challenge: &str, nonce: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.finalize().into()
}

/// Verify a PoW solution
pub fn verify_pow(challenge: &str, nonce: &str, difficulty: Difficulty) -> bool {
    let hash = compute_pow_hash(challenge, nonce);
    verify_difficulty(&hash, difficulty.bits())
}

/// Brute-force a decimal nonce, the same search a client runs.
pub fn solve_pow(challenge: &str, difficulty: Difficulty, max_attempts: u64) -> Option<String> {
    (0..max_attempts)
        .map(|n| n.to_string())
        .find(|nonce| verify_pow(challenge, nonce, difficulty))
}

/// Hex HMAC over `<salt>.<issued_at_ms>`
pub fn sign_challenge(secret: &[u8], salt: &str, issued_at_ms: i64) -> String {
    hex::encode(hmac_sha256(secret, format!("{salt}.{issued_at_ms}").as_bytes()))
}

/// Check that `challenge` was signed with `secret`
pub fn verify_challenge_signature(secret: &[u8], challenge: &Challenge) -> bool {
    let Ok(provided) = hex::decode(&challenge.signature) else {
        return false;
    };
    let expected = hmac_sha256(secret, challenge.signed_payload().as_bytes());
    constant_time_eq(&provided, &expected)
}
