//! Domain Value Objects
//!
//! Immutable value types for the admission domain.

use std::fmt;

/// Required number of leading zero bits in a PoW digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difficulty(u32);

impl Difficulty {
    pub const DEFAULT: Difficulty = Difficulty(16);
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 32; // Max practical difficulty for a browser solver

    pub fn new(bits: u32) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&bits) {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Difficulty> for u32 {
    fn from(d: Difficulty) -> Self {
        d.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-submitted answer to a challenge.
///
/// The nonce is kept as the exact string the client hashed; `"07"` and
/// `"7"` are different solutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowSolution {
    pub challenge: String,
    pub nonce: String,
}

impl PowSolution {
    pub fn new(challenge: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            challenge: challenge.into(),
            nonce: nonce.into(),
        }
    }
}
