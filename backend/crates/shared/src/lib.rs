//! Shared Kernel - Domain-crossing minimal core
//!
//! This crate contains the vocabulary every gateway crate agrees on:
//! - The unified error type and its HTTP JSON rendering
//! - Typed identifiers used for request correlation
//!
//! Only things with the same meaning in admission, rate limiting and
//! briefing belong here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
