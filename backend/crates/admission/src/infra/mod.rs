//! Infrastructure Layer
//!
//! Shared-store implementations of repository traits.

pub mod kv;
