//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, HMAC, Base64, hex)
//! - Client identity resolution (hashed IP or trusted user header)
//! - The shared key-value store (in-memory and Upstash REST)
//! - Global and per-identity rate limiting over that store
//! - Environment configuration helpers

pub mod client;
pub mod config;
pub mod crypto;
pub mod kv;
pub mod rate_limit;
