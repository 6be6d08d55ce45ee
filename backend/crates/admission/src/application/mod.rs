//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations.

pub mod admit;
pub mod check_session;
pub mod config;
pub mod issue_challenge;
pub mod verify_solution;
