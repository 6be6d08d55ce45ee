//! Application Layer - Use Cases
//!
//! Validation, tool dispatch, the agent loop and the stream driver.

pub mod config;
pub mod dispatch;
pub mod orchestrator;
pub mod prompt;
pub mod stream;
pub mod usage;
pub mod validate;
