//! Presentation Layer
//!
//! The streaming briefing endpoint.

pub mod dto;
pub mod handlers;
pub mod router;
