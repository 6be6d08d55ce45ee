//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (Challenge, PowSession)
//! - Domain value objects (Difficulty, PowSolution)
//! - Domain services (PoW digest and challenge signing)
//! - Repository traits (interfaces)

pub mod entities;
pub mod repository;
pub mod services;
pub mod value_objects;
