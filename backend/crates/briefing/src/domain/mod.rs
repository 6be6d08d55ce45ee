//! Domain Layer
//!
//! - Conversation model (turns, parts, briefing context)
//! - Tool kinds and the per-iteration available tool set
//! - Stream events and their wire framing
//! - Collaborator traits (model, search, graph, tool executor, usage)

pub mod conversation;
pub mod repository;
pub mod stream;
pub mod tool;
