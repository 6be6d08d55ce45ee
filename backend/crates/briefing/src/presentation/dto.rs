//! API DTOs

use admission::{PowSolution, PowSolutionDto};
use serde::Deserialize;

use crate::domain::conversation::UncheckedBriefing;

/// Event ids arrive as strings or numbers depending on the source feed
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventIdDto {
    Text(String),
    Number(i64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessageDto {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Body of POST /api/briefing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefingRequestDto {
    pub id: Option<EventIdDto>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub question: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessageDto>,
    pub session_token: Option<String>,
    pub pow_solution: Option<PowSolutionDto>,
}

/// Credentials split from the briefing content
pub struct Credentials {
    pub session_token: Option<String>,
    pub solution: Option<PowSolution>,
}

impl BriefingRequestDto {
    pub fn into_parts(self) -> (Credentials, UncheckedBriefing) {
        let credentials = Credentials {
            session_token: self
                .session_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            solution: self.pow_solution.map(PowSolution::from),
        };
        let unchecked = UncheckedBriefing {
            id: self.id.map(|id| match id {
                EventIdDto::Text(s) => s,
                EventIdDto::Number(n) => n.to_string(),
            }),
            title: self.title,
            summary: self.summary,
            category: self.category,
            location: self.location,
            question: self.question,
            history: self
                .history
                .into_iter()
                .map(|m| (m.role, m.content))
                .collect(),
        };
        (credentials, unchecked)
    }
}
