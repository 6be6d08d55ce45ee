//! Input Validator
//!
//! Pure: turns an [`UncheckedBriefing`] into a [`BriefingRequest`] or the
//! first problem found.

use crate::application::config::ValidationLimits;
use crate::domain::conversation::{
    BriefingContext, BriefingRequest, HistoryMessage, Role, UncheckedBriefing,
};
use crate::error::ValidationError;

pub fn validate(
    input: UncheckedBriefing,
    limits: &ValidationLimits,
) -> Result<BriefingRequest, ValidationError> {
    let id = required(input.id, "id")?;
    let title = required(input.title, "title")?;
    let question = required(input.question, "question")?;

    if question.chars().count() > limits.max_question_chars {
        return Err(ValidationError::QuestionTooLong {
            max: limits.max_question_chars,
        });
    }

    if input.history.len() > limits.max_history_turns {
        return Err(ValidationError::TooManyTurns {
            max: limits.max_history_turns,
        });
    }

    let mut history = Vec::with_capacity(input.history.len());
    for (index, (role, content)) in input.history.into_iter().enumerate() {
        let Some(role) = Role::parse(&role) else {
            return Err(ValidationError::UnknownRole { index, role });
        };
        if content.chars().count() > limits.max_history_message_chars {
            return Err(ValidationError::MessageTooLong {
                index,
                max: limits.max_history_message_chars,
            });
        }
        history.push(HistoryMessage { role, content });
    }

    Ok(BriefingRequest {
        context: BriefingContext {
            id,
            title,
            summary: input.summary.unwrap_or_default(),
            category: input.category.unwrap_or_default(),
            location: input.location.unwrap_or_default(),
        },
        question,
        history,
    })
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}
