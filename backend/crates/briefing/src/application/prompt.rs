//! System instructions and initial conversation

use chrono::NaiveDate;

use crate::domain::conversation::{BriefingContext, BriefingRequest, Turn};

/// Instructions for one request: role, event context and today's date
pub fn system_instructions(context: &BriefingContext, today: NaiveDate) -> String {
    let mut prompt = String::from(
        "You are a news analyst writing short, factual briefings about a single world event \
         for a general audience. Answer the user's question about the event below.\n\
         Ground every claim in the event context or in tool results. If something is \
         uncertain, say so. Use web_search only for information the context lacks, and \
         prefer a few precise queries over many broad ones. Keep answers under 250 words \
         unless the user asks for more.\n\n",
    );

    prompt.push_str(&format!("Today's date (UTC): {}\n\n", today.format("%Y-%m-%d")));
    prompt.push_str("Event context:\n");
    prompt.push_str(&format!("- Title: {}\n", context.title));
    for (label, value) in [
        ("Summary", &context.summary),
        ("Category", &context.category),
        ("Location", &context.location),
    ] {
        if !value.is_empty() {
            prompt.push_str(&format!("- {label}: {value}\n"));
        }
    }
    prompt
}

/// Prior history followed by the new question
pub fn initial_turns(request: &BriefingRequest) -> Vec<Turn> {
    request
        .history
        .iter()
        .map(Turn::from_history)
        .chain(std::iter::once(Turn::user(request.question.clone())))
        .collect()
}
