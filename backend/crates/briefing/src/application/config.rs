//! Briefing Configuration

use platform::config::{env_or, env_secs_or};
use std::time::Duration;

/// Input size limits enforced before any cost is incurred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_question_chars: usize,
    pub max_history_turns: usize,
    pub max_history_message_chars: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_question_chars: 1000,
            max_history_turns: 20,
            max_history_message_chars: 4000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BriefingConfig {
    /// Hard ceiling on model round-trips per question
    pub max_iterations: u32,
    /// Hard ceiling on web searches per question
    pub max_web_searches: u32,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub limits: ValidationLimits,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            max_web_searches: 3,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(20),
            limits: ValidationLimits::default(),
        }
    }
}

impl BriefingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limits = ValidationLimits {
            max_question_chars: env_or("MAX_QUESTION_CHARS", defaults.limits.max_question_chars),
            max_history_turns: env_or("MAX_HISTORY_TURNS", defaults.limits.max_history_turns),
            max_history_message_chars: env_or(
                "MAX_HISTORY_MESSAGE_CHARS",
                defaults.limits.max_history_message_chars,
            ),
        };

        Self {
            max_iterations: env_or("MAX_ITERATIONS", defaults.max_iterations).max(1),
            max_web_searches: env_or("MAX_WEB_SEARCHES", defaults.max_web_searches),
            model_timeout: env_secs_or("MODEL_TIMEOUT_SECS", defaults.model_timeout.as_secs()),
            tool_timeout: env_secs_or("TOOL_TIMEOUT_SECS", defaults.tool_timeout.as_secs()),
            limits,
        }
    }
}
