//! Gemini `generateContent` client
//!
//! Request building and response parsing are plain functions over JSON so
//! they can be tested without a network.

use serde_json::{Map, Value, json};
use std::time::Duration;

use platform::config::{env_secs_or, env_string};

use crate::domain::conversation::{
    ModelRequest, ModelResponse, Part, TokenUsage, Turn, TurnRole,
};
use crate::domain::repository::ModelBackend;
use crate::domain::tool::{ToolCall, ToolSpec};
use crate::error::ModelError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// `None` without `GEMINI_API_KEY`
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: env_string("GEMINI_API_KEY")?,
            model: env_string("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env_string("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: env_secs_or("MODEL_TIMEOUT_SECS", 60),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::Transport(format!("client build failed: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl ModelBackend for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let body = build_request(request);

        let response = self
            .client
            .post(self.config.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(format!("reading body: {e}")))?;

        if !status.is_success() {
            let message: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(ModelError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ModelError::Decode(e.to_string()))?;
        let parsed = parse_response(&value)?;

        tracing::debug!(
            model = %self.config.model,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            tool_calls = parsed.turn.tool_calls().len(),
            "Model call complete"
        );
        Ok(parsed)
    }
}

/// Request body for `generateContent`
pub fn build_request(request: &ModelRequest) -> Value {
    let mut body = Map::new();
    body.insert(
        "systemInstruction".to_string(),
        json!({ "parts": [{ "text": request.system }] }),
    );
    body.insert(
        "contents".to_string(),
        Value::Array(request.turns.iter().map(turn_to_content).collect()),
    );
    if !request.tools.is_empty() {
        let declarations: Vec<Value> = request.tools.iter().map(declaration).collect();
        body.insert(
            "tools".to_string(),
            json!([{ "functionDeclarations": declarations }]),
        );
    }
    Value::Object(body)
}

fn declaration(spec: &ToolSpec) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "parameters": spec.parameters,
    })
}

fn turn_to_content(turn: &Turn) -> Value {
    // model turns carry thought signatures that must come back untouched
    if let Some(raw) = &turn.raw {
        return raw.clone();
    }

    let role = match turn.role {
        TurnRole::Model => "model",
        TurnRole::User | TurnRole::Tool => "user",
    };
    let parts: Vec<Value> = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::ToolCall(call) => json!({
                "functionCall": { "name": call.name, "args": call.args }
            }),
            Part::ToolResult { name, content, .. } => json!({
                "functionResponse": {
                    "name": name,
                    "response": { "content": content }
                }
            }),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

/// Parse a `generateContent` response into a model turn
pub fn parse_response(value: &Value) -> Result<ModelResponse, ModelError> {
    let usage = value
        .get("usageMetadata")
        .map(|meta| TokenUsage {
            input_tokens: meta
                .get("promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: meta
                .get("candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
        .unwrap_or_default();

    let Some(candidate) = value
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        let reason = value
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        return Err(ModelError::Empty(reason.to_string()));
    };

    let Some(content) = candidate.get("content") else {
        let reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("no content");
        return Err(ModelError::Empty(reason.to_string()));
    };

    let mut parts = Vec::new();
    let mut call_index = 0usize;
    for part in content
        .get("parts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ModelError::Decode("functionCall without name".to_string()))?;
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{call_index}"));
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            call_index += 1;
            parts.push(Part::ToolCall(ToolCall::new(id, name, args)));
        } else if part.get("thought").and_then(Value::as_bool) == Some(true) {
            continue;
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            parts.push(Part::Text(text.to_string()));
        }
    }

    Ok(ModelResponse {
        turn: Turn {
            role: TurnRole::Model,
            parts,
            raw: Some(content.clone()),
        },
        usage,
    })
}
