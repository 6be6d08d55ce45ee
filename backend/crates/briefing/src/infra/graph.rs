//! Event graph collaborator
//!
//! Talks to the service that walks related events for a topic.

use serde_json::{Value, json};
use std::time::Duration;

use platform::config::{env_secs_or, env_string};

use crate::domain::repository::GraphBackend;
use crate::error::ToolError;

const DEFAULT_DEPTH: u64 = 2;
const MAX_DEPTH: u64 = 3;

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl GraphConfig {
    /// `None` without `GRAPH_API_URL`; graph traversal is then not offered
    pub fn from_env() -> Option<Self> {
        Some(Self {
            base_url: env_string("GRAPH_API_URL")?.trim_end_matches('/').to_string(),
            timeout: env_secs_or("TOOL_TIMEOUT_SECS", 20),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpGraphClient {
    client: reqwest::Client,
    config: GraphConfig,
}

impl HttpGraphClient {
    pub fn new(config: GraphConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

/// Requested depth, defaulted and clamped
pub fn traversal_depth(args: &Value) -> u64 {
    args.get("depth")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_DEPTH)
        .clamp(1, MAX_DEPTH)
}

impl GraphBackend for HttpGraphClient {
    async fn traverse(&self, topic: &str, args: &Value) -> Result<String, ToolError> {
        let depth = traversal_depth(args);
        let response = self
            .client
            .post(format!("{}/traverse", self.config.base_url))
            .json(&json!({ "topic": topic, "depth": depth }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout
                } else {
                    ToolError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;
        tracing::debug!(topic, depth, bytes = body.len(), "Graph traversal complete");

        if body.trim().is_empty() {
            Ok(format!("No related events found for \"{topic}\"."))
        } else {
            Ok(body)
        }
    }
}
