//! Tavily web search collaborator

use serde::Deserialize;
use serde_json::json;
use std::fmt::Write;
use std::time::Duration;

use platform::config::{env_or, env_secs_or, env_string};

use crate::domain::repository::SearchBackend;
use crate::error::ToolError;

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";
const MAX_SNIPPET_CHARS: usize = 600;

#[derive(Debug, Clone)]
pub struct TavilyConfig {
    pub api_key: String,
    pub endpoint: String,
    pub max_results: u32,
    pub timeout: Duration,
}

impl TavilyConfig {
    /// `None` without `TAVILY_API_KEY`; web search is then not offered
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: env_string("TAVILY_API_KEY")?,
            endpoint: env_string("TAVILY_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            max_results: env_or("TAVILY_MAX_RESULTS", 5),
            timeout: env_secs_or("TOOL_TIMEOUT_SECS", 20),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchReply {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct TavilySearchClient {
    client: reqwest::Client,
    config: TavilyConfig,
}

impl TavilySearchClient {
    pub fn new(config: TavilyConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }
}

impl SearchBackend for TavilySearchClient {
    async fn search(&self, query: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "query": query,
                "max_results": self.config.max_results,
                "search_depth": "basic",
                "include_answer": true,
            }))
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

        let reply: SearchReply = response
            .json()
            .await
            .map_err(|e| ToolError::Decode(e.to_string()))?;
        tracing::debug!(query, hits = reply.results.len(), "Web search complete");
        Ok(format_results(query, &reply))
    }
}

/// Readable digest of a search reply for the model
pub fn format_results(query: &str, reply: &SearchReply) -> String {
    if reply.results.is_empty() && reply.answer.is_none() {
        return format!("No results for \"{query}\".");
    }

    let mut out = String::new();
    if let Some(answer) = reply.answer.as_deref().filter(|a| !a.trim().is_empty()) {
        let _ = writeln!(out, "Summary: {}\n", answer.trim());
    }
    for (i, hit) in reply.results.iter().enumerate() {
        let snippet: String = hit.content.trim().chars().take(MAX_SNIPPET_CHARS).collect();
        let _ = writeln!(out, "[{}] {}\n{}\n{}\n", i + 1, hit.title.trim(), hit.url, snippet);
    }
    out.trim_end().to_string()
}
