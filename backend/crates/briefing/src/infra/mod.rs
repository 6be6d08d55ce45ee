pub mod gemini;
pub mod graph;
pub mod tavily;
pub mod usage;

pub use gemini::{GeminiClient, GeminiConfig};
pub use graph::{GraphConfig, HttpGraphClient};
pub use tavily::{TavilyConfig, TavilySearchClient};
pub use usage::KvUsageRecorder;
