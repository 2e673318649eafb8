//! Configuration data model.
//!
//! Struct definitions plus default values. Loader and precedence logic stays
//! in `config::mod`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::*;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub agent: AgentConfig,
    pub chat: ChatConfig,
    pub tools: ToolsConfig,
    pub progress: ProgressConfig,
}

/// `[api]`: connection settings for the chat-completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Inline key. Empty means "look up `api_key_env`".
    pub api_key: String,
    pub api_key_env: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            api_key: String::new(),
            api_key_env: Some(DEFAULT_API_KEY_ENV.into()),
            model: DEFAULT_MODEL_ID.into(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// `[agent]`: buffered ReAct loop limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub temperature: f64,
    /// Tool output is cut to this many chars before entering the conversation.
    pub tool_output_limit: usize,
    /// Only the most recent N tool messages are re-sent each round.
    pub max_tool_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_AGENT_MAX_STEPS,
            temperature: DEFAULT_AGENT_TEMPERATURE,
            tool_output_limit: DEFAULT_TOOL_OUTPUT_LIMIT,
            max_tool_messages: DEFAULT_MAX_TOOL_MESSAGES,
        }
    }
}

/// User-facing language of degraded messages and injected prompts.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Zh,
    En,
}

/// `[chat]`: streaming session settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub max_tool_rounds: usize,
    pub temperature: f64,
    pub stream_timeout_secs: u64,
    pub locale: Locale,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_CHAT_MAX_TOOL_ROUNDS,
            temperature: DEFAULT_CHAT_TEMPERATURE,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            locale: Locale::default(),
        }
    }
}

/// `[tools]`: which search backends are available and how they are reached.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub arxiv_enabled: bool,
    pub arxiv_max_results: usize,
    /// Optional arXiv categories (e.g. `cs.CL`) OR-ed into every query.
    pub arxiv_categories: Vec<String>,
    /// Tavily is registered only when a key is present.
    pub tavily_api_key: Option<String>,
    /// SearXNG is registered only when a base URL is present.
    pub searxng_url: Option<String>,
    pub search_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            arxiv_enabled: true,
            arxiv_max_results: DEFAULT_ARXIV_MAX_RESULTS,
            arxiv_categories: Vec::new(),
            tavily_api_key: None,
            searxng_url: None,
            search_timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
        }
    }
}

/// `[progress]`: per-job queue sizing and consumer keepalive cadence.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    pub queue_capacity: usize,
    pub poll_timeout_secs: u64,
}

impl ProgressConfig {
    /// How long a frame stream waits for an event before a keepalive.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.max(1))
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}
