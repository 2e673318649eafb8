//! Default configuration constants.
//!
//! These are the documented fallbacks used when neither the config file nor
//! the environment supplies a value.

/// Default OpenAI-compatible API base URL.
pub(super) const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
/// Default provider model ID.
pub(super) const DEFAULT_MODEL_ID: &str = "gpt-4o";
/// Env var consulted for the API key when none is configured inline.
pub(super) const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Default timeout for buffered completion requests.
pub(super) const DEFAULT_API_TIMEOUT_SECS: u64 = 60;
/// Default number of attempts for connection errors and 429 responses.
pub(super) const DEFAULT_MAX_RETRIES: u32 = 5;

pub(super) const DEFAULT_AGENT_MAX_STEPS: usize = 6;
pub(super) const DEFAULT_AGENT_TEMPERATURE: f64 = 0.2;
pub(super) const DEFAULT_TOOL_OUTPUT_LIMIT: usize = 4000;
pub(super) const DEFAULT_MAX_TOOL_MESSAGES: usize = 8;

pub(super) const DEFAULT_CHAT_MAX_TOOL_ROUNDS: usize = 10;
pub(super) const DEFAULT_CHAT_TEMPERATURE: f64 = 0.7;
/// Streamed chat rounds get a longer ceiling for reasoning-heavy models.
pub(super) const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 300;

pub(super) const DEFAULT_ARXIV_MAX_RESULTS: usize = 5;
pub(super) const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;

pub(super) const DEFAULT_QUEUE_CAPACITY: usize = 500;
pub(super) const DEFAULT_POLL_TIMEOUT_SECS: u64 = 15;

/// Config file name looked up in the working directory and config root.
pub(super) const CONFIG_FILE_NAME: &str = "papermate.toml";
pub(super) const CONFIG_DIR_NAME: &str = "papermate";
