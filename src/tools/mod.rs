//! Pluggable tool system.
//!
//! Tools are async trait objects that the model can invoke during the agent
//! loop. Each tool publishes a name, a description and a JSON-schema
//! parameter spec, and executes against already-parsed JSON arguments.
//!
//! Tools with side effects never touch storage directly: they receive the one
//! narrow capability they need (see [`capabilities`]).

pub mod arxiv;
pub mod capabilities;
pub mod notes;
pub mod paper_search;
pub mod profile;
pub mod searxng;
pub mod tavily;
pub mod terms;

use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::types::{FunctionDefinition, ToolDefinition};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use capabilities::{
    NotesStore, PaperSection, ProfileSink, ProfileUpdate, SectionSearch, TermSink, TermUpdate,
};

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A tool that can be invoked by the model.
///
/// `execute` reports expected failures (bad input, unreachable upstream) as
/// [`ToolError`]; the agent treats any of them as fatal for the run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name matching what the model will call.
    fn name(&self) -> &'static str;

    /// Natural-language description embedded verbatim in the request.
    fn description(&self) -> &str;

    /// JSON Schema object for the arguments.
    fn parameters(&self) -> Value;

    /// OpenAI-format tool definition for inclusion in API requests.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters(),
            },
        }
    }

    /// Execute the tool with parsed JSON arguments and return text for the model.
    async fn execute(&self, args: &Value) -> Result<String, ToolError>;
}

// ---------------------------------------------------------------------------
// Tool registry
// ---------------------------------------------------------------------------

/// Ordered registry of available tools.
///
/// The agent sends all registered definitions to the API and dispatches tool
/// calls through here. Names are unique: registering a name again replaces
/// the earlier tool in place.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get tool definitions for the API request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Find a tool by name and execute it.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args).await
    }

    /// True if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Parse the raw `arguments` string of a tool call into a JSON object.
///
/// Blank arguments mean "no arguments". Anything that is not a JSON object
/// is rejected.
pub fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(err) => Err(ToolError::InvalidArguments(err.to_string())),
    }
}

/// Read a required, non-blank string argument.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("`{key}` is required")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Build a reqwest client for search tools.
pub(crate) fn search_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("papermate/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// First `max` chars of `text`, never splitting a character.
pub(crate) fn clip_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Collapse internal whitespace runs into single spaces.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tool sets
// ---------------------------------------------------------------------------

/// Web and academic search tools enabled by config.
///
/// arXiv needs no credentials; Tavily and SearXNG are registered only when
/// their key / base URL is configured.
pub fn default_search_tools(config: &ToolsConfig) -> ToolRegistry {
    let timeout = Duration::from_secs(config.search_timeout_secs.max(1));
    let mut registry = ToolRegistry::new();
    if config.arxiv_enabled {
        registry.register(arxiv::ArxivSearchTool::new(
            config.arxiv_max_results,
            config.arxiv_categories.clone(),
            timeout,
        ));
    }
    if let Some(key) = config.tavily_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        registry.register(tavily::TavilySearchTool::new(key.trim(), timeout));
    }
    if let Some(url) = config.searxng_url.as_deref().filter(|u| !u.trim().is_empty()) {
        registry.register(searxng::SearxngSearchTool::new(url.trim(), timeout));
    }
    registry
}

/// Capabilities a chat session may hand to its tools. Each one present adds
/// the matching tool.
#[derive(Clone, Default)]
pub struct ChatCapabilities {
    pub notes: Option<Arc<dyn NotesStore>>,
    pub sections: Option<Arc<dyn SectionSearch>>,
    /// Paper the session is about, used to scope section search first.
    pub paper_id: Option<String>,
    pub terms: Option<Arc<dyn TermSink>>,
    pub profile: Option<Arc<dyn ProfileSink>>,
}

/// The chat tool set: configured search tools plus capability-injected tools.
pub fn chat_tools(config: &ToolsConfig, caps: ChatCapabilities) -> ToolRegistry {
    let mut registry = default_search_tools(config);
    if let Some(notes) = caps.notes {
        registry.register(notes::ProjectMemoryTool::new(notes));
    }
    if let Some(sections) = caps.sections {
        registry.register(paper_search::PaperSectionSearchTool::new(
            sections,
            caps.paper_id,
        ));
    }
    if let Some(terms) = caps.terms {
        registry.register(terms::AddTermTool::new(terms));
    }
    if let Some(profile) = caps.profile {
        registry.register(profile::UpdateProfileTool::new(profile));
    }
    registry
}
