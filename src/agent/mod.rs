//! Core agentic loop.
//!
//! The [`Agent`] drives one buffered ReAct run: it sends the conversation to
//! the model, executes any requested tools and re-submits their results, and
//! loops until the model produces a final text answer or the round cap is
//! reached. Empty answers are retried with a corrective prompt a bounded
//! number of times before the run degrades to an answer assembled from the
//! tool results it already has.

use crate::api::ModelClient;
use crate::config::{Config, Locale};
use crate::error::{AgentError, ApiError};
use crate::tools::ToolRegistry;
use crate::types::Message;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod adapter;
pub mod assembler;
pub(crate) mod dispatch;
pub mod events;
pub mod extract;
pub mod fallback;
pub mod history;
pub mod retry;

pub use adapter::{Completion, CompletionAdapter};
pub use events::{ProgressSink, ToolActivity, ToolStatus};
pub use history::Conversation;
pub use retry::RetryPolicy;

use dispatch::ToolDispatcher;
use fallback::{empty_content_reason, empty_retry_prompt, fallback_from_tools, generic_failure};

/// Corrective re-prompts allowed after an empty answer.
pub const MAX_EMPTY_CONTENT_RETRIES: usize = 2;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model produced a final answer.
    Succeeded(String),
    /// The loop gave up but the model still said something: the toolless
    /// safety-net reply or the last assistant content.
    Degraded(String),
    /// No model answer; a canned notice built from tool outputs or the
    /// generic failure message, fit for showing to a user only.
    Fallback(String),
    /// Nothing usable was produced.
    Failed,
}

impl RunOutcome {
    /// Displayable text; empty for [`RunOutcome::Failed`].
    pub fn text(&self) -> &str {
        match self {
            Self::Succeeded(text) | Self::Degraded(text) | Self::Fallback(text) => text,
            Self::Failed => "",
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Succeeded(text) | Self::Degraded(text) | Self::Fallback(text) => text,
            Self::Failed => String::new(),
        }
    }

    /// Text the model itself produced; empty for canned fallbacks.
    pub fn into_answer(self) -> String {
        match self {
            Self::Succeeded(text) | Self::Degraded(text) => text,
            Self::Fallback(_) | Self::Failed => String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// A finished run together with the conversation it produced.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: RunOutcome,
    pub messages: Vec<Message>,
}

/// Per-run limits and sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    /// Upper bound on completion rounds.
    pub max_steps: usize,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Tool output is cut to this many chars before entering the conversation.
    pub tool_output_limit: usize,
    /// Older tool rounds are dropped once more tool messages than this exist.
    pub max_tool_messages: usize,
    /// Never send tool definitions.
    pub disable_tools: bool,
    pub retry: RetryPolicy,
    pub locale: Locale,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.agent.max_steps,
            temperature: config.agent.temperature,
            max_tokens: None,
            tool_output_limit: config.agent.tool_output_limit,
            max_tool_messages: config.agent.max_tool_messages,
            disable_tools: false,
            retry: RetryPolicy::with_max_attempts(config.api.max_retries),
            locale: config.chat.locale,
        }
    }
}

/// Why the round loop stopped without a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// The last round still asked for tools.
    ToolsPending,
    /// Empty answers used up the corrective retries (or the rounds).
    Empty,
    /// Transient failures used up the retry budget.
    NoCompletion,
}

/// Buffered tool-calling agent.
pub struct Agent {
    client: Arc<dyn ModelClient>,
    model: String,
    tools: ToolRegistry,
    options: AgentOptions,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl Agent {
    pub fn new(
        client: Arc<dyn ModelClient>,
        model: impl Into<String>,
        tools: ToolRegistry,
        options: AgentOptions,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            tools,
            options,
            progress: None,
        }
    }

    /// Report tool lifecycle events to `sink`.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Names of the tools offered to the model, empty when tools are off.
    pub fn tool_names(&self) -> Vec<&'static str> {
        if self.options.disable_tools {
            return Vec::new();
        }
        self.tools.names()
    }

    /// Run the loop for one system/user prompt pair.
    pub async fn run(&self, system: &str, user: &str) -> Result<RunOutcome, AgentError> {
        Ok(self.run_traced(system, user).await?.outcome)
    }

    /// Like [`Agent::run`], also returning the final conversation.
    pub async fn run_traced(&self, system: &str, user: &str) -> Result<AgentRun, AgentError> {
        let mut adapter =
            CompletionAdapter::new(self.client.clone(), &self.model, self.options.temperature)
                .with_max_tokens(self.options.max_tokens)
                .with_retry(self.options.retry);
        let mut conversation = Conversation::new(system, user);

        if self.tools.is_empty() || self.options.disable_tools {
            debug!(model = %self.model, "running without tools");
            let outcome = match adapter.complete(conversation.messages()).await? {
                Some(completion) if !completion.text.is_empty() => {
                    conversation.push(Message::assistant(completion.text.clone(), vec![]));
                    RunOutcome::Succeeded(completion.text)
                }
                _ => RunOutcome::Failed,
            };
            return Ok(AgentRun {
                outcome,
                messages: conversation.into_messages(),
            });
        }

        adapter = adapter.with_tools(self.tools.definitions());
        let dispatcher = ToolDispatcher::new(
            &self.tools,
            self.options.tool_output_limit,
            self.progress.as_deref(),
        );
        let locale = self.options.locale;
        let max_steps = self.options.max_steps.max(1);
        let mut empty_retries = 0usize;
        let mut tools_used = false;
        let mut exit = LoopExit::NoCompletion;

        for round in 1..=max_steps {
            let trimmed = conversation.trim_tool_rounds(self.options.max_tool_messages);
            if trimmed > 0 {
                debug!(round, trimmed, "dropped old tool rounds");
            }

            let completion = match adapter.complete(conversation.messages()).await {
                Ok(Some(completion)) => completion,
                Ok(None) => {
                    warn!(round, "no completion available; leaving the loop");
                    exit = LoopExit::NoCompletion;
                    break;
                }
                Err(err @ ApiError::Status { .. }) => {
                    warn!(round, error = %err, "completion rejected; leaving the loop");
                    exit = LoopExit::NoCompletion;
                    break;
                }
                Err(err) => return Err(err.into()),
            };

            if completion.has_tool_calls() {
                info!(round, calls = completion.tool_calls.len(), "model requested tools");
                tools_used = true;
                exit = LoopExit::ToolsPending;
                conversation.push(Message::assistant(
                    completion.text.clone(),
                    completion.tool_calls.clone(),
                ));
                for call in &completion.tool_calls {
                    let result = dispatcher.dispatch(call).await?;
                    conversation.push(result);
                }
                continue;
            }

            if !completion.text.is_empty() {
                info!(round, recovered = completion.recovered, "final answer");
                conversation.push(Message::assistant(completion.text.clone(), vec![]));
                return Ok(AgentRun {
                    outcome: RunOutcome::Succeeded(completion.text),
                    messages: conversation.into_messages(),
                });
            }

            exit = LoopExit::Empty;
            if empty_retries >= MAX_EMPTY_CONTENT_RETRIES {
                warn!(round, "empty answers exhausted the corrective retries");
                break;
            }
            empty_retries += 1;
            warn!(round, retry = empty_retries, "empty answer; asking for direct output");
            conversation.push(Message::user(empty_retry_prompt(locale)));
        }

        if exit == LoopExit::ToolsPending {
            warn!(rounds = max_steps, "tool rounds exhausted without a final answer");
            return Err(AgentError::MaxRoundsExceeded { rounds: max_steps });
        }

        if let Some(text) = self.safety_net(system, user).await {
            return Ok(AgentRun {
                outcome: RunOutcome::Degraded(text),
                messages: conversation.into_messages(),
            });
        }

        let outcome = match exit {
            LoopExit::Empty if tools_used => RunOutcome::Fallback(fallback_from_tools(
                conversation.messages(),
                empty_content_reason(locale),
                locale,
            )),
            LoopExit::Empty => RunOutcome::Fallback(generic_failure(locale).to_string()),
            _ => match conversation.last_assistant_text() {
                Some(text) => RunOutcome::Degraded(text.to_string()),
                None => RunOutcome::Failed,
            },
        };
        Ok(AgentRun {
            outcome,
            messages: conversation.into_messages(),
        })
    }

    /// One buffered, toolless completion over the original prompt pair.
    /// Any failure here is logged and swallowed.
    async fn safety_net(&self, system: &str, user: &str) -> Option<String> {
        info!("trying a final toolless completion");
        let mut adapter =
            CompletionAdapter::new(self.client.clone(), &self.model, self.options.temperature)
                .with_max_tokens(self.options.max_tokens)
                .with_retry(RetryPolicy::with_max_attempts(1));
        let messages = [Message::system(system), Message::user(user)];
        match adapter.complete(&messages).await {
            Ok(Some(completion)) if !completion.text.is_empty() => Some(completion.text),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "final toolless completion failed");
                None
            }
        }
    }
}
