//! One completion per call, with retry and tool-compatibility fallback.
//!
//! The adapter hides transport differences from the loops above it: a caller
//! asks for a completion over the current conversation and gets back
//! normalized text plus any tool calls, or `None` when transient failures
//! used up the retry budget.

use super::assembler::{AssembledTurn, StreamAssembler};
use super::extract::{extract_from_reasoning, reasoning_of, strip_thinking};
use super::retry::RetryPolicy;
use crate::api::policy::is_tool_incompatibility;
use crate::api::ModelClient;
use crate::error::ApiError;
use crate::types::{ChatRequest, Message, ToolCall, ToolDefinition};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Normalized result of one completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Visible answer text, thinking markup removed. Empty when the round
    /// produced only tool calls or nothing at all.
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// `text` came from the reasoning channel rather than `content`.
    pub recovered: bool,
}

impl Completion {
    fn from_message(message: Option<&Message>) -> Self {
        let Some(message) = message else {
            return Self::default();
        };
        let tool_calls = message.tool_calls.clone().unwrap_or_default();
        let text = strip_thinking(message.text());
        let mut completion = Self {
            text,
            tool_calls,
            recovered: false,
        };
        if completion.is_empty() {
            if let Some(found) = reasoning_of(message).and_then(|r| extract_from_reasoning(&r)) {
                completion.text = found;
                completion.recovered = true;
            }
        }
        completion
    }

    fn from_turn(turn: AssembledTurn) -> Self {
        let mut completion = Self {
            text: turn.content.trim().to_string(),
            tool_calls: turn.tool_calls,
            recovered: false,
        };
        if completion.is_empty() {
            if let Some(found) = extract_from_reasoning(&turn.reasoning) {
                completion.text = found;
                completion.recovered = true;
            }
        }
        completion
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Neither text nor tool calls.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty()
    }
}

/// A failed attempt, and whether any token had already been forwarded.
struct Failure {
    error: ApiError,
    emitted: bool,
}

impl Failure {
    fn before_output(error: ApiError) -> Self {
        Self {
            error,
            emitted: false,
        }
    }
}

/// Issues completions for one run and remembers provider quirks across it.
pub struct CompletionAdapter {
    client: Arc<dyn ModelClient>,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    tools: Vec<ToolDefinition>,
    tools_disabled: bool,
    retry: RetryPolicy,
}

impl CompletionAdapter {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools: Vec::new(),
            tools_disabled: false,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tools_enabled(&self) -> bool {
        !self.tools.is_empty() && !self.tools_disabled
    }

    fn request(&self, messages: &[Message], use_tools: bool, stream: bool) -> ChatRequest {
        let mut request = ChatRequest::new(self.model.clone(), messages.to_vec());
        request.temperature = Some(self.temperature);
        request.max_tokens = self.max_tokens;
        request.stream = stream;
        if use_tools {
            request = request.with_tools(self.tools.clone());
        }
        request
    }

    /// Buffered completion.
    pub async fn complete(&mut self, messages: &[Message]) -> Result<Option<Completion>, ApiError> {
        self.run(messages, None).await
    }

    /// Streamed completion. Cleaned content tokens go to `on_token` as they
    /// arrive; tool-call fragments are held until the round ends.
    ///
    /// A failure after the first token has been forwarded is returned as-is
    /// rather than retried, so the consumer never sees duplicated text.
    pub async fn complete_streaming(
        &mut self,
        messages: &[Message],
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Option<Completion>, ApiError> {
        self.run(messages, Some(on_token)).await
    }

    async fn run(
        &mut self,
        messages: &[Message],
        mut on_token: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<Option<Completion>, ApiError> {
        let mut attempt = 0u32;
        loop {
            let use_tools = self.tools_enabled();
            debug!(
                attempt = attempt + 1,
                max_attempts = self.retry.max_attempts,
                use_tools,
                model = %self.model,
                messages = messages.len(),
                "requesting completion"
            );
            let mut outcome = self
                .attempt(messages, use_tools, reborrow(&mut on_token))
                .await;

            if let Err(failure) = &outcome {
                if use_tools && !failure.emitted && is_tool_incompatibility(&failure.error) {
                    warn!(
                        error = %truncate_for_log(&failure.error.to_string()),
                        "provider rejected tool parameters; continuing without tools"
                    );
                    self.tools_disabled = true;
                    outcome = self.attempt(messages, false, reborrow(&mut on_token)).await;
                }
            }

            let failure = match outcome {
                Ok(completion) => return Ok(Some(completion)),
                Err(failure) => failure,
            };
            if failure.emitted {
                warn!(error = %failure.error, "stream failed after output had started");
                return Err(failure.error);
            }
            if self.retry.should_retry(&failure.error, attempt) {
                let delay = self.retry.delay_for(attempt, &failure.error);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure.error,
                    "completion failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if failure.error.is_transient() {
                error!(
                    attempts = attempt + 1,
                    error = %failure.error,
                    "completion failed after all retries"
                );
                return Ok(None);
            }
            return Err(failure.error);
        }
    }

    async fn attempt(
        &self,
        messages: &[Message],
        use_tools: bool,
        on_token: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<Completion, Failure> {
        let Some(on_token) = on_token else {
            let request = self.request(messages, use_tools, false);
            let response = self
                .client
                .chat(&request)
                .await
                .map_err(Failure::before_output)?;
            return Ok(Completion::from_message(response.first_message()));
        };

        let request = self.request(messages, use_tools, true);
        let mut stream = self
            .client
            .chat_stream(&request)
            .await
            .map_err(Failure::before_output)?;
        let mut assembler = StreamAssembler::new();
        let mut emitted = false;
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|error| Failure { error, emitted })?;
            for token in assembler.push_chunk(&chunk) {
                emitted = true;
                on_token(&token);
            }
        }
        Ok(Completion::from_turn(assembler.finish()))
    }
}

/// Shorter-lived handle to the token callback for one attempt.
fn reborrow<'a>(
    on_token: &'a mut Option<&mut (dyn FnMut(&str) + Send)>,
) -> Option<&'a mut (dyn FnMut(&str) + Send)> {
    on_token
        .as_mut()
        .map(|f| &mut **f as &mut (dyn FnMut(&str) + Send))
}

fn truncate_for_log(text: &str) -> String {
    crate::tools::clip_chars(text, 200)
}
