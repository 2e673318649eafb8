//! Chat-facing streaming session.
//!
//! [`ChatSession::respond`] is the live variant of the agent loop: every
//! content token goes out on the event channel as soon as it arrives, tool
//! calls are announced as `calling` / `done` pairs, and transport failures
//! end the turn with a readable degraded answer instead of a silent close.
//! Terms and profile changes proposed by the model through their tools are
//! collected during the turn and returned to the caller.

pub mod prompt;
pub mod signals;

use crate::agent::dispatch::ToolDispatcher;
use crate::agent::fallback::{
    connection_reason, empty_content_reason, empty_retry_prompt, fallback_from_tools,
    generic_failure, http_status_reason,
};
use crate::agent::{
    CompletionAdapter, Conversation, ProgressSink, RetryPolicy, ToolActivity, ToolStatus,
    MAX_EMPTY_CONTENT_RETRIES,
};
use crate::api::ModelClient;
use crate::config::{Config, Locale};
use crate::error::{AgentError, ApiError, StoreError, ToolError};
use crate::tools::{
    chat_tools, ChatCapabilities, ProfileSink, ProfileUpdate, TermSink, TermUpdate, Tool,
    ToolRegistry,
};
use crate::types::{Message, Role};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Calling,
    Done,
}

/// One frame of the chat stream, serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Token {
        content: String,
    },
    ToolCall {
        tool: String,
        query: String,
        status: ToolCallStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_count: Option<usize>,
    },
    TermSuggestions {
        terms: Vec<TermUpdate>,
    },
    ProfileUpdateSuggestions {
        updates: Vec<ProfileUpdate>,
    },
    Error {
        message: String,
    },
}

impl ChatEvent {
    fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }
}

impl From<ToolActivity> for ChatEvent {
    fn from(activity: ToolActivity) -> Self {
        let (status, result_count) = match activity.status {
            ToolStatus::Calling => (ToolCallStatus::Calling, None),
            ToolStatus::Done { result_count } => (ToolCallStatus::Done, Some(result_count)),
        };
        Self::ToolCall {
            tool: activity.tool,
            query: activity.query,
            status,
            result_count,
        }
    }
}

/// Forwards tool lifecycle events onto the chat stream.
struct EventSink(UnboundedSender<ChatEvent>);

impl ProgressSink for EventSink {
    fn on_tool(&self, activity: ToolActivity) {
        let _ = self.0.send(activity.into());
    }
}

fn emit(events: &UnboundedSender<ChatEvent>, event: ChatEvent) {
    // a closed receiver means the client went away; the turn still finishes
    let _ = events.send(event);
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Persists the assistant's reply for a finished turn.
#[async_trait]
pub trait ReplyStore: Send + Sync {
    async fn save_reply(&self, text: &str, terms: &[TermUpdate]) -> Result<(), StoreError>;
}

/// Term and profile proposals captured while a turn runs.
#[derive(Default)]
struct PendingUpdates {
    terms: Mutex<Vec<TermUpdate>>,
    profile: Mutex<Vec<ProfileUpdate>>,
}

impl PendingUpdates {
    fn take(&self) -> (Vec<TermUpdate>, Vec<ProfileUpdate>) {
        let terms = std::mem::take(&mut *self.terms.lock().unwrap_or_else(PoisonError::into_inner));
        let profile =
            std::mem::take(&mut *self.profile.lock().unwrap_or_else(PoisonError::into_inner));
        (terms, profile)
    }
}

#[async_trait]
impl TermSink for PendingUpdates {
    async fn persist_term(&self, term: TermUpdate) -> Result<(), ToolError> {
        self.terms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(term);
        Ok(())
    }
}

#[async_trait]
impl ProfileSink for PendingUpdates {
    async fn update_profile(&self, update: ProfileUpdate) -> Result<(), ToolError> {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Input for one chat turn.
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub system_prompt: String,
    /// Earlier messages on this branch, oldest first.
    pub history: Vec<Message>,
    pub question: String,
}

/// What a finished turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOutcome {
    /// Full reply as delivered to the user; empty when the turn failed.
    pub text: String,
    pub terms: Vec<TermUpdate>,
    pub profile_updates: Vec<ProfileUpdate>,
    /// Set when the turn ended with an `error` event.
    pub error: Option<String>,
}

/// Streaming chat driver for one conversation.
pub struct ChatSession {
    client: Arc<dyn ModelClient>,
    model: String,
    temperature: f64,
    max_rounds: usize,
    tool_output_limit: usize,
    retry: RetryPolicy,
    locale: Locale,
    tools: ToolRegistry,
    pending: Arc<PendingUpdates>,
    replies: Option<Arc<dyn ReplyStore>>,
}

impl ChatSession {
    /// Build a session with the chat tool set. The `terms` and `profile`
    /// capabilities are always replaced by the session's own collector so
    /// proposals come back in [`ChatOutcome`].
    pub fn new(client: Arc<dyn ModelClient>, config: &Config, mut caps: ChatCapabilities) -> Self {
        let pending = Arc::new(PendingUpdates::default());
        caps.terms = Some(pending.clone());
        caps.profile = Some(pending.clone());
        let tools = chat_tools(&config.tools, caps);
        info!(tools = ?tools.names(), "chat session ready");
        Self {
            client,
            model: config.api.model.clone(),
            temperature: config.chat.temperature,
            max_rounds: config.chat.max_tool_rounds.max(1),
            tool_output_limit: config.agent.tool_output_limit,
            retry: RetryPolicy::with_max_attempts(config.api.max_retries),
            locale: config.chat.locale,
            tools,
            pending,
            replies: None,
        }
    }

    pub fn with_reply_store(mut self, store: Arc<dyn ReplyStore>) -> Self {
        self.replies = Some(store);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add a tool beyond the configured chat set.
    pub fn register_tool(&mut self, tool: impl Tool + 'static) {
        self.tools.register(tool);
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.names()
    }

    /// Run one turn, streaming [`ChatEvent`]s to `events`.
    pub async fn respond(
        &mut self,
        turn: &ChatTurn,
        events: &UnboundedSender<ChatEvent>,
    ) -> ChatOutcome {
        // leftovers from an aborted turn must not leak into this one
        self.pending.take();

        let mut messages = vec![
            Message::system(turn.system_prompt.as_str()),
            Message::user(format_prompt(&turn.history, &turn.question, self.locale)),
        ];
        if let Some(injection) = signals::signal_injection(&turn.question) {
            info!("injected learner-signal prompt");
            messages.push(injection);
        }
        let mut conversation = Conversation::from_messages(messages);

        let result = self.drive(&mut conversation, events).await;
        let (terms, profile_updates) = self.pending.take();
        let text = match result {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "chat turn failed");
                let message = err.to_string();
                emit(events, ChatEvent::Error {
                    message: message.clone(),
                });
                return ChatOutcome {
                    text: String::new(),
                    terms,
                    profile_updates,
                    error: Some(message),
                };
            }
        };
        info!(chars = text.chars().count(), terms = terms.len(), "chat turn finished");

        if !terms.is_empty() {
            emit(events, ChatEvent::TermSuggestions {
                terms: terms.clone(),
            });
        }
        if !profile_updates.is_empty() {
            emit(events, ChatEvent::ProfileUpdateSuggestions {
                updates: profile_updates.clone(),
            });
        }

        let mut outcome = ChatOutcome {
            text,
            terms,
            profile_updates,
            error: None,
        };
        if let Some(store) = &self.replies {
            if let Err(err) = store.save_reply(&outcome.text, &outcome.terms).await {
                error!(error = %err, "saving chat reply failed");
                emit(events, ChatEvent::Error {
                    message: err.to_string(),
                });
                outcome.error = Some(err.to_string());
            }
        }
        outcome
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        events: &UnboundedSender<ChatEvent>,
    ) -> Result<String, AgentError> {
        let locale = self.locale;
        let mut adapter = CompletionAdapter::new(self.client.clone(), &self.model, self.temperature)
            .with_retry(self.retry)
            .with_tools(self.tools.definitions());
        let sink = EventSink(events.clone());
        let dispatcher = ToolDispatcher::new(&self.tools, self.tool_output_limit, Some(&sink));
        let mut on_token = |token: &str| emit(events, ChatEvent::token(token));
        let mut empty_retries = 0usize;
        let mut tools_used = false;

        for round in 1..=self.max_rounds {
            let completion = match adapter
                .complete_streaming(conversation.messages(), &mut on_token)
                .await
            {
                Ok(Some(completion)) => completion,
                Ok(None) => {
                    warn!(round, "completion unavailable after retries");
                    return Ok(self.degrade(conversation, connection_reason(locale), events));
                }
                Err(err) => {
                    warn!(round, error = %err, "streaming request failed");
                    let reason = failure_reason(&err, locale);
                    return Ok(self.degrade(conversation, &reason, events));
                }
            };

            if completion.has_tool_calls() {
                tools_used = true;
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
                if completion.recovered {
                    // nothing was streamed for a reasoning-only answer
                    emit(events, ChatEvent::token(completion.text.as_str()));
                }
                return Ok(completion.text);
            }

            if empty_retries < MAX_EMPTY_CONTENT_RETRIES {
                empty_retries += 1;
                warn!(round, retry = empty_retries, "empty streamed answer; asking for direct output");
                conversation.push(Message::user(empty_retry_prompt(locale)));
                continue;
            }

            let text = if tools_used {
                fallback_from_tools(conversation.messages(), empty_content_reason(locale), locale)
            } else {
                generic_failure(locale).to_string()
            };
            emit(events, ChatEvent::token(text.as_str()));
            return Ok(text);
        }

        Err(AgentError::MaxRoundsExceeded {
            rounds: self.max_rounds,
        })
    }

    fn degrade(
        &self,
        conversation: &Conversation,
        reason: &str,
        events: &UnboundedSender<ChatEvent>,
    ) -> String {
        let text = fallback_from_tools(conversation.messages(), reason, self.locale);
        emit(events, ChatEvent::token(text.as_str()));
        text
    }
}

/// Reason prefix for a failed streaming request.
fn failure_reason(err: &ApiError, locale: Locale) -> String {
    match err.status_code() {
        Some(code) => http_status_reason(code, locale),
        None => connection_reason(locale).to_string(),
    }
}

/// Fold prior turns and the new question into the single user prompt.
pub fn format_prompt(history: &[Message], question: &str, locale: Locale) -> String {
    let mut transcript = String::new();
    for message in history {
        let role = match (message.role, locale) {
            (Role::Tool, _) => continue,
            (Role::User, Locale::Zh) => "用户",
            (Role::System, Locale::Zh) => "系统",
            (Role::Assistant, Locale::Zh) => "助手",
            (Role::User, Locale::En) => "User",
            (Role::System, Locale::En) => "System",
            (Role::Assistant, Locale::En) => "Assistant",
        };
        transcript.push_str(&format!("{role}: {}\n\n", message.text()));
    }
    match locale {
        Locale::Zh => format!("对话历史:\n{transcript}\n\n用户最新问题: {question}"),
        Locale::En => format!("Conversation history:\n{transcript}\n\nLatest question: {question}"),
    }
}
