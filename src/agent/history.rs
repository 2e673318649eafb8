//! Conversation state owned by one agent run.
//!
//! Long tool-heavy runs re-send every tool result on each request. Before a
//! round the loop trims the oldest tool rounds so that only a bounded number
//! of `tool` messages remain. A round is the assistant message carrying
//! `tool_calls` together with the tool results that answer it; rounds are
//! always removed whole so no result is ever re-sent without its call.

use crate::types::{Message, Role};
use std::ops::Range;

/// Append-only message list for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// The initial two-message conversation.
    pub fn new(system: &str, user: &str) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
        }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn tool_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::Tool).count()
    }

    /// Most recent assistant message with visible text.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.text().trim())
            .find(|text| !text.is_empty())
    }

    /// Drop whole tool rounds, oldest first, until at most `max_tool_messages`
    /// tool results remain. The latest round is never dropped, even when it
    /// alone exceeds the limit. Returns the number of messages removed.
    pub fn trim_tool_rounds(&mut self, max_tool_messages: usize) -> usize {
        let mut removed = 0;
        loop {
            if self.tool_message_count() <= max_tool_messages {
                break;
            }
            let rounds = tool_rounds(&self.messages);
            if rounds.len() <= 1 {
                break;
            }
            let oldest = rounds[0].clone();
            removed += oldest.len();
            self.messages.drain(oldest);
        }
        removed
    }
}

/// Index ranges of every assistant-with-tool-calls message plus the tool
/// messages that immediately follow it.
fn tool_rounds(messages: &[Message]) -> Vec<Range<usize>> {
    let mut rounds = Vec::new();
    let mut idx = 0;
    while idx < messages.len() {
        if messages[idx].role == Role::Assistant && messages[idx].has_tool_calls() {
            let start = idx;
            idx += 1;
            while idx < messages.len() && messages[idx].role == Role::Tool {
                idx += 1;
            }
            rounds.push(start..idx);
        } else {
            idx += 1;
        }
    }
    rounds
}
