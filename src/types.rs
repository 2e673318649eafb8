//! Data model for the OpenAI Chat Completions API.
//!
//! These types serialize/deserialize directly to/from the JSON payloads
//! expected by any OpenAI-compatible endpoint, in both the buffered and the
//! `stream: true` shapes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Message roles
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,

    /// Text content. Null when the assistant message is purely tool calls.
    ///
    /// Providers that answer with an array of content parts are flattened
    /// into one string on the way in.
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// When role == Tool, the id of the tool_call this result corresponds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Provider-specific message fields preserved verbatim, such as
    /// `reasoning_content` on extended-thinking models.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Message {
    fn bare(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(Role::System, Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, Some(content.into()))
    }

    /// Assistant turn. Empty text is stored as `None` so tool-only turns
    /// serialize with `content: null`.
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let content: String = content.into();
        let mut msg = Self::bare(
            Role::Assistant,
            if content.is_empty() { None } else { Some(content) },
        );
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg
    }

    /// Create a tool result message, sent back after executing a tool call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::bare(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// Accepts `null`, a plain string, or an array of `{type, text|content|value}`
/// parts and yields the concatenated text.
fn deserialize_content<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| content_value_to_text(&value)))
}

pub(crate) fn content_value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let joined: String = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => ["text", "content", "value"]
                        .iter()
                        .find_map(|key| map.get(*key).and_then(Value::as_str))
                        .map(str::to_string),
                    _ => None,
                })
                .collect();
            Some(joined)
        }
        Value::Object(map) => ["text", "content", "value"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tool calls (in assistant responses)
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique id used to correlate tool call and tool result.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// The function name and JSON-encoded arguments within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// JSON-encoded string of the arguments object, kept raw.
    #[serde(default)]
    pub arguments: String,
}

// ---------------------------------------------------------------------------
// Tool definitions (sent in requests)
// ---------------------------------------------------------------------------

/// Tool definition included in the API request so the model knows what's available.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// The schema of a callable function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    /// Natural-language description, embedded verbatim in the request.
    pub description: String,
    /// JSON Schema object describing the parameters.
    pub parameters: Value,
}

// ---------------------------------------------------------------------------
// Chat completion request / response
// ---------------------------------------------------------------------------

/// Request body for POST /chat/completions.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    /// Attach tool definitions with `tool_choice: "auto"`; an empty slice
    /// leaves both fields off the wire.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        if tools.is_empty() {
            self.tools = None;
            self.tool_choice = None;
        } else {
            self.tools = Some(tools);
            self.tool_choice = Some("auto".to_string());
        }
        self
    }

    pub fn without_tools(mut self) -> Self {
        self.tools = None;
        self.tool_choice = None;
        self
    }

    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }
}

/// Response body from POST /chat/completions.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn first_message(&self) -> Option<&Message> {
        self.choices.first().map(|choice| &choice.message)
    }
}

/// A single choice in the API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Streaming chunks
// ---------------------------------------------------------------------------

/// One `data:` payload of a streamed completion.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental assistant fields carried by one chunk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Delta {
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of a tool call, keyed by its position in the round.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Verifies optional fields are omitted when absent during request serialization.
    #[test]
    fn serialize_chat_request() {
        let mut req = ChatRequest::new(
            "gpt-4o",
            vec![Message::system("You are helpful."), Message::user("Hi")],
        );
        req.temperature = Some(0.7);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["stream"], false);
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    // Verifies attaching tools also sets tool_choice, and stripping clears both.
    #[test]
    fn with_tools_sets_auto_choice() {
        let def = ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "arxiv_search".into(),
                description: "search".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
        };
        let req = ChatRequest::new("m", vec![]).with_tools(vec![def]);
        assert!(req.has_tools());
        assert_eq!(req.tool_choice.as_deref(), Some("auto"));

        let stripped = req.without_tools();
        assert!(!stripped.has_tools());
        let json = serde_json::to_value(&stripped).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    // Verifies standard assistant text responses deserialize correctly.
    #[test]
    fn deserialize_chat_response() {
        let json = r#"{
            "id": "chatcmpl-123",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, "chatcmpl-123");
        assert_eq!(resp.first_message().unwrap().text(), "Hello!");
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 15);
    }

    // Verifies content-part arrays are flattened to plain text.
    #[test]
    fn deserialize_content_parts() {
        let json = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": [
                        {"type": "text", "text": "Attention "},
                        {"type": "output_text", "value": "is all you need"}
                    ]
                }
            }]
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_message().unwrap().text(), "Attention is all you need");
    }

    // Verifies assistant tool-call responses deserialize with null content.
    #[test]
    fn deserialize_tool_call_response() {
        let json = r#"{
            "id": "chatcmpl-456",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "arxiv_search", "arguments": "{\"query\":\"GRPO\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let msg = resp.first_message().unwrap();
        assert!(msg.content.is_none());
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls.as_ref().unwrap()[0].function.name, "arxiv_search");
    }

    #[test]
    fn preserves_reasoning_content_across_turns() {
        let json = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "reasoning_content": "thinking trace"
                }
            }]
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let req = ChatRequest::new("deepseek-reasoner", vec![resp.choices[0].message.clone()]);
        let out = serde_json::to_value(req).unwrap();
        assert_eq!(out["messages"][0]["reasoning_content"], "thinking trace");
    }

    #[test]
    fn deserialize_stream_chunk_with_tool_delta() {
        let json = r#"{
            "choices": [{
                "index": 0,
                "delta": {
                    "tool_calls": [{
                        "index": 1,
                        "id": "call_2",
                        "function": {"name": "tavily_search", "arguments": "{\"qu"}
                    }]
                }
            }]
        }"#;
        let chunk: ChatChunk = serde_json::from_str(json).unwrap();
        let delta = &chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(delta.index, 1);
        assert_eq!(delta.id.as_deref(), Some("call_2"));
        assert_eq!(
            delta.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"qu")
        );
    }

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.text(), "hello");

        let tool = Message::tool_result("call_1", "result data");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));

        let empty_assistant = Message::assistant("", vec![]);
        assert!(empty_assistant.content.is_none());
        assert!(!empty_assistant.has_tool_calls());
    }
}
