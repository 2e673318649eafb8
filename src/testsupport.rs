//! Shared test fixtures.
//!
//! Scripted model clients, stub tools and tiny wire-format helpers reused by
//! the agent, session, job and HTTP client test modules.

use crate::api::{ChunkStream, ModelClient};
use crate::error::{ApiError, ToolError};
use crate::tools::Tool;
use crate::types::{
    ChatChunk, ChatRequest, ChatResponse, Choice, ChunkChoice, Delta, FunctionCall,
    FunctionCallDelta, Message, ToolCall, ToolCallDelta,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// One SSE block carrying a single `data:` line.
pub fn sse_data_block(data: &str) -> String {
    format!("data: {data}\n\n")
}

/// Build one SSE event block with `event:` and `data:` lines.
pub fn sse_event_block(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// SSE stream terminator block used by OpenAI-compatible streams.
pub fn sse_done_block() -> &'static str {
    "data: [DONE]\n\n"
}

/// Read one HTTP/1.1 request (headers plus `Content-Length` body) off a
/// fake-server socket and return it as text.
pub async fn read_http_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// ---------------------------------------------------------------------------
// Canned responses
// ---------------------------------------------------------------------------

fn response_with(message: Message) -> ChatResponse {
    ChatResponse {
        id: "chatcmpl-test".into(),
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: Some("stop".into()),
        }],
        usage: None,
    }
}

pub fn text_response(text: &str) -> ChatResponse {
    response_with(Message::assistant(text, vec![]))
}

pub fn empty_response() -> ChatResponse {
    response_with(Message::assistant("", vec![]))
}

/// Empty content with the answer only in `reasoning_content`.
pub fn reasoning_response(reasoning: &str) -> ChatResponse {
    let mut message = Message::assistant("", vec![]);
    message
        .extra
        .insert("reasoning_content".into(), json!(reasoning));
    response_with(message)
}

/// Tool calls given as `(id, name, arguments)`.
pub fn tool_call_response(calls: &[(&str, &str, &str)]) -> ChatResponse {
    let calls = calls
        .iter()
        .map(|(id, name, arguments)| ToolCall {
            id: id.to_string(),
            call_type: "function".into(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        })
        .collect();
    response_with(Message::assistant("", calls))
}

fn chunk(delta: Delta) -> ChatChunk {
    ChatChunk {
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason: None,
        }],
    }
}

/// One content chunk per piece.
pub fn text_chunks(pieces: &[&str]) -> Vec<Result<ChatChunk, ApiError>> {
    pieces
        .iter()
        .map(|piece| {
            Ok(chunk(Delta {
                content: Some(piece.to_string()),
                ..Delta::default()
            }))
        })
        .collect()
}

/// A streamed tool call at index 0: a header chunk, then argument fragments.
pub fn tool_call_chunks(id: &str, name: &str, fragments: &[&str]) -> Vec<Result<ChatChunk, ApiError>> {
    let header = ToolCallDelta {
        index: 0,
        id: Some(id.to_string()),
        function: Some(FunctionCallDelta {
            name: Some(name.to_string()),
            arguments: None,
        }),
    };
    std::iter::once(header)
        .chain(fragments.iter().map(|fragment| ToolCallDelta {
            index: 0,
            id: None,
            function: Some(FunctionCallDelta {
                name: None,
                arguments: Some(fragment.to_string()),
            }),
        }))
        .map(|call| {
            Ok(chunk(Delta {
                tool_calls: Some(vec![call]),
                ..Delta::default()
            }))
        })
        .collect()
}

/// A buffered response replayed as a stream: one content chunk (if any)
/// followed by one chunk per tool call.
fn response_as_chunks(response: &ChatResponse) -> Vec<Result<ChatChunk, ApiError>> {
    let Some(message) = response.first_message() else {
        return Vec::new();
    };
    let mut chunks = Vec::new();
    if !message.text().is_empty() {
        chunks.extend(text_chunks(&[message.text()]));
    }
    for (index, call) in message.tool_calls.iter().flatten().enumerate() {
        chunks.push(Ok(chunk(Delta {
            tool_calls: Some(vec![ToolCallDelta {
                index,
                id: Some(call.id.clone()),
                function: Some(FunctionCallDelta {
                    name: Some(call.function.name.clone()),
                    arguments: Some(call.function.arguments.clone()),
                }),
            }]),
            ..Delta::default()
        })));
    }
    chunks
}

// ---------------------------------------------------------------------------
// Scripted model
// ---------------------------------------------------------------------------

/// One scripted reaction to a model request.
pub enum Scripted {
    Reply(ChatResponse),
    Stream(Vec<Result<ChatChunk, ApiError>>),
    Fail(ApiError),
}

/// Deterministic [`ModelClient`] that answers from a queue.
///
/// `Reply` serves both buffered and streamed calls; `Stream` only streamed
/// ones. Once the queue is empty the optional `repeat` response is served
/// forever, otherwise calls fail with `InvalidResponse`.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<ChatResponse>,
    requests: Mutex<Vec<ChatRequest>>,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Answer every request with `response`.
    pub fn always(response: ChatResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Tokio clock reading at each request, for paused-clock backoff tests.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    fn next(&self, request: &ChatRequest) -> Option<Scripted> {
        self.requests.lock().unwrap().push(request.clone());
        self.call_times.lock().unwrap().push(Instant::now());
        let queued = self.script.lock().unwrap().pop_front();
        queued.or_else(|| self.repeat.clone().map(Scripted::Reply))
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        match self.next(request) {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Stream(_)) => Err(ApiError::InvalidResponse(
                "stream scripted for a buffered call".into(),
            )),
            None => Err(ApiError::InvalidResponse("script exhausted".into())),
        }
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError> {
        let items = match self.next(request) {
            Some(Scripted::Stream(items)) => items,
            Some(Scripted::Reply(response)) => response_as_chunks(&response),
            Some(Scripted::Fail(err)) => return Err(err),
            None => return Err(ApiError::InvalidResponse("script exhausted".into())),
        };
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

// ---------------------------------------------------------------------------
// Stub tool
// ---------------------------------------------------------------------------

/// Tool with a fixed outcome that records the arguments it was called with.
pub struct StubTool {
    name: &'static str,
    outcome: Result<String, ToolError>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl StubTool {
    pub fn new(name: &'static str, output: &str) -> Self {
        Self {
            name,
            outcome: Ok(output.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn failing(name: &'static str, err: ToolError) -> Self {
        Self {
            name,
            outcome: Err(err),
            calls: Arc::default(),
        }
    }

    /// Handle on the recorded arguments that outlives registration.
    pub fn calls(&self) -> Arc<Mutex<Vec<Value>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &str {
        "stub tool for tests"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push(args.clone());
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn sse_helpers_emit_expected_wire_format() {
        let block = sse_event_block("message", r#"{"id":"1"}"#);
        assert!(block.starts_with("event: message\n"));
        assert!(block.ends_with("\n\n"));
        assert_eq!(sse_data_block("x"), "data: x\n\n");
        assert_eq!(sse_done_block(), "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn scripted_model_replays_replies_as_streams() {
        let model = ScriptedModel::new(vec![Scripted::Reply(tool_call_response(&[(
            "c1",
            "arxiv_search",
            "{}",
        )]))]);
        let request = ChatRequest::new("m", vec![]);
        let chunks: Vec<_> = model.chat_stream(&request).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(model.chat(&request).await.is_err());
        assert_eq!(model.call_count(), 2);
    }
}
