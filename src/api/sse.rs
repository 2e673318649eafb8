//! Incremental SSE decoding for streamed `/chat/completions` bodies.
//!
//! Network chunks can split lines (and multi-byte UTF-8 sequences) at any
//! byte, so the decoder buffers raw bytes and only interprets complete lines.

use crate::error::ApiError;
use crate::types::ChatChunk;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

use super::ChunkStream;

const DONE_SENTINEL: &str = "[DONE]";

/// Line-oriented SSE decoder fed with arbitrary byte chunks.
///
/// Multiple `data:` lines in one event are joined with `\n` and finalized on
/// a blank line; `[DONE]` is flushed immediately.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every payload it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
            self.consume_line(&line, &mut payloads);
        }
        payloads
    }

    /// Flush a trailing unterminated line and any pending event.
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.consume_line(&line, &mut payloads);
        }
        self.flush(&mut payloads);
        payloads
    }

    fn consume_line(&mut self, raw_line: &str, payloads: &mut Vec<String>) {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() {
            self.flush(payloads);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field != "data" {
            return;
        }
        if value.trim() == DONE_SENTINEL {
            self.flush(payloads);
            payloads.push(DONE_SENTINEL.to_string());
            return;
        }
        self.data_lines.push(value.to_string());
    }

    fn flush(&mut self, payloads: &mut Vec<String>) {
        if self.data_lines.is_empty() {
            return;
        }
        payloads.push(self.data_lines.join("\n"));
        self.data_lines.clear();
    }
}

/// Parse a complete SSE body into its `data` payload blocks.
pub fn parse_sse_event_payloads(body: &str) -> Vec<String> {
    let mut decoder = SseDecoder::new();
    let mut payloads = decoder.push(body.as_bytes());
    payloads.extend(decoder.finish());
    payloads
}

/// Decode one payload into chunks.
///
/// Providers that omit the blank separator line produce several JSON objects
/// joined by `\n`; those are split and decoded one by one. Anything that still
/// fails to parse is skipped.
fn decode_payload(payload: &str) -> Vec<ChatChunk> {
    if let Ok(chunk) = serde_json::from_str::<ChatChunk>(payload) {
        return vec![chunk];
    }
    let chunks: Vec<ChatChunk> = payload
        .lines()
        .filter_map(|line| serde_json::from_str::<ChatChunk>(line.trim()).ok())
        .collect();
    if chunks.is_empty() {
        debug!(payload_len = payload.len(), "skipping malformed stream payload");
    }
    chunks
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<ChatChunk>,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Queue decoded chunks; returns true once `[DONE]` was seen.
    fn enqueue(&mut self, payloads: Vec<String>) -> bool {
        for payload in payloads {
            if payload == DONE_SENTINEL {
                return true;
            }
            self.pending.extend(decode_payload(&payload));
        }
        false
    }
}

/// Turn a raw byte stream into a stream of parsed completion chunks.
///
/// The stream ends at `[DONE]` or end of body. A transport error mid-body is
/// yielded once as `ApiError::Connection` and ends the stream.
pub fn decode_chunk_stream<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let body: Pin<Box<dyn Stream<Item = Result<B, E>> + Send>> = Box::pin(body);
    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let payloads = state.decoder.push(bytes.as_ref());
                    if state.enqueue(payloads) {
                        state.finished = true;
                    }
                }
                Some(Err(err)) => {
                    state.finished = true;
                    state.pending.clear();
                    return Some((Err(ApiError::Connection(err.to_string())), state));
                }
                None => {
                    let payloads = state.decoder.finish();
                    state.enqueue(payloads);
                    state.finished = true;
                }
            }
        }
    });
    Box::pin(stream)
}
