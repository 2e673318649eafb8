//! HTTP client for OpenAI-compatible chat completion APIs.
//!
//! The API layer is split into cohesive modules:
//! - `completions`: `/chat/completions`, buffered and streamed
//! - `sse`: incremental decoding of streamed bodies
//! - `policy`: provider compatibility rules (tool-parameter rejection)
//! - `client`: shared auth and dispatch orchestration

use crate::error::ApiError;
use crate::types::{ChatChunk, ChatRequest, ChatResponse};
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

mod client;
mod completions;
pub mod policy;
pub mod sse;

pub use client::ApiClient;

/// Streamed completion: parsed chunks in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ApiError>> + Send>>;

/// Minimal model API interface used by the agent loop.
///
/// This trait lets tests provide deterministic scripted responses without
/// network calls while the production path uses [`ApiClient`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One buffered completion.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;

    /// One streamed completion. Errors before the first byte (status, connect)
    /// are returned directly; errors mid-body arrive as stream items.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError>;
}

/// Parse an integer `Retry-After` header.
pub(crate) fn parse_retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}
