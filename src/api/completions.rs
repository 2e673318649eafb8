//! `/chat/completions` protocol request helpers.

use super::sse::decode_chunk_stream;
use super::{parse_retry_after_secs, ChunkStream};
use crate::error::ApiError;
use crate::types::{ChatRequest, ChatResponse};
use std::time::Duration;

/// POST the request and map non-2xx statuses to `ApiError::Status`.
async fn send(
    http: &reqwest::Client,
    base_url: &str,
    request: &ChatRequest,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Response, ApiError> {
    let url = format!("{base_url}/chat/completions");
    let mut req = http.post(&url).json(request).timeout(timeout);
    if let Some(token) = bearer.filter(|value| !value.trim().is_empty()) {
        req = req.header("Authorization", format!("Bearer {token}"));
    }

    let response = req.send().await.map_err(classify_send_error)?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let retry_after_secs = parse_retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::status(status, body, retry_after_secs));
    }
    Ok(response)
}

/// Connect failures and timeouts become `Connection` so retry logic treats
/// them uniformly with mid-stream drops.
fn classify_send_error(err: reqwest::Error) -> ApiError {
    if err.is_connect() || err.is_timeout() {
        ApiError::Connection(err.to_string())
    } else {
        ApiError::Http(err)
    }
}

/// Send one buffered `/chat/completions` request and parse the response.
pub(crate) async fn request(
    http: &reqwest::Client,
    base_url: &str,
    request: &ChatRequest,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<ChatResponse, ApiError> {
    let response = send(http, base_url, request, bearer, timeout).await?;
    let body = response.text().await.map_err(classify_send_error)?;
    serde_json::from_str::<ChatResponse>(&body)
        .map_err(|err| ApiError::InvalidResponse(format!("invalid JSON response: {err}")))
}

/// Send one `stream: true` request and return the decoded chunk stream.
pub(crate) async fn request_stream(
    http: &reqwest::Client,
    base_url: &str,
    request: &ChatRequest,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<ChunkStream, ApiError> {
    let response = send(http, base_url, request, bearer, timeout).await?;
    Ok(decode_chunk_stream(response.bytes_stream()))
}
