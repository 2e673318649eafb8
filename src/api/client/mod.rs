//! API client for OpenAI-compatible chat transports.
//!
//! The client stays small: it owns the HTTP connection pool, the bearer key
//! and the two timeouts. Retry and tool-compatibility decisions live one
//! layer up in `agent::adapter`, so scripted clients exercise them too.

mod transport;

use super::{completions, ChunkStream, ModelClient};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::time::Duration;

/// Client for OpenAI-compatible model APIs.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    stream_timeout: Duration,
}

impl ApiClient {
    /// Build a client from resolved API configuration.
    ///
    /// `stream_timeout` bounds a whole streamed body, which for reasoning
    /// models is usually much longer than a buffered call.
    pub fn new(config: &ApiConfig, stream_timeout: Duration) -> Self {
        Self {
            http: transport::build_http_client(),
            base_url: transport::normalize_base_url(&config.base_url),
            api_key: config.api_key.trim().to_string(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            stream_timeout,
        }
    }

    fn bearer(&self) -> Option<&str> {
        // Local OpenAI-compatible servers run without a key.
        (!self.api_key.is_empty()).then_some(self.api_key.as_str())
    }
}

#[async_trait]
impl ModelClient for ApiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        if request.stream {
            let mut buffered = request.clone();
            buffered.stream = false;
            return completions::request(
                &self.http,
                &self.base_url,
                &buffered,
                self.bearer(),
                self.timeout,
            )
            .await;
        }
        completions::request(&self.http, &self.base_url, request, self.bearer(), self.timeout)
            .await
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ApiError> {
        let mut streamed = request.clone();
        streamed.stream = true;
        completions::request_stream(
            &self.http,
            &self.base_url,
            &streamed,
            self.bearer(),
            self.stream_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::read_http_request;
    use crate::types::Message;
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let raw = read_http_request(&mut stream).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
            raw
        });
        (format!("http://{addr}"), handle)
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn client_for(base_url: String, timeout_secs: u64) -> ApiClient {
        let api = ApiConfig {
            base_url,
            api_key: "test-key".to_string(),
            model: "dummy-model".to_string(),
            timeout_secs,
            ..ApiConfig::default()
        };
        ApiClient::new(&api, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn buffered_request_sends_bearer_and_parses_response() {
        let body = r#"{"id":"ok","choices":[{"index":0,"message":{"role":"assistant","content":"done"},"finish_reason":"stop"}]}"#;
        let (base_url, server) = serve_once(http_response("200 OK", "application/json", body)).await;
        let client = client_for(base_url, 3);
        let request = ChatRequest::new("dummy-model", vec![Message::user("hello")]);

        let response = client.chat(&request).await.expect("chat");
        assert_eq!(response.first_message().unwrap().text(), "done");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /chat/completions"), "got: {raw}");
        assert!(raw.to_lowercase().contains("authorization: bearer test-key"));
        assert!(raw.contains("\"stream\":false"));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_status_error() {
        let (base_url, _server) = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nRetry-After: 3\r\nContent-Length: 4\r\nConnection: close\r\n\r\nslow"
                .to_string(),
        )
        .await;
        let client = client_for(base_url, 3);
        let request = ChatRequest::new("dummy-model", vec![Message::user("hello")]);
        let err = client.chat(&request).await.expect_err("429 expected");
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.retry_after_secs(), Some(3));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn invalid_json_body_is_invalid_response() {
        let (base_url, _server) =
            serve_once(http_response("200 OK", "application/json", "<html>")).await;
        let client = client_for(base_url, 3);
        let request = ChatRequest::new("dummy-model", vec![Message::user("hello")]);
        let err = client.chat(&request).await.expect_err("decode failure");
        assert!(matches!(err, ApiError::InvalidResponse(_)), "got: {err}");
    }

    #[tokio::test]
    async fn streamed_request_decodes_chunks() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Trans\"}}]}\n\n",
            ": keepalive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"former\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        let (base_url, server) =
            serve_once(http_response("200 OK", "text/event-stream", body)).await;
        let client = client_for(base_url, 3);
        let request = ChatRequest::new("dummy-model", vec![Message::user("hello")]);

        let stream = client.chat_stream(&request).await.expect("stream");
        let text: String = stream
            .map(|chunk| {
                chunk
                    .unwrap()
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.clone())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "Transformer");
        let raw = server.await.unwrap();
        assert!(raw.contains("\"stream\":true"), "got: {raw}");
    }

    #[tokio::test]
    async fn connection_refused_is_transient_connection_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{addr}"), 2);
        let request = ChatRequest::new("dummy-model", vec![Message::user("hello")]);
        let err = client.chat(&request).await.expect_err("refused");
        assert!(err.is_transient(), "got: {err}");
    }
}
