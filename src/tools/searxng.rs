//! SearXNG metasearch tool (science category).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use super::tavily::{render_hits, SearchHit};
use super::{required_str, search_http_client, Tool};
use crate::error::ToolError;

pub struct SearxngSearchTool {
    http: reqwest::Client,
    base_url: String,
}

impl SearxngSearchTool {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: search_http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait]
impl Tool for SearxngSearchTool {
    fn name(&self) -> &'static str {
        "searxng_search"
    }

    fn description(&self) -> &str {
        "Search a SearXNG instance for scientific sources. Use this to find definitions and usage of academic terms."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query or term to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let query = required_str(args, "query")?;
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("categories", "science"),
                ("language", "en"),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(tool = "searxng_search", error = %e, "SearXNG search failed");
                ToolError::ExecutionFailed(format!("SearXNG search error: {e}"))
            })?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            warn!(tool = "searxng_search", status = code, "SearXNG HTTP error");
            return Err(ToolError::ExecutionFailed(format!(
                "SearXNG error: HTTP {code}"
            )));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("SearXNG search error: {e}")))?;

        if parsed.results.is_empty() {
            return Ok("No SearXNG results found.".to_string());
        }
        Ok(render_hits(&parsed.results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::read_http_request;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn serve(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let raw = read_http_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            raw
        });
        (format!("http://{addr}/"), handle)
    }

    #[tokio::test]
    async fn execute_requests_science_json() {
        let (base, server) = serve("200 OK", r#"{"results":[]}"#).await;
        let tool = SearxngSearchTool::new(&base, Duration::from_secs(3));
        let out = tool.execute(&json!({"query": "layer norm"})).await.unwrap();
        assert_eq!(out, "No SearXNG results found.");
        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /search?q=layer+norm&format=json&categories=science"), "got: {raw}");
    }

    #[tokio::test]
    async fn http_error_names_the_status() {
        let (base, _server) = serve("502 Bad Gateway", "{}").await;
        let tool = SearxngSearchTool::new(&base, Duration::from_secs(3));
        let err = tool.execute(&json!({"query": "x"})).await.unwrap_err();
        assert_eq!(err, ToolError::ExecutionFailed("SearXNG error: HTTP 502".into()));
    }
}
