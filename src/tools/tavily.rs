//! Tavily web search tool, biased towards academic domains.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use super::{required_str, search_http_client, Tool};
use crate::error::ToolError;

const TAVILY_API_URL: &str = "https://api.tavily.com/search";
const MAX_RESULTS: usize = 5;
const ACADEMIC_DOMAINS: &[&str] = &["arxiv.org", "scholar.google.com", "semanticscholar.org"];

pub struct TavilySearchTool {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl TavilySearchTool {
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self {
            http: search_http_client(timeout),
            endpoint: TAVILY_API_URL.to_string(),
            api_key: api_key.to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// One hit as returned by Tavily and SearXNG (same field names).
#[derive(Deserialize, Default)]
pub(super) struct SearchHit {
    #[serde(default)]
    pub(super) title: Option<String>,
    #[serde(default)]
    pub(super) url: Option<String>,
    #[serde(default)]
    pub(super) content: Option<String>,
}

/// `- title\n  URL: ..\n  snippet` lines for the first five hits.
pub(super) fn render_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(MAX_RESULTS)
        .map(|hit| {
            let title = hit.title.as_deref().unwrap_or("").trim();
            let url = hit.url.as_deref().unwrap_or("");
            let mut content = super::collapse_whitespace(hit.content.as_deref().unwrap_or(""));
            if content.chars().count() > 300 {
                content = format!("{}...", super::clip_chars(&content, 300));
            }
            format!("- {title}\n  URL: {url}\n  {content}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &'static str {
        "tavily_search"
    }

    fn description(&self) -> &str {
        "Search the web via Tavily for authoritative academic definitions and translations. Prioritizes arxiv.org results."
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
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "advanced",
            "include_domains": ACADEMIC_DOMAINS,
            "max_results": MAX_RESULTS,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(tool = "tavily_search", error = %e, "Tavily search failed");
                ToolError::ExecutionFailed(format!("Tavily search error: {e}"))
            })?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Tavily search error: {e}")))?;

        if parsed.results.is_empty() {
            return Ok("No Tavily results found.".to_string());
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

    #[test]
    fn render_hits_clips_content() {
        let hits = vec![SearchHit {
            title: Some(" Attention Is All You Need ".into()),
            url: Some("https://arxiv.org/abs/1706.03762".into()),
            content: Some(format!("The   dominant\nsequence {}", "x".repeat(400))),
        }];
        let out = render_hits(&hits);
        assert!(out.starts_with(
            "- Attention Is All You Need\n  URL: https://arxiv.org/abs/1706.03762\n  The dominant sequence "
        ));
        assert!(out.ends_with("..."));
    }

    #[tokio::test]
    async fn execute_posts_query_with_academic_domains() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let raw = read_http_request(&mut stream).await;
            let body = r#"{"results":[{"title":"GRPO","url":"https://arxiv.org/abs/2402.03300","content":"Group relative"}]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            raw
        });

        let tool = TavilySearchTool::new("tvly-test", Duration::from_secs(3))
            .with_endpoint(format!("http://{addr}/search"));
        let out = tool.execute(&json!({"query": "GRPO"})).await.unwrap();
        assert_eq!(out, "- GRPO\n  URL: https://arxiv.org/abs/2402.03300\n  Group relative");

        let raw = server.await.unwrap();
        assert!(raw.contains("\"search_depth\":\"advanced\""), "got: {raw}");
        assert!(raw.contains("arxiv.org"));
        assert!(raw.contains("\"api_key\":\"tvly-test\""));
    }
}
