//! arXiv search tool.
//!
//! Queries the public Atom API (no key required) and renders each entry as a
//! `Title/Authors/Summary/URL` block.

use async_trait::async_trait;
use quick_xml::events::Event;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

use super::{clip_chars, collapse_whitespace, required_str, search_http_client, Tool};
use crate::error::ToolError;

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
const SUMMARY_MAX_CHARS: usize = 400;
const AUTHORS_MAX_CHARS: usize = 150;

/// Tool that searches arXiv by relevance.
pub struct ArxivSearchTool {
    http: reqwest::Client,
    endpoint: String,
    max_results: usize,
    categories: Vec<String>,
}

impl ArxivSearchTool {
    pub fn new(max_results: usize, categories: Vec<String>, timeout: Duration) -> Self {
        Self {
            http: search_http_client(timeout),
            endpoint: ARXIV_API_URL.to_string(),
            max_results: max_results.max(1),
            categories,
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// `all:<q>`, AND-ed with an OR of the configured categories.
    fn search_query(&self, query: &str) -> String {
        let base = format!("all:{query}");
        if self.categories.is_empty() {
            return base;
        }
        let cats = self
            .categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({base}) AND ({cats})")
    }
}

#[async_trait]
impl Tool for ArxivSearchTool {
    fn name(&self) -> &'static str {
        "arxiv_search"
    }

    fn description(&self) -> &str {
        "Search arXiv for related academic papers. Use this to find authoritative definitions, translations, and usage of technical terms in research papers."
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
        let max_results = self.max_results.to_string();
        let search_query = self.search_query(query);

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(tool = "arxiv_search", error = %e, "arXiv request failed");
                ToolError::ExecutionFailed(format!("arXiv search error: {e}"))
            })?;
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("arXiv search error: {e}")))?;

        let entries = parse_atom_feed(&body).map_err(|e| {
            warn!(tool = "arxiv_search", error = %e, "arXiv XML parse failed");
            ToolError::ExecutionFailed("arXiv response parse error.".into())
        })?;
        Ok(render_entries(&entries, self.max_results))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ArxivEntry {
    title: String,
    summary: String,
    authors: Vec<String>,
    link: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Summary,
    AuthorName,
}

/// Pull entries out of an Atom feed. Feed-level `<title>` is ignored.
fn parse_atom_feed(xml: &str) -> Result<Vec<ArxivEntry>, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "entry" => current = Some(ArxivEntry::default()),
                    "author" if current.is_some() => in_author = true,
                    "title" if current.is_some() && !in_author => field = Some(Field::Title),
                    "summary" if current.is_some() => field = Some(Field::Summary),
                    "name" if in_author => {
                        field = Some(Field::AuthorName);
                        if let Some(entry) = current.as_mut() {
                            entry.authors.push(String::new());
                        }
                    }
                    "link" => take_alternate_link(e, current.as_mut()),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"link" {
                    take_alternate_link(e, current.as_mut());
                }
            }
            Ok(Event::End(ref e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                        in_author = false;
                        field = None;
                    }
                    "author" => in_author = false,
                    "title" | "summary" | "name" => field = None,
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(f), Some(entry)) = (field, current.as_mut()) {
                    let text = e.unescape().map_err(|err| err.to_string())?;
                    match f {
                        Field::Title => entry.title.push_str(&text),
                        Field::Summary => entry.summary.push_str(&text),
                        Field::AuthorName => {
                            if let Some(last) = entry.authors.last_mut() {
                                last.push_str(&text);
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(err.to_string()),
            Ok(_) => {}
        }
        buf.clear();
    }
    Ok(entries)
}

fn take_alternate_link(e: &quick_xml::events::BytesStart<'_>, entry: Option<&mut ArxivEntry>) {
    let Some(entry) = entry else {
        return;
    };
    if !entry.link.is_empty() {
        return;
    }
    let mut rel = String::new();
    let mut href = String::new();
    for attr in e.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match attr.key.local_name().as_ref() {
            b"rel" => rel = value,
            b"href" => href = value,
            _ => {}
        }
    }
    if rel == "alternate" {
        entry.link = href;
    }
}

fn render_entries(entries: &[ArxivEntry], max_results: usize) -> String {
    if entries.is_empty() {
        return "No arXiv results found.".to_string();
    }
    entries
        .iter()
        .take(max_results)
        .map(|entry| {
            let title = collapse_whitespace(&entry.title);
            let mut summary = collapse_whitespace(&entry.summary);
            if summary.chars().count() > SUMMARY_MAX_CHARS {
                summary = format!("{}...", clip_chars(&summary, SUMMARY_MAX_CHARS));
            }
            let authors = entry
                .authors
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            let authors = clip_chars(&authors, AUTHORS_MAX_CHARS);
            format!(
                "Title: {title}\nAuthors: {authors}\nSummary: {summary}\nURL: {}",
                entry.link
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::read_http_request;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:GRPO</title>
  <entry>
    <id>http://arxiv.org/abs/2402.03300v3</id>
    <title>DeepSeekMath: Pushing the Limits of
      Mathematical Reasoning</title>
    <summary>  We introduce Group Relative Policy Optimization (GRPO) &amp; more.
    </summary>
    <author><name>Zhihong Shao</name></author>
    <author><name>Peiyi Wang</name></author>
    <link href="http://arxiv.org/abs/2402.03300v3" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2402.03300v3" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <title>Second</title>
    <summary>short</summary>
    <link href="http://arxiv.org/abs/1" rel="alternate"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_and_ignores_feed_title() {
        let entries = parse_atom_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].title.starts_with("DeepSeekMath"));
        assert_eq!(entries[0].authors, vec!["Zhihong Shao", "Peiyi Wang"]);
        assert_eq!(entries[0].link, "http://arxiv.org/abs/2402.03300v3");
        assert!(entries[0].summary.contains("(GRPO) & more."));
    }

    #[test]
    fn renders_blocks_with_collapsed_whitespace() {
        let entries = parse_atom_feed(FEED).unwrap();
        let out = render_entries(&entries, 5);
        assert!(out.starts_with(
            "Title: DeepSeekMath: Pushing the Limits of Mathematical Reasoning\nAuthors: Zhihong Shao, Peiyi Wang\n"
        ));
        assert!(out.contains("\n\nTitle: Second\n"));
        assert_eq!(out.matches("Title:").count(), 2);
    }

    #[test]
    fn long_summaries_are_clipped() {
        let entry = ArxivEntry {
            title: "t".into(),
            summary: "a".repeat(1000),
            authors: vec![],
            link: String::new(),
        };
        let out = render_entries(&[entry], 1);
        let summary_line = out.lines().find(|l| l.starts_with("Summary:")).unwrap();
        assert_eq!(summary_line.len(), "Summary: ".len() + 400 + 3);
    }

    #[test]
    fn empty_feed_reports_no_results() {
        let entries = parse_atom_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#)
            .unwrap();
        assert_eq!(render_entries(&entries, 5), "No arXiv results found.");
    }

    #[test]
    fn categories_are_or_ed_into_the_query() {
        let tool = ArxivSearchTool::new(5, vec!["cs.CL".into(), "cs.LG".into()], Duration::from_secs(1));
        assert_eq!(
            tool.search_query("GRPO"),
            "(all:GRPO) AND (cat:cs.CL OR cat:cs.LG)"
        );
    }

    #[tokio::test]
    async fn missing_query_is_invalid_arguments() {
        let tool = ArxivSearchTool::new(5, vec![], Duration::from_secs(1));
        let err = tool.execute(&json!({"query": "  "})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn execute_queries_endpoint_and_formats_feed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let raw = read_http_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/atom+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                FEED.len(),
                FEED
            );
            let _ = stream.write_all(response.as_bytes()).await;
            raw
        });

        let tool = ArxivSearchTool::new(1, vec![], Duration::from_secs(3))
            .with_endpoint(format!("http://{addr}/api/query"));
        let out = tool.execute(&json!({"query": "GRPO"})).await.unwrap();
        assert_eq!(out.matches("Title:").count(), 1);

        let raw = server.await.unwrap();
        assert!(raw.contains("search_query=all%3AGRPO"), "got: {raw}");
        assert!(raw.contains("max_results=1"));
    }

    #[tokio::test]
    async fn upstream_error_status_is_execution_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_http_request(&mut stream).await;
            let _ = stream
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        });
        let tool = ArxivSearchTool::new(1, vec![], Duration::from_secs(3))
            .with_endpoint(format!("http://{addr}/api/query"));
        let err = tool.execute(&json!({"query": "GRPO"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)), "got: {err}");
    }
}
