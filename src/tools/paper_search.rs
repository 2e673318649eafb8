//! Keyword search over the project's parsed paper sections.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::capabilities::SectionScope;
use super::{required_str, PaperSection, SectionSearch, Tool};
use crate::error::ToolError;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 10;
const SNIPPET_WIDTH: usize = 260;

pub struct PaperSectionSearchTool {
    search: Arc<dyn SectionSearch>,
    paper_id: Option<String>,
}

impl PaperSectionSearchTool {
    /// `paper_id` scopes results to that paper first, then fills from the rest.
    pub fn new(search: Arc<dyn SectionSearch>, paper_id: Option<String>) -> Self {
        Self { search, paper_id }
    }
}

/// `deep-encoder`, `deep_encoder` and `deep encoder` all also try `deepencoder`.
fn keyword_needles(keyword: &str) -> Vec<String> {
    let mut needles = vec![keyword.to_string()];
    let normalized: String = keyword
        .chars()
        .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
        .collect();
    if !normalized.is_empty() && normalized.to_lowercase() != keyword.to_lowercase() {
        needles.push(normalized);
    }
    needles
}

fn parse_limit(args: &Value) -> usize {
    let raw = match args.get("limit") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match raw {
        Some(n) if n > 0 => (n as usize).min(MAX_LIMIT),
        Some(_) => 1,
        None => DEFAULT_LIMIT,
    }
}

/// A window of `width` chars centred on the first needle hit, newlines
/// flattened, with `...` on cut sides.
fn snippet(text: &str, needles: &[String], width: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let lowered: Vec<char> = text.to_lowercase().chars().collect();
    // Lowercasing can change length for a few scripts; fall back to the head.
    let hit = if lowered.len() == chars.len() {
        needles.iter().find_map(|needle| {
            let needle: Vec<char> = needle.to_lowercase().chars().collect();
            if needle.is_empty() || needle.len() > lowered.len() {
                return None;
            }
            lowered.windows(needle.len()).position(|w| w == needle.as_slice())
        })
    } else {
        None
    };

    let Some(idx) = hit else {
        return if chars.len() > width {
            format!("{}...", chars[..width].iter().collect::<String>())
        } else {
            text.to_string()
        };
    };
    let start = idx.saturating_sub(width / 2);
    let end = (idx + width / 2).min(chars.len());
    let mut out: String = chars[start..end]
        .iter()
        .map(|c| if *c == '\n' { ' ' } else { *c })
        .collect();
    if start > 0 {
        out = format!("...{out}");
    }
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

#[async_trait]
impl Tool for PaperSectionSearchTool {
    fn name(&self) -> &'static str {
        "search_paper_sections"
    }

    fn description(&self) -> &str {
        "Search paper sections by keyword within the current project.\n\
         Use this when user asks about content in the papers, like \"where does it mention X\" or \"find sections about Y\"."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "Keyword to search for in paper sections"
                },
                "limit": {
                    "type": "integer",
                    "description": "Max results (1-10, default 5)"
                }
            },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let keyword = required_str(args, "keyword")?;
        let limit = parse_limit(args);
        let needles = keyword_needles(keyword);

        let rows: Vec<PaperSection> = match self.paper_id.as_deref() {
            Some(paper_id) => {
                let mut rows = self
                    .search
                    .search_sections(&needles, SectionScope::Paper(paper_id), limit)
                    .await?;
                if rows.len() < limit {
                    let more = self
                        .search
                        .search_sections(&needles, SectionScope::OtherThan(paper_id), limit - rows.len())
                        .await?;
                    rows.extend(more);
                }
                rows
            }
            None => {
                self.search
                    .search_sections(&needles, SectionScope::All, limit)
                    .await?
            }
        };

        if rows.is_empty() {
            return Ok("No matches found.".to_string());
        }
        Ok(rows
            .iter()
            .take(limit)
            .map(|row| {
                format!(
                    "Paper: {}\nSection: {}\nSnippet: {}",
                    row.paper_title,
                    row.section_title.as_deref().unwrap_or("(untitled)"),
                    snippet(&row.content, &needles, SNIPPET_WIDTH)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSections {
        rows: Vec<(String, PaperSection)>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SectionSearch for FakeSections {
        async fn search_sections(
            &self,
            needles: &[String],
            scope: SectionScope<'_>,
            limit: usize,
        ) -> Result<Vec<PaperSection>, ToolError> {
            self.calls.lock().unwrap().push(format!("{scope:?}/{limit}"));
            Ok(self
                .rows
                .iter()
                .filter(|(paper, _)| match scope {
                    SectionScope::All => true,
                    SectionScope::Paper(id) => paper == id,
                    SectionScope::OtherThan(id) => paper != id,
                })
                .filter(|(_, s)| {
                    let hay = format!(
                        "{} {}",
                        s.section_title.as_deref().unwrap_or(""),
                        s.content
                    )
                    .to_lowercase();
                    needles.iter().any(|n| hay.contains(&n.to_lowercase()))
                })
                .take(limit)
                .map(|(_, s)| s.clone())
                .collect())
        }
    }

    fn section(paper: &str, title: Option<&str>, content: &str) -> PaperSection {
        PaperSection {
            paper_title: paper.into(),
            section_title: title.map(str::to_string),
            content: content.into(),
        }
    }

    #[test]
    fn needles_include_separator_free_variant() {
        assert_eq!(keyword_needles("deep-encoder"), vec!["deep-encoder", "deepencoder"]);
        assert_eq!(keyword_needles("attention"), vec!["attention"]);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(parse_limit(&json!({})), 5);
        assert_eq!(parse_limit(&json!({"limit": 0})), 1);
        assert_eq!(parse_limit(&json!({"limit": 50})), 10);
        assert_eq!(parse_limit(&json!({"limit": "3"})), 3);
        assert_eq!(parse_limit(&json!({"limit": "lots"})), 5);
    }

    #[test]
    fn snippet_centres_on_hit() {
        let text = format!("{}DeepEncoder\nblock{}", "a".repeat(300), "b".repeat(300));
        let out = snippet(&text, &["deepencoder".to_string()], 260);
        assert!(out.starts_with("..."));
        assert!(out.ends_with("..."));
        assert!(out.contains("DeepEncoder block"));
    }

    #[test]
    fn snippet_without_hit_returns_head() {
        assert_eq!(snippet("short text", &["zzz".to_string()], 260), "short text");
        let long = "c".repeat(300);
        assert_eq!(snippet(&long, &["zzz".to_string()], 10), format!("{}...", "c".repeat(10)));
    }

    #[tokio::test]
    async fn scoped_search_fills_from_other_papers() {
        let fake = Arc::new(FakeSections {
            rows: vec![
                ("p1".into(), section("Paper One", Some("Method"), "uses a DeepEncoder")),
                ("p2".into(), section("Paper Two", None, "another deep-encoder variant")),
            ],
            calls: Mutex::new(Vec::new()),
        });
        let tool = PaperSectionSearchTool::new(fake.clone(), Some("p1".into()));
        let out = tool
            .execute(&json!({"keyword": "deep-encoder", "limit": 2}))
            .await
            .unwrap();
        assert!(out.starts_with("Paper: Paper One\nSection: Method\nSnippet: uses a DeepEncoder"));
        assert!(out.contains("Paper: Paper Two\nSection: (untitled)"));
        assert_eq!(
            *fake.calls.lock().unwrap(),
            vec!["Paper(\"p1\")/2".to_string(), "OtherThan(\"p1\")/1".to_string()]
        );
    }

    #[tokio::test]
    async fn no_rows_reports_no_matches() {
        let fake = Arc::new(FakeSections {
            rows: vec![],
            calls: Mutex::new(Vec::new()),
        });
        let tool = PaperSectionSearchTool::new(fake, None);
        assert_eq!(
            tool.execute(&json!({"keyword": "x"})).await.unwrap(),
            "No matches found."
        );
    }
}
