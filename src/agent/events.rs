//! Tool lifecycle events.
//!
//! The loop announces every tool call twice: once before it runs and once
//! with a rough count of what it returned. Callers plug in whatever sink fits
//! their surface (a chat stream, a job's progress queue, stderr).

use serde_json::Value;
use tokio::sync::mpsc;

const QUERY_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Calling,
    Done { result_count: usize },
}

/// One lifecycle step of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolActivity {
    pub tool: String,
    /// Short preview of the query-like argument, if any.
    pub query: String,
    pub status: ToolStatus,
}

impl ToolActivity {
    pub fn calling(tool: &str, query: &str) -> Self {
        Self {
            tool: tool.to_string(),
            query: query.to_string(),
            status: ToolStatus::Calling,
        }
    }

    pub fn done(tool: &str, query: &str, result_count: usize) -> Self {
        Self {
            tool: tool.to_string(),
            query: query.to_string(),
            status: ToolStatus::Done { result_count },
        }
    }
}

/// Receives tool lifecycle events. Must not block.
pub trait ProgressSink: Send + Sync {
    fn on_tool(&self, activity: ToolActivity);
}

impl ProgressSink for mpsc::UnboundedSender<ToolActivity> {
    fn on_tool(&self, activity: ToolActivity) {
        // receiver gone means nobody is watching
        let _ = self.send(activity);
    }
}

/// Preview of the `query`, `q` or `term` argument, cut to 80 chars.
pub fn query_preview(args: &Value) -> String {
    ["query", "q", "term"]
        .iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .map(|q| q.chars().take(QUERY_PREVIEW_CHARS).collect())
        .unwrap_or_default()
}

/// Heuristic number of results in a tool's text output.
///
/// Search tools emit one `Title:` line or one `- ` bullet per hit. Anything
/// else counts as a single result unless it is empty or reports an error.
pub fn result_count(output: &str) -> usize {
    let titles = output.matches("Title:").count();
    if titles > 0 {
        return titles;
    }
    let bullets = output.matches("- ").count();
    if bullets > 0 {
        return bullets;
    }
    if !output.trim().is_empty() && !output.to_lowercase().contains("error") {
        1
    } else {
        0
    }
}
