//! Execution of one model-requested tool call.

use super::events::{query_preview, result_count, ProgressSink, ToolActivity};
use crate::error::ToolError;
use crate::tools::{parse_arguments, ToolRegistry};
use crate::types::{Message, ToolCall};
use tracing::{debug, info};

const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Runs tool calls against a registry and shapes their results into `tool`
/// messages.
pub(crate) struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    output_limit: usize,
    sink: Option<&'a dyn ProgressSink>,
}

impl<'a> ToolDispatcher<'a> {
    pub(crate) fn new(
        registry: &'a ToolRegistry,
        output_limit: usize,
        sink: Option<&'a dyn ProgressSink>,
    ) -> Self {
        Self {
            registry,
            output_limit,
            sink,
        }
    }

    /// Execute `call` and return the `tool` message answering it.
    ///
    /// Unknown tools, calls without an id and unparseable arguments are
    /// errors, as is any failure reported by the tool itself.
    pub(crate) async fn dispatch(&self, call: &ToolCall) -> Result<Message, ToolError> {
        let name = call.function.name.as_str();
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        if call.id.trim().is_empty() {
            return Err(ToolError::MissingCallId(name.to_string()));
        }
        let args = parse_arguments(&call.function.arguments)?;
        let query = query_preview(&args);

        info!(tool = name, call_id = %call.id, query = %query, "calling tool");
        self.report(ToolActivity::calling(name, &query));
        let output = tool.execute(&args).await?;
        let count = result_count(&output);
        debug!(tool = name, chars = output.chars().count(), result_count = count, "tool finished");
        self.report(ToolActivity::done(name, &query, count));

        Ok(Message::tool_result(
            call.id.clone(),
            truncate_output(&output, self.output_limit),
        ))
    }

    fn report(&self, activity: ToolActivity) {
        if let Some(sink) = self.sink {
            sink.on_tool(activity);
        }
    }
}

/// Cut tool output to `limit` chars, marking the cut.
pub(crate) fn truncate_output(output: &str, limit: usize) -> String {
    match output.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}{TRUNCATION_MARKER}", &output[..idx]),
        None => output.to_string(),
    }
}
