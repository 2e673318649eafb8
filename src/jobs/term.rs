//! Short contextual explanation of one term.

use crate::agent::extract::strip_thinking;
use crate::agent::{Agent, AgentOptions};
use crate::api::ModelClient;
use crate::config::Config;
use crate::error::AgentError;
use crate::tools::ToolRegistry;
use std::sync::Arc;
use tracing::{info, warn};

const TOOL_STEPS: usize = 3;
const TOOLLESS_STEPS: usize = 2;
const TOOL_OUTPUT_LIMIT: usize = 2000;
const MAX_TOOL_MESSAGES: usize = 4;
const TEMPERATURE: f64 = 0.2;
const MAX_TOKENS: u32 = 300;
const MAX_CONTEXT_PARAGRAPHS: usize = 5;

/// What the explanation is grounded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermRequest {
    pub phrase: String,
    pub domain: Option<String>,
    pub paper_title: Option<String>,
    /// Surrounding text; falls back to `paper_abstract` when empty.
    pub context: Option<String>,
    pub paper_abstract: Option<String>,
}

/// Explain `request.phrase` in context.
///
/// A tool-enabled run goes first; when it yields nothing a second run with
/// tools disabled is tried, and if that is empty too a fixed placeholder is
/// returned.
pub async fn explain_term(
    client: Arc<dyn ModelClient>,
    config: &Config,
    tools: ToolRegistry,
    request: &TermRequest,
) -> Result<String, AgentError> {
    let base = AgentOptions {
        temperature: TEMPERATURE,
        max_tokens: Some(MAX_TOKENS),
        ..AgentOptions::from_config(config)
    };
    let tool_hint = if tools.is_empty() {
        "无".to_string()
    } else {
        tools.names().join("、")
    };
    let system = format!(
        "你是学术论文术语解释助手。可使用检索工具：{tool_hint}。\
         优先根据上下文判断，不确定再检索。输出80-120字简体中文解释，不要输出思考过程。\
         如果模型会输出推理内容，请把最终答案放在 <final>...</final> 内。"
    );
    let user = user_prompt(request);

    let with_tools = Agent::new(
        client.clone(),
        config.api.model.clone(),
        tools.clone(),
        AgentOptions {
            max_steps: TOOL_STEPS,
            tool_output_limit: TOOL_OUTPUT_LIMIT,
            max_tool_messages: MAX_TOOL_MESSAGES,
            ..base.clone()
        },
    );
    let mut explanation = match with_tools.run(&system, &user).await {
        Ok(outcome) => outcome.into_answer(),
        Err(err) => {
            warn!(term = %request.phrase, error = %err, "tool run failed");
            String::new()
        }
    };

    if explanation.trim().is_empty() {
        warn!(term = %request.phrase, "tool run gave no explanation; retrying without tools");
        let toolless = Agent::new(
            client,
            config.api.model.clone(),
            tools,
            AgentOptions {
                max_steps: TOOLLESS_STEPS,
                disable_tools: true,
                ..base
            },
        );
        explanation = toolless.run(&system, &user).await?.into_answer();
    }

    let explanation = strip_thinking(&explanation);
    if explanation.is_empty() {
        warn!(term = %request.phrase, "no explanation available");
        return Ok(format!("术语 {} 的解释暂时无法获取。", request.phrase));
    }
    info!(term = %request.phrase, chars = explanation.chars().count(), "term explained");
    Ok(explanation)
}

fn user_prompt(request: &TermRequest) -> String {
    let context = request
        .context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .or(request.paper_abstract.as_deref())
        .unwrap_or("");
    let block = context_paragraphs(context, MAX_CONTEXT_PARAGRAPHS)
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[段落{}] {p}", i + 1))
        .collect::<Vec<_>>()
        .join("\n\n");
    let block = if block.is_empty() { "（无）".to_string() } else { block };
    format!(
        "术语：{}\n论文领域: {}\n论文标题: {}\n上下文（3-5段）：\n{block}\n\n请解释该术语在上下文中的含义。",
        request.phrase,
        request.domain.as_deref().filter(|d| !d.is_empty()).unwrap_or("通用/未知"),
        request.paper_title.as_deref().filter(|t| !t.is_empty()).unwrap_or("未知"),
    )
}

/// Blank-line separated paragraphs with whitespace collapsed.
fn context_paragraphs(text: &str, max: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(crate::tools::collapse_whitespace(&current.join(" ")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(crate::tools::collapse_whitespace(&current.join(" ")));
    }
    paragraphs.truncate(max);
    paragraphs
}
