//! User-facing degraded answers and corrective prompts.

use crate::config::Locale;
use crate::types::{Message, Role};

const MAX_EVIDENCE_OUTPUTS: usize = 5;
const MAX_EVIDENCE_BLOCKS: usize = 3;
const EVIDENCE_MAX_CHARS: usize = 700;
const EVIDENCE_MAX_LINES: usize = 12;

/// Appended as a user message when a round produced no visible answer.
pub fn empty_retry_prompt(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => {
            "【重要】你必须在content字段中直接输出回答，不能只在思考过程中回答。\
             请现在直接用中文回答用户的问题，不要再思考，直接输出最终答案。"
        }
        Locale::En => {
            "[IMPORTANT] You must put your answer directly in the content field, not only in your reasoning. \
             Answer the user's question now, in English, without further thinking. Output the final answer only."
        }
    }
}

/// Returned when nothing usable was produced and no tool ran.
pub fn generic_failure(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => "抱歉，我没有生成有效的回复。请尝试重新发送问题。",
        Locale::En => "Sorry, I could not produce a valid reply. Please try sending your question again.",
    }
}

pub fn empty_content_reason(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => "模型返回空内容，无法生成最终回答；",
        Locale::En => "The model returned empty content and could not produce a final answer; ",
    }
}

pub fn connection_reason(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => "模型连接失败，无法继续生成完整回答；",
        Locale::En => "The connection to the model failed before a complete answer was generated; ",
    }
}

/// Reason prefix for an HTTP error status from the completion endpoint.
pub fn http_status_reason(code: u16, locale: Locale) -> String {
    let detail = match (locale, code) {
        (Locale::Zh, 429) => "API 调用频率超限（429 Too Many Requests），请稍后重试或检查配额".to_string(),
        (Locale::Zh, 401) => "API Key 无效（401 Unauthorized），请检查设置".to_string(),
        (Locale::Zh, 403) => "API 访问被拒绝（403 Forbidden），请检查权限".to_string(),
        (Locale::Zh, 500) => "API 服务器错误（500 Internal Server Error），请稍后重试".to_string(),
        (Locale::Zh, 503) => "API 服务暂时不可用（503 Service Unavailable），请稍后重试".to_string(),
        (Locale::Zh, other) => format!("API 请求失败（HTTP {other}）"),
        (Locale::En, 429) => "API rate limit exceeded (429 Too Many Requests), retry later or check your quota".to_string(),
        (Locale::En, 401) => "Invalid API key (401 Unauthorized), check your settings".to_string(),
        (Locale::En, 403) => "API access denied (403 Forbidden), check your permissions".to_string(),
        (Locale::En, 500) => "API server error (500 Internal Server Error), retry later".to_string(),
        (Locale::En, 503) => "API temporarily unavailable (503 Service Unavailable), retry later".to_string(),
        (Locale::En, other) => format!("API request failed (HTTP {other})"),
    };
    match locale {
        Locale::Zh => format!("{detail}；"),
        Locale::En => format!("{detail}; "),
    }
}

/// Non-empty tool outputs in the conversation, most recent `limit` kept.
fn collect_tool_outputs(messages: &[Message], limit: usize) -> Vec<&str> {
    let outputs: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.text().trim())
        .filter(|text| !text.is_empty())
        .collect();
    let skip = outputs.len().saturating_sub(limit);
    outputs.into_iter().skip(skip).collect()
}

/// First `max_lines` non-blank lines, cut to `max_chars` with `...`.
pub(crate) fn compact_text(text: &str, max_chars: usize, max_lines: usize) -> String {
    let compact = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::trim_end)
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    let compact = compact.trim();
    if compact.chars().count() > max_chars {
        let head: String = compact.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head.trim_end())
    } else {
        compact.to_string()
    }
}

/// Degraded answer built from excerpts of recent tool outputs.
///
/// Without any tool output this is just `reason` plus a resend hint.
pub fn fallback_from_tools(messages: &[Message], reason: &str, locale: Locale) -> String {
    let outputs = collect_tool_outputs(messages, MAX_EVIDENCE_OUTPUTS);
    if outputs.is_empty() {
        return match locale {
            Locale::Zh => format!("{reason}请稍后点击“重新发送”重试。"),
            Locale::En => format!("{reason}please click \"Resend\" to try again later."),
        };
    }

    let evidence = outputs
        .iter()
        .take(MAX_EVIDENCE_BLOCKS)
        .map(|text| compact_text(text, EVIDENCE_MAX_CHARS, EVIDENCE_MAX_LINES))
        .collect::<Vec<_>>()
        .join("\n\n");
    match locale {
        Locale::Zh => format!(
            "{reason}我先根据已完成的工具检索结果给出临时说明（节选）：\n\n{evidence}\n\n\
             （你可以稍后点击“重新发送”再试一次，通常网络/代理恢复后即可正常回答。）"
        ),
        Locale::En => format!(
            "{reason}here is a provisional summary based on the tool results gathered so far (excerpt):\n\n{evidence}\n\n\
             (You can click \"Resend\" later; it usually works again once the network or proxy recovers.)"
        ),
    }
}
