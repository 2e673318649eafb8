//! Section-by-section paper translation.
//!
//! Sections are translated in order by a short tool-enabled agent run each.
//! The markdown document is persisted after every section so a reconnecting
//! client can be sent a snapshot of the work so far.

use super::{KnownTerm, SectionText};
use crate::agent::{Agent, AgentOptions};
use crate::api::ModelClient;
use crate::config::Config;
use crate::error::{JobError, StoreError};
use crate::progress::{HubSink, ProgressEvent, ProgressHub, StepProgress};
use crate::tools::{clip_chars, ToolRegistry};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const SECTION_STEPS: usize = 3;
const SECTION_TEMPERATURE: f64 = 0.1;
const MAX_MEMORY_TERMS: usize = 30;
const MEMORY_PROMPT_CHARS: usize = 400;
const SOURCE_EXCERPT_CHARS: usize = 500;
const FAILURE_NOTE_CHARS: usize = 100;
const EVENT_ERROR_CHARS: usize = 200;

/// Everything a translation job reads about its paper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationInput {
    pub title: String,
    /// Empty when the project has no declared domain.
    pub domain: String,
    pub target_language: String,
    pub sections: Vec<SectionText>,
    pub term_memory: Vec<KnownTerm>,
}

/// Persistence for translation jobs.
#[async_trait]
pub trait TranslationStore: Send + Sync {
    async fn load_input(&self, paper_id: Uuid) -> Result<Option<TranslationInput>, StoreError>;
    /// Replace the stored document with `content_md`.
    async fn save_content(&self, translation_id: Uuid, content_md: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationJob {
    pub translation_id: Uuid,
    pub paper_id: Uuid,
}

/// Snapshot event for a consumer joining mid-translation.
pub fn snapshot_event(content_md: &str) -> Option<ProgressEvent> {
    if content_md.is_empty() {
        return None;
    }
    let mut body = Map::new();
    body.insert("content_md".into(), Value::String(content_md.to_string()));
    Some(ProgressEvent::Snapshot(body))
}

/// Agent configured for section runs, reporting tool activity to the job.
pub fn translation_agent(
    client: Arc<dyn ModelClient>,
    config: &Config,
    tools: ToolRegistry,
    hub: Arc<ProgressHub>,
    translation_id: Uuid,
) -> Agent {
    let options = AgentOptions {
        max_steps: SECTION_STEPS,
        temperature: SECTION_TEMPERATURE,
        ..AgentOptions::from_config(config)
    };
    Agent::new(client, config.api.model.clone(), tools, options)
        .with_progress(Arc::new(HubSink::new(hub, translation_id)))
}

/// Why one section could not be translated.
#[derive(Debug)]
enum SectionFailure {
    Agent(crate::error::AgentError),
    Empty,
}

impl fmt::Display for SectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(e) => write!(f, "{e}"),
            Self::Empty => write!(f, "empty translation"),
        }
    }
}

/// Translate every section of the paper and return the final markdown.
pub async fn run_translation(
    job: &TranslationJob,
    agent: &Agent,
    store: &dyn TranslationStore,
    hub: &ProgressHub,
) -> Result<String, JobError> {
    let id = job.translation_id;
    let input = store
        .load_input(job.paper_id)
        .await?
        .ok_or_else(|| JobError::NotFound(format!("paper {}", job.paper_id)))?;

    let total = input.sections.len();
    let target = target_label(&input.target_language);
    let memory = memory_lines(&input.term_memory);
    let system = system_prompt(&input.domain, &agent.tool_names());
    info!(translation_id = %id, sections = total, "translation started");
    hub.publish(id, StepProgress::new("start", 0, total).into());

    let mut parts: Vec<String> = Vec::new();
    for (idx, section) in input.sections.iter().enumerate() {
        let index = idx + 1;
        let title = section
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Section {index}"));
        let source = section.content.as_str();

        if source.trim().is_empty() {
            hub.publish(id, StepProgress::new("skip_empty", index, total).section(&title).into());
            continue;
        }
        hub.publish(id, StepProgress::new("translating", index, total).section(&title).into());

        let prompt = format!(
            "《{}》{title}。\n术语：{}\n\n翻译为{target}：\n{source}",
            input.title,
            clip_chars(&memory, MEMORY_PROMPT_CHARS)
        );
        match translate_section(agent, &system, &prompt).await {
            Ok(translated) => parts.push(format!("## {title}\n\n{}\n", translated.trim())),
            Err(failure) => {
                warn!(translation_id = %id, section = %title, error = %failure, "section translation failed");
                let message = failure.to_string();
                parts.push(format!(
                    "## {title}\n\n*[翻译失败: {}]*\n\n{}...\n",
                    clip_chars(&message, FAILURE_NOTE_CHARS),
                    clip_chars(source, SOURCE_EXCERPT_CHARS)
                ));
                hub.publish(
                    id,
                    ProgressEvent::SectionError {
                        section_title: title.clone(),
                        error: clip_chars(&message, EVENT_ERROR_CHARS),
                    },
                );
            }
        }

        store.save_content(id, &parts.join("\n\n")).await?;
        hub.publish(id, StepProgress::new("section_done", index, total).section(&title).into());
    }

    let content = parts.join("\n\n");
    info!(translation_id = %id, chars = content.chars().count(), "translation finished");
    Ok(content)
}

async fn translate_section(agent: &Agent, system: &str, prompt: &str) -> Result<String, SectionFailure> {
    let outcome = agent.run(system, prompt).await.map_err(SectionFailure::Agent)?;
    let text = outcome.into_answer();
    if text.trim().is_empty() {
        return Err(SectionFailure::Empty);
    }
    Ok(text)
}

fn target_label(language: &str) -> String {
    if language.is_empty() || language.starts_with("zh") {
        "中文".to_string()
    } else {
        language.to_string()
    }
}

fn memory_lines(terms: &[KnownTerm]) -> String {
    let lines: Vec<String> = terms
        .iter()
        .filter(|t| !t.translation.trim().is_empty())
        .take(MAX_MEMORY_TERMS)
        .map(|t| format!("- {} -> {}", t.phrase, t.translation.trim()))
        .collect();
    if lines.is_empty() {
        "无".to_string()
    } else {
        lines.join("\n")
    }
}

fn system_prompt(domain: &str, tool_names: &[&str]) -> String {
    let domain = match domain.trim() {
        "" => "学术",
        d => d,
    };
    let tools = if tool_names.is_empty() {
        "无".to_string()
    } else {
        tool_names.join(", ")
    };
    format!(
        "你是{domain}领域的学术论文翻译专家，使用ReAct架构工作。\n\n\
         可用工具：{tools}\n\n\
         **翻译流程（严格遵循）**：\n\
         1. 识别专业术语：扫描文本，提取领域专业术语（非通用词汇）\n\
         2. 查询术语用法：遇到重要术语时，使用搜索工具了解学术界标准用法；参考\"项目术语记忆\"保持翻译一致性\n\
         3. 生成翻译：术语保留英文原词，括号注中文，如\"Reinforcement Learning（强化学习）\"；输出纯Markdown，无额外说明\n\n\
         **重要**：\n\
         - 公式、代码块、图片和链接必须原样保留\n\
         - 已有项目记忆的术语，必须使用记忆中的翻译保持一致性\n\
         - 输出仅包含译文，不要输出工具调用过程或思考过程"
    )
}
