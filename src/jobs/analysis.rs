//! Multi-dimensional deep analysis of one paper.
//!
//! Each dimension is an independent agent run over the same paper excerpt.
//! A dimension that errors is recorded as a short failure note; the job
//! itself only fails when the paper cannot be loaded or results cannot be
//! stored.

use super::{KnownTerm, SectionText};
use crate::agent::{Agent, AgentOptions};
use crate::api::ModelClient;
use crate::config::Config;
use crate::error::{JobError, StoreError};
use crate::progress::{HubSink, ProgressEvent, ProgressHub, StepProgress};
use crate::tools::{clip_chars, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Dimensions analyzed when a job does not pick its own.
pub const DEEP_DIMENSIONS: [&str; 7] = [
    "background_motivation",
    "core_innovations",
    "methodology_details",
    "formula_analysis",
    "experiments_results",
    "advantages_limitations",
    "future_directions",
];

const DIMENSION_STEPS: usize = 6;
const DIMENSION_TEMPERATURE: f64 = 0.2;
const DIMENSION_MAX_TOKENS: u32 = 3500;

const EXCERPT_CHARS: usize = 18_000;
const MAX_LISTED_ITEMS: usize = 20;
const FORMULA_CHARS: usize = 300;
const CAPTION_CHARS: usize = 200;
const MAX_MEMORY_TERMS: usize = 30;
const DEFINITION_CHARS: usize = 80;
const MAX_RELATED_PAPERS: usize = 5;
const RELATED_ABSTRACT_CHARS: usize = 300;
const FAILURE_NOTE_CHARS: usize = 100;

/// Heading and task for one dimension.
fn dimension_meta(key: &str) -> (&str, &'static str) {
    match key {
        "background_motivation" => (
            "研究背景与动机",
            "补充领域背景、问题动机、研究空白；必要时用工具搜索2-4篇强相关工作并给出URL。",
        ),
        "core_innovations" => (
            "核心创新点（3-5个）",
            "列出3-5条创新点，每条包含：是什么、为什么重要、与已有方法对比。",
        ),
        "methodology_details" => (
            "方法论详解（流程/架构）",
            "给出整体流程、关键模块/网络结构、训练与推理细节；必要时用伪代码/列表描述。",
        ),
        "formula_analysis" => (
            "关键公式解析（含义/推导/作用）",
            "选择最关键的公式（优先有page的），逐个解释含义、（可选）推导思路、在方法中的作用。",
        ),
        "experiments_results" => (
            "实验设计与结果（数据集/指标/对比）",
            "提取数据集、评价指标、对比方法、主要结论；如有表/图资产，引用page并总结。",
        ),
        "advantages_limitations" => (
            "优势与局限性",
            "分别列优势与局限；局限需具体到假设/数据/计算/泛化等维度。",
        ),
        "future_directions" => (
            "未来研究方向（论文+AI推断）",
            "先列论文明确提出的方向，再给AI推断的2-4条可行方向（并说明理由）。",
        ),
        other => (other, ""),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRef {
    pub latex: String,
    pub page: Option<u32>,
}

/// A figure or table extracted from the paper.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub kind: String,
    pub label: Option<String>,
    pub caption: Option<String>,
    pub page: Option<u32>,
}

/// Another paper in the same project, for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedPaper {
    pub title: String,
    pub abstract_text: Option<String>,
}

/// Everything a deep analysis reads about its paper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisInput {
    pub title: String,
    pub abstract_text: Option<String>,
    pub domain: String,
    pub sections: Vec<SectionText>,
    pub formulas: Vec<FormulaRef>,
    pub assets: Vec<AssetRef>,
    pub term_memory: Vec<KnownTerm>,
    pub related: Vec<RelatedPaper>,
}

/// Result of one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionOutcome {
    pub dimension: String,
    pub title: String,
    pub summary: String,
}

/// Persistence for analysis jobs.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn load_input(&self, paper_id: Uuid) -> Result<Option<AnalysisInput>, StoreError>;
    async fn save_dimension(&self, job_id: Uuid, result: &DimensionOutcome) -> Result<(), StoreError>;
    async fn save_report(
        &self,
        job_id: Uuid,
        report_md: &str,
        dimensions: &[String],
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisJob {
    pub job_id: Uuid,
    pub paper_id: Uuid,
    /// Empty means all of [`DEEP_DIMENSIONS`].
    pub dimensions: Vec<String>,
}

impl AnalysisJob {
    fn dimensions(&self) -> Vec<String> {
        if self.dimensions.is_empty() {
            DEEP_DIMENSIONS.iter().map(|d| d.to_string()).collect()
        } else {
            self.dimensions.clone()
        }
    }
}

/// Agent configured for dimension runs, reporting tool activity to the job.
pub fn analysis_agent(
    client: Arc<dyn ModelClient>,
    config: &Config,
    tools: ToolRegistry,
    hub: Arc<ProgressHub>,
    job_id: Uuid,
) -> Agent {
    let options = AgentOptions {
        max_steps: DIMENSION_STEPS,
        temperature: DIMENSION_TEMPERATURE,
        max_tokens: Some(DIMENSION_MAX_TOKENS),
        ..AgentOptions::from_config(config)
    };
    Agent::new(client, config.api.model.clone(), tools, options)
        .with_progress(Arc::new(HubSink::new(hub, job_id)))
}

/// Run every dimension of `job` and store the composed report.
pub async fn run_deep_analysis(
    job: &AnalysisJob,
    agent: &Agent,
    store: &dyn AnalysisStore,
    hub: &ProgressHub,
) -> Result<String, JobError> {
    let input = store
        .load_input(job.paper_id)
        .await?
        .ok_or_else(|| JobError::NotFound(format!("paper {}", job.paper_id)))?;

    let dimensions = job.dimensions();
    let total = dimensions.len();
    let excerpt = truncate_head_tail(&paper_text(&input), EXCERPT_CHARS);
    let formulas = format_formulas(&input.formulas);
    let assets = format_assets(&input.assets);
    let memory = format_term_memory(&input.term_memory);
    let related = format_related(&input.related);
    let tool_names = agent.tool_names();
    let tool_names = if tool_names.is_empty() {
        "无".to_string()
    } else {
        tool_names.join(", ")
    };
    let system = system_prompt(&input.domain, &tool_names);
    info!(job_id = %job.job_id, dimensions = total, "deep analysis started");

    let mut results = Vec::with_capacity(total);
    for (idx, dimension) in dimensions.iter().enumerate() {
        let index = idx + 1;
        let (title, instruction) = dimension_meta(dimension);
        hub.publish(
            job.job_id,
            StepProgress::new("dimension_start", index, total)
                .dimension(dimension, title)
                .into(),
        );

        let prompt = user_prompt(&DimensionPrompt {
            title,
            index,
            total,
            instruction,
            excerpt: &excerpt,
            formulas: &formulas,
            assets: &assets,
            memory: &memory,
            related: &related,
        });
        let summary = match agent.run(&system, &prompt).await {
            Ok(outcome) => outcome.into_answer(),
            Err(err) => {
                warn!(job_id = %job.job_id, dimension = %dimension, error = %err, "dimension analysis failed");
                format!("*[分析失败: {}]*", clip_chars(&err.to_string(), FAILURE_NOTE_CHARS))
            }
        };

        let outcome = DimensionOutcome {
            dimension: dimension.clone(),
            title: title.to_string(),
            summary,
        };
        store.save_dimension(job.job_id, &outcome).await?;
        hub.publish(
            job.job_id,
            ProgressEvent::DimensionResult {
                dimension: outcome.dimension.clone(),
                dimension_title: outcome.title.clone(),
                summary: outcome.summary.clone(),
            },
        );
        results.push(outcome);
    }

    let report = compose_report(&input.title, &results);
    store.save_report(job.job_id, &report, &dimensions).await?;
    info!(job_id = %job.job_id, chars = report.chars().count(), "deep analysis report stored");
    Ok(report)
}

fn system_prompt(domain: &str, tool_names: &str) -> String {
    let domain = domain.trim();
    let hint = if domain.is_empty() {
        String::new()
    } else {
        format!("领域：{domain}。")
    };
    format!(
        "你是资深学术论文深度解析专家。{hint}可用工具：{tool_names}。\
         输出必须为中文Markdown（可包含HTML <details>/<summary> 用于折叠），不要输出与任务无关内容。"
    )
}

struct DimensionPrompt<'a> {
    title: &'a str,
    index: usize,
    total: usize,
    instruction: &'a str,
    excerpt: &'a str,
    formulas: &'a str,
    assets: &'a str,
    memory: &'a str,
    related: &'a str,
}

fn user_prompt(p: &DimensionPrompt<'_>) -> String {
    format!(
        "请完成第 {index}/{total} 个维度：{title}\n\n\
         输出格式（必须）：<details open><summary>{index}. {title}</summary>\n\n\
         ...正文Markdown...\n\n\
         </details>\n\n\
         要求：\n\
         - {instruction}\n\
         - 使用项目术语记忆保持一致性（术语尽量保留英文原词，必要时括号给中文释义）。\n\
         - 结论尽量给出证据/引用（见下方页码链接规范）。\n\
         - 如需补充背景/对比，请调用搜索工具；外部信息必须给出可点击URL。\n\
         - 引用论文页码请用链接格式：[p.3](papermate://pdf?page=3)。若无法确定页码可省略。\n\n\
         项目术语记忆（截断）：\n{memory}\n\n\
         项目内其他论文（用于对比，截断）：\n{related}\n\n\
         公式清单（若有page，优先用于公式解析维度）：\n{formulas}\n\n\
         图表/资产清单（若有page，优先用于实验维度）：\n{assets}\n\n\
         论文内容摘录（头尾截断）：\n{excerpt}\n",
        index = p.index,
        total = p.total,
        title = p.title,
        instruction = p.instruction,
        memory = p.memory,
        related = p.related,
        formulas = p.formulas,
        assets = p.assets,
        excerpt = p.excerpt,
    )
}

fn paper_text(input: &AnalysisInput) -> String {
    let mut parts = vec![format!("Title: {}", input.title)];
    if let Some(abstract_text) = input.abstract_text.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        parts.push(format!("Abstract: {abstract_text}"));
    }
    for section in &input.sections {
        let body = section.content.trim();
        if body.is_empty() {
            continue;
        }
        let title = section.title.as_deref().unwrap_or("Section");
        parts.push(format!("## {title}\n{body}"));
    }
    parts.join("\n\n")
}

/// Keep the first and last `max_chars / 2` chars of long text.
fn truncate_head_tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let len = text.chars().count();
    if len <= max_chars {
        return text.to_string();
    }
    let half = max_chars / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(len - half).collect();
    format!("{head}\n\n...[TRUNCATED]...\n\n{tail}")
}

fn single_line(text: &str, max_chars: usize) -> String {
    clip_chars(&text.trim().replace('\n', " "), max_chars)
}

fn page_label(page: Option<u32>) -> String {
    page.map_or_else(|| "?".to_string(), |p| p.to_string())
}

fn format_formulas(formulas: &[FormulaRef]) -> String {
    let lines: Vec<String> = formulas
        .iter()
        .take(MAX_LISTED_ITEMS)
        .enumerate()
        .filter(|(_, f)| !f.latex.trim().is_empty())
        .map(|(i, f)| {
            format!(
                "- F{} (p.{}): {}",
                i + 1,
                page_label(f.page),
                single_line(&f.latex, FORMULA_CHARS)
            )
        })
        .collect();
    if lines.is_empty() {
        "无".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_assets(assets: &[AssetRef]) -> String {
    let lines: Vec<String> = assets
        .iter()
        .take(MAX_LISTED_ITEMS)
        .map(|a| {
            let caption = a
                .caption
                .as_deref()
                .map(|c| single_line(c, CAPTION_CHARS))
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "N/A".to_string());
            format!(
                "- {} {} (p.{}): {caption}",
                a.kind,
                a.label.as_deref().unwrap_or("").trim(),
                page_label(a.page)
            )
        })
        .collect();
    if lines.is_empty() {
        "无".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_term_memory(terms: &[KnownTerm]) -> String {
    let lines: Vec<String> = terms
        .iter()
        .filter(|t| !t.translation.trim().is_empty())
        .take(MAX_MEMORY_TERMS)
        .map(|t| {
            let zh = t.translation.trim();
            match t.definition.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                Some(def) => format!("- {} -> {zh}（{}）", t.phrase, single_line(def, DEFINITION_CHARS)),
                None => format!("- {} -> {zh}", t.phrase),
            }
        })
        .collect();
    if lines.is_empty() {
        "无".to_string()
    } else {
        lines.join("\n")
    }
}

fn format_related(papers: &[RelatedPaper]) -> String {
    let lines: Vec<String> = papers
        .iter()
        .take(MAX_RELATED_PAPERS)
        .map(|p| {
            let abstract_text = p
                .abstract_text
                .as_deref()
                .map(|a| single_line(a, RELATED_ABSTRACT_CHARS))
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| "N/A".to_string());
            format!("- {}\n  Abstract: {abstract_text}", p.title)
        })
        .collect();
    if lines.is_empty() {
        "无".to_string()
    } else {
        lines.join("\n")
    }
}

fn compose_report(title: &str, results: &[DimensionOutcome]) -> String {
    let body = results
        .iter()
        .map(|r| r.summary.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("# 深度解析报告\n\n**论文**：{title}\n\n{body}")
        .trim()
        .to_string()
}
