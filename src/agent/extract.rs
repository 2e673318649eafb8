//! Answer recovery from provider reasoning channels.
//!
//! Reasoning models sometimes leave `content` empty and put the whole answer
//! into `reasoning_content`. The extractors below try, in priority order, to
//! pull a usable final answer out of that text. Every extractor returns
//! `None` on a miss; the chain stops at the first hit and yields `None` when
//! all of them miss, so callers can fall through to their retry logic instead
//! of surfacing half-finished thinking.

use crate::types::{content_value_to_text, Message};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Reasoning fields checked on buffered messages, in priority order.
const REASONING_KEYS: &[&str] = &["reasoning_content", "reasoning"];

/// Paragraph openers that mark stream-of-consciousness rather than an answer.
const THINKING_STEMS: &[&str] = &[
    "okay",
    "alright",
    "let me",
    "i'm",
    "i need",
    "i think",
    "first",
    "so,",
    "now,",
    "hmm",
    "well,",
    "好的",
    "让我",
    "首先",
    "那么",
    "**deciphering",
    "**formulating",
    "**clarifying",
    "**refining",
    "**defining",
];

type Extractor = fn(&str) -> Option<String>;

const EXTRACTORS: &[(&str, Extractor)] = &[
    ("final_tag", final_tag),
    ("zh_marker", chinese_marker),
    ("en_marker", english_marker),
    ("cjk_block", longest_cjk_block),
    ("paragraph", last_substantial_paragraph),
];

/// Compile a constant pattern once. A pattern that fails to compile simply
/// disables its extractor.
fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Run the extractor chain over reasoning text.
pub fn extract_from_reasoning(reasoning: &str) -> Option<String> {
    if reasoning.trim().is_empty() {
        return None;
    }
    for (name, extractor) in EXTRACTORS {
        if let Some(found) = extractor(reasoning) {
            info!(extractor = *name, chars = found.chars().count(), "recovered answer from reasoning");
            return Some(found);
        }
    }
    debug!(chars = reasoning.chars().count(), "no answer found in reasoning");
    None
}

fn final_tag(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(&RE, r"(?is)<final[^>]*>(.*?)</final>")?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(m.as_str()))
}

fn chinese_marker(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(
        &RE,
        r"(?i)(?:最终答案|最终回复|回复内容|答案)\s*[:：]\s*([\s\S]+?)(?:\n\n|$)",
    )?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(m.as_str()))
}

fn english_marker(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(
        &RE,
        r"(?i)(?:Final Answer|Answer|Response)\s*[:：]\s*([\s\S]+?)(?:\n\n|$)",
    )?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| non_empty(m.as_str()))
}

/// Longest single-line CJK run that ends in CJK text or CJK punctuation.
fn longest_cjk_block(text: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = cached(
        &RE,
        r"[\x{4e00}-\x{9fff}][^\n]*[\x{4e00}-\x{9fff}。！？][^\n]*",
    )?;
    let best = re
        .find_iter(text)
        .map(|m| m.as_str())
        .max_by_key(|block| block.chars().count())?;
    if best.chars().count() > 30 {
        non_empty(best)
    } else {
        None
    }
}

fn cjk_char_count(text: &str) -> usize {
    text.chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count()
}

/// Last paragraph that does not open with a thinking stem and carries some
/// substance.
fn last_substantial_paragraph(text: &str) -> Option<String> {
    text.rsplit("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .find(|para| {
            let lower = para.to_lowercase();
            !THINKING_STEMS.iter().any(|stem| lower.starts_with(stem))
                && (cjk_char_count(para) > 20 || para.chars().count() > 50)
        })
        .map(str::to_string)
}

/// Remove hidden reasoning blocks and bare `<final>` tags, keeping all other
/// characters (including surrounding whitespace) intact.
pub fn remove_thinking_markup(text: &str) -> String {
    static BLOCKS: OnceLock<Option<Regex>> = OnceLock::new();
    static FINAL: OnceLock<Option<Regex>> = OnceLock::new();
    let mut cleaned = text.to_string();
    if let Some(re) = cached(
        &BLOCKS,
        r"(?i)<thinking[^>]*>[\s\S]*?</thinking>|<think[^>]*>[\s\S]*?</think>|<reasoning[^>]*>[\s\S]*?</reasoning>|<analysis[^>]*>[\s\S]*?</analysis>",
    ) {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    if let Some(re) = cached(&FINAL, r"(?i)</?final[^>]*>") {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    cleaned
}

/// [`remove_thinking_markup`] followed by a trim.
pub fn strip_thinking(text: &str) -> String {
    remove_thinking_markup(text).trim().to_string()
}

/// Reasoning text carried on a buffered assistant message, if any.
pub fn reasoning_of(message: &Message) -> Option<String> {
    REASONING_KEYS
        .iter()
        .filter_map(|key| message.extra.get(*key))
        .filter_map(content_value_to_text)
        .find(|text| !text.trim().is_empty())
}
