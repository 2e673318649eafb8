//! Learner-intent signals in chat messages.
//!
//! A short message like "我懂了" or "this is confusing" says something about
//! the user's grasp of the current topic. When one is detected the session
//! injects a system message asking the model to record it through
//! `update_user_profile`.

use crate::types::Message;
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Difficulty,
    Mastery,
    BeginnerQuestion,
}

const DIFFICULTY_PATTERNS: &[&str] = &[
    r"(不太|没|不|还是不|仍然不)(明白|懂|理解|清楚)",
    r"(有点|太|好|很|挺)(难|深奥|复杂|抽象|绕)",
    r"(看|听|读)(不太?懂|不明白)",
    r"(confused|confusing)",
    r"hard\s+to\s+(understand|follow|grasp)",
    r"(don'?t|doesn'?t|didn'?t)\s+(understand|get)",
    r"(lost|struggling)",
    r"没太?看懂",
    r"能.{0,4}(再|重新).{0,4}(解释|说明|讲)",
    r"^(这|啥|什么)什么意思[？?]?$",
];

const MASTERY_PATTERNS: &[&str] = &[
    r"(我?)(明白|懂|学会|理解|清楚|掌握|会)了",
    r"原来如此",
    r"恍然大悟",
    r"茅塞顿开",
    r"(it'?s|that'?s)\s+(clear|clearer)",
    r"i\s+(understand|get\s+it|got\s+it)",
    r"makes?\s+sense",
    r"now\s+i\s+(see|know|understand)",
];

const BEGINNER_PATTERNS: &[&str] = &[
    r"^(什么是|啥是)[A-Za-z\x{4e00}-\x{9fa5}]{1,15}[？?]?$",
    r"^[A-Za-z]{2,20}(是什么|是啥)[？?]?$",
    r"^(what\s+is|what'?s)\s+[a-zA-Z\s]{2,30}\??$",
    r"^(can\s+you\s+explain|please\s+explain)\s+[a-zA-Z\s]{2,30}\??$",
    r"^(能|可以)(解释|说明|介绍)(一下)?[A-Za-z]{2,15}(吗)?[？?]?$",
];

/// Families in priority order: confusion outranks understanding, which
/// outranks a plain beginner question.
fn families() -> &'static [(Signal, Vec<Regex>)] {
    static FAMILIES: OnceLock<Vec<(Signal, Vec<Regex>)>> = OnceLock::new();
    FAMILIES.get_or_init(|| {
        [
            (Signal::Difficulty, DIFFICULTY_PATTERNS),
            (Signal::Mastery, MASTERY_PATTERNS),
            (Signal::BeginnerQuestion, BEGINNER_PATTERNS),
        ]
        .into_iter()
        .map(|(signal, patterns)| {
            let compiled = patterns
                .iter()
                .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
                .collect();
            (signal, compiled)
        })
        .collect()
    })
}

/// Strongest signal in `text`, if any.
pub fn detect(text: &str) -> Option<Signal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    families()
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
        .map(|(signal, _)| *signal)
}

fn prompt_for(signal: Signal) -> &'static str {
    match signal {
        Signal::Mastery => {
            "【系统提示】检测到用户明确表示'理解了/学会了'。\
             请务必调用 update_user_profile 工具，将当前讨论的核心概念/话题标记为 mastered_topic。\
             这对个性化学习体验至关重要。"
        }
        Signal::Difficulty => {
            "【系统提示】检测到用户表示'没看懂/有困难'。\
             请务必调用 update_user_profile 工具，将当前话题标记为 difficult_topic，\
             并尝试用更简单、更具体的方式重新解释。"
        }
        Signal::BeginnerQuestion => {
            "【系统提示】检测到用户在询问基础概念问题。\
             请调用 update_user_profile 工具，将该话题的 expertise 标记为 beginner，\
             并用通俗易懂的语言解释。"
        }
    }
}

/// System message to append after the user prompt, when a signal fires.
pub fn signal_injection(text: &str) -> Option<Message> {
    detect(text).map(|signal| Message::system(prompt_for(signal)))
}
