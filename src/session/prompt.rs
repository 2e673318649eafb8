//! System prompt for the chat assistant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const BASE_PROMPT: &str = r#"你是PaperMate，一个专门帮助研究人员理解学术论文的AI助手。

**核心能力**：
1. 用清晰易懂的语言解释复杂概念
2. 翻译和定义专业术语
3. 提供研究领域的背景知识
4. 引用论文内容回答问题

**【重要】输出格式要求**：
- 你必须直接输出最终回答给用户
- 使用中文回答用户问题

**工具使用规则**：

1. **add_term工具** - 当你向用户解释一个专业术语时，必须调用此工具保存到术语库：
   - 触发条件：你在回答中解释了一个技术术语的含义
   - 不要重复添加已存在的术语（见下方术语列表）

2. **update_user_profile工具** - 当你观察到用户的知识水平或偏好时，必须立即调用此工具：
   - 用户问基础问题（如"什么是X"） → expertise: {"当前话题": "beginner"}
   - 用户问高级问题（如"X和Y的区别"） → expertise: {"当前话题": "advanced"}
   - 用户表示困惑（"我不太懂"/"有点难"） → difficult_topic: "当前话题"
   - 用户表示理解（"我学会了"/"我懂了"/"明白了"） → mastered_topic: "当前话题"
   - 用户喜欢某种解释方式 → preferences: {"likes_examples": true} 或 {"likes_analogies": true}

3. **project_memory工具** - 读取/写入项目级共享笔记：
   - 当需要确认项目背景/约定时先read
   - 当用户明确给出"把这个记录下来/以后统一这样翻译/项目约定是…"时append或replace

4. **search_paper_sections工具** - 在当前项目的论文段落中按关键词检索：
   - 当用户提到"这篇/这些论文里哪里提到X""找一下X出现在哪个章节"时使用
   - 返回结果后结合检索到的段落回答，并标注引用信息

5. **arxiv_search/tavily_search/searxng_search** - 搜索外部学术资源：
   - 当用户询问论文中未涉及的概念或需要更多背景知识时使用

**回答格式**：
- 术语格式：Term（中文翻译）: 解释
- 引用论文时标注：[Section: xxx]
- 根据用户水平调整解释深度
"#;

const MAX_EXPERTISE_ENTRIES: usize = 10;
const MAX_TOPICS: usize = 5;
const MAX_TERMS: usize = 20;
const ABSTRACT_CHARS: usize = 500;

/// What the learner profile says about the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerProfile {
    /// Topic → level, in insertion order.
    pub expertise_levels: Vec<(String, String)>,
    pub preferences: Map<String, Value>,
    pub difficult_topics: Vec<String>,
    pub mastered_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperBrief {
    pub title: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub phrase: String,
    pub translation: Option<String>,
}

/// Everything the chat prompt is personalized with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatContext {
    pub profile: Option<LearnerProfile>,
    pub paper: Option<PaperBrief>,
    pub terms: Vec<GlossaryEntry>,
}

fn pref_str<'a>(prefs: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    prefs.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn pref_flag(prefs: &Map<String, Value>, key: &str) -> bool {
    prefs.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn build_system_prompt(context: &ChatContext) -> String {
    let mut prompt = BASE_PROMPT.to_string();

    if let Some(profile) = &context.profile {
        prompt.push_str("\n\n**User Profile (adapt your responses accordingly):**\n");
        if !profile.expertise_levels.is_empty() {
            prompt.push_str("Knowledge levels:\n");
            for (topic, level) in profile.expertise_levels.iter().take(MAX_EXPERTISE_ENTRIES) {
                prompt.push_str(&format!("  - {topic}: {level}\n"));
            }
        }
        let prefs = &profile.preferences;
        if !prefs.is_empty() {
            prompt.push_str(&format!(
                "Explanation style preference: {}\n",
                pref_str(prefs, "explanation_style", "balanced")
            ));
            if pref_flag(prefs, "likes_analogies") {
                prompt.push_str("User appreciates analogies and metaphors.\n");
            }
            if pref_flag(prefs, "likes_examples") {
                prompt.push_str("User appreciates concrete examples.\n");
            }
            prompt.push_str(&format!(
                "Math comfort level: {}\n",
                pref_str(prefs, "math_comfort", "medium")
            ));
        }
        if !profile.difficult_topics.is_empty() {
            prompt.push_str(&format!(
                "Topics user finds difficult (explain more carefully): {}\n",
                join_first(&profile.difficult_topics, MAX_TOPICS)
            ));
        }
        if !profile.mastered_topics.is_empty() {
            prompt.push_str(&format!(
                "Topics user has mastered (can skip basics): {}\n",
                join_first(&profile.mastered_topics, MAX_TOPICS)
            ));
        }
    }

    if let Some(paper) = &context.paper {
        prompt.push_str(&format!("\n\nCurrent Paper: {}\n", paper.title));
        if let Some(abstract_text) = paper.abstract_text.as_deref().filter(|a| !a.is_empty()) {
            let head: String = abstract_text.chars().take(ABSTRACT_CHARS).collect();
            prompt.push_str(&format!("Abstract: {head}...\n"));
        }
    }

    let translated: Vec<_> = context
        .terms
        .iter()
        .take(MAX_TERMS)
        .filter_map(|t| {
            t.translation
                .as_deref()
                .filter(|tr| !tr.is_empty())
                .map(|tr| (t.phrase.as_str(), tr))
        })
        .collect();
    if !context.terms.is_empty() {
        prompt.push_str("\n\nProject Terminology (use these translations consistently):\n");
        for (phrase, translation) in translated {
            prompt.push_str(&format!("- {phrase}（{translation}）\n"));
        }
    }

    prompt
}

fn join_first(items: &[String], n: usize) -> String {
    items.iter().take(n).cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_context_is_the_base_prompt() {
        assert_eq!(build_system_prompt(&ChatContext::default()), BASE_PROMPT);
    }

    #[test]
    fn personalizes_with_profile_paper_and_terms() {
        let mut preferences = Map::new();
        preferences.insert("likes_examples".into(), json!(true));
        let context = ChatContext {
            profile: Some(LearnerProfile {
                expertise_levels: vec![("RL".into(), "beginner".into())],
                preferences,
                difficult_topics: vec!["KL penalty".into()],
                mastered_topics: vec![],
            }),
            paper: Some(PaperBrief {
                title: "DeepSeekMath".into(),
                abstract_text: Some("x".repeat(600)),
            }),
            terms: vec![
                GlossaryEntry {
                    phrase: "policy".into(),
                    translation: Some("策略".into()),
                },
                GlossaryEntry {
                    phrase: "rollout".into(),
                    translation: None,
                },
            ],
        };
        let prompt = build_system_prompt(&context);
        assert!(prompt.contains("  - RL: beginner\n"));
        assert!(prompt.contains("Explanation style preference: balanced\n"));
        assert!(prompt.contains("User appreciates concrete examples.\n"));
        assert!(prompt.contains("Math comfort level: medium\n"));
        assert!(prompt.contains("explain more carefully): KL penalty\n"));
        assert!(!prompt.contains("can skip basics"));
        assert!(prompt.contains("Current Paper: DeepSeekMath\n"));
        assert!(prompt.contains(&format!("Abstract: {}...\n", "x".repeat(500))));
        assert!(prompt.contains("- policy（策略）\n"));
        assert!(!prompt.contains("rollout"));
    }
}
