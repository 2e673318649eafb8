//! Incremental reconstruction of one streamed completion.

use super::extract::remove_thinking_markup;
use crate::types::{ChatChunk, Delta, FunctionCall, ToolCall, ToolCallDelta};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// What one streamed round produced once the stream has ended.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssembledTurn {
    pub content: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Accumulates deltas for a single streamed round.
///
/// Content tokens are cleaned of thinking markup as they arrive and returned
/// to the caller for immediate forwarding. Reasoning is buffered. Tool calls
/// are keyed by their `index` and assembled in index order at the end.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    content: String,
    reasoning: String,
    calls: BTreeMap<usize, PartialCall>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in; returns the cleaned content tokens it carried.
    pub fn push_chunk(&mut self, chunk: &ChatChunk) -> Vec<String> {
        chunk
            .choices
            .iter()
            .filter_map(|choice| self.push_delta(&choice.delta))
            .collect()
    }

    pub fn push_delta(&mut self, delta: &Delta) -> Option<String> {
        if let Some(reasoning) = delta
            .reasoning_content
            .as_deref()
            .or(delta.reasoning.as_deref())
        {
            self.reasoning.push_str(reasoning);
        }

        for call in delta.tool_calls.iter().flatten() {
            self.push_tool_delta(call);
        }

        let token = delta.content.as_deref()?;
        let cleaned = remove_thinking_markup(token);
        if cleaned.is_empty() {
            return None;
        }
        self.content.push_str(&cleaned);
        Some(cleaned)
    }

    fn push_tool_delta(&mut self, delta: &ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            entry.id = Some(id.to_string());
        }
        let Some(function) = &delta.function else {
            return;
        };
        if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
            entry.name = name.to_string();
        }
        if let Some(fragment) = function.arguments.as_deref().filter(|a| !a.is_empty()) {
            merge_arguments(&mut entry.arguments, fragment);
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn finish(self) -> AssembledTurn {
        let tool_calls = self
            .calls
            .into_values()
            .map(|call| ToolCall {
                id: call.id.unwrap_or_default(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect();
        AssembledTurn {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls,
        }
    }
}

fn is_complete_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

/// Some providers periodically resend the full argument payload instead of a
/// suffix. A fragment replaces the accumulated text only when both are
/// complete JSON documents; otherwise it is appended.
pub(crate) fn merge_arguments(accumulated: &mut String, fragment: &str) {
    if accumulated.is_empty() {
        accumulated.push_str(fragment);
    } else if is_complete_json(accumulated) && is_complete_json(fragment) {
        *accumulated = fragment.to_string();
    } else {
        accumulated.push_str(fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkChoice, FunctionCallDelta};

    fn tool_delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> Delta {
        Delta {
            tool_calls: Some(vec![ToolCallDelta {
                index,
                id: id.map(str::to_string),
                function: Some(FunctionCallDelta {
                    name: name.map(str::to_string),
                    arguments: args.map(str::to_string),
                }),
            }]),
            ..Delta::default()
        }
    }

    fn content_delta(text: &str) -> Delta {
        Delta {
            content: Some(text.to_string()),
            ..Delta::default()
        }
    }

    #[test]
    fn incremental_fragments_rebuild_the_original() {
        let original = r#"{"query":"GRPO reinforcement","max_results":3}"#;
        let mut asm = StreamAssembler::new();
        asm.push_delta(&tool_delta(0, Some("call_1"), Some("arxiv_search"), None));
        for piece in [r#"{"query":"GR"#, r#"PO reinforcement","#, r#""max_results":3}"#] {
            asm.push_delta(&tool_delta(0, None, None, Some(piece)));
        }
        let turn = asm.finish();
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call_1");
        assert_eq!(turn.tool_calls[0].function.name, "arxiv_search");
        assert_eq!(turn.tool_calls[0].function.arguments, original);
    }

    #[test]
    fn repeated_full_payloads_do_not_duplicate() {
        let full = r#"{"query":"layer norm"}"#;
        let mut asm = StreamAssembler::new();
        for _ in 0..3 {
            asm.push_delta(&tool_delta(0, Some("call_9"), Some("arxiv_search"), Some(full)));
        }
        assert_eq!(asm.finish().tool_calls[0].function.arguments, full);
    }

    #[test]
    fn calls_are_ordered_by_index() {
        let mut asm = StreamAssembler::new();
        asm.push_delta(&tool_delta(1, Some("b"), Some("tavily_search"), Some("{}")));
        asm.push_delta(&tool_delta(0, Some("a"), Some("arxiv_search"), Some("{}")));
        let ids: Vec<_> = asm.finish().tool_calls.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn content_tokens_are_cleaned_and_reasoning_buffered() {
        let mut asm = StreamAssembler::new();
        assert_eq!(asm.push_delta(&content_delta("<think>hidden</think>")), None);
        assert_eq!(asm.push_delta(&content_delta("Hello")).as_deref(), Some("Hello"));
        assert_eq!(asm.push_delta(&content_delta(" world")).as_deref(), Some(" world"));
        asm.push_delta(&Delta {
            reasoning_content: Some("step one. ".into()),
            ..Delta::default()
        });
        asm.push_delta(&Delta {
            reasoning: Some("step two.".into()),
            ..Delta::default()
        });
        let turn = asm.finish();
        assert_eq!(turn.content, "Hello world");
        assert_eq!(turn.reasoning, "step one. step two.");
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn push_chunk_walks_every_choice() {
        let chunk = ChatChunk {
            choices: vec![ChunkChoice {
                index: 0,
                delta: content_delta("A transformer"),
                finish_reason: None,
            }],
        };
        let mut asm = StreamAssembler::new();
        assert_eq!(asm.push_chunk(&chunk), vec!["A transformer".to_string()]);
        assert_eq!(asm.content(), "A transformer");
    }

    #[cfg(feature = "fuzz-tests")]
    mod props {
        use super::super::merge_arguments;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_split_of_an_object_reassembles(query in "[a-zA-Z0-9 ]{0,40}", cut in 0usize..64) {
                let original = serde_json::json!({"query": query}).to_string();
                let cut = cut.min(original.len());
                let (head, tail) = original.split_at(cut);
                let mut acc = String::new();
                for piece in [head, tail] {
                    if !piece.is_empty() {
                        merge_arguments(&mut acc, piece);
                    }
                }
                prop_assert_eq!(acc, original);
            }
        }
    }
}
