use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use super::{ProfileSink, ProfileUpdate, Tool};
use crate::error::ToolError;

/// Records learning-profile insights via [`ProfileSink`].
pub struct UpdateProfileTool {
    sink: Arc<dyn ProfileSink>,
}

impl UpdateProfileTool {
    pub fn new(sink: Arc<dyn ProfileSink>) -> Self {
        Self { sink }
    }
}

fn object_field(args: &Value, key: &str) -> Map<String, Value> {
    args.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Accepts a string or an array of strings; anything else is ignored.
fn topic_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Fold the single-topic fields the model sends into the list fields.
pub(crate) fn normalize_profile_args(args: &Value) -> ProfileUpdate {
    let mut added_difficult_topics = topic_list(args.get("added_difficult_topics"));
    added_difficult_topics.extend(topic_list(args.get("difficult_topic")));
    let mut added_mastered_topics = topic_list(args.get("added_mastered_topics"));
    added_mastered_topics.extend(topic_list(args.get("mastered_topic")));

    ProfileUpdate {
        expertise: object_field(args, "expertise"),
        preferences: object_field(args, "preferences"),
        added_difficult_topics,
        added_mastered_topics,
    }
}

#[async_trait]
impl Tool for UpdateProfileTool {
    fn name(&self) -> &'static str {
        "update_user_profile"
    }

    fn description(&self) -> &str {
        "Update the user's learning profile based on conversation insights.\n\
         Use this tool when you notice:\n\
         - User's expertise level in a topic (beginner/intermediate/advanced)\n\
         - User's preference for explanation style (concise/detailed)\n\
         - Topics the user finds difficult or has mastered\n\
         Input format: JSON with optional fields: expertise (topic->level), preferences (key->value), difficult_topic, mastered_topic\n\
         Example: {\"expertise\": {\"machine learning\": \"intermediate\"}, \"preferences\": {\"likes_examples\": true}}"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expertise": {
                    "type": "object",
                    "description": "Map of topic to expertise level (beginner/intermediate/advanced)"
                },
                "preferences": {
                    "type": "object",
                    "description": "User preferences like explanation_style, likes_examples, math_comfort"
                },
                "difficult_topic": {
                    "type": "string",
                    "description": "A topic the user explicitly finds difficult"
                },
                "mastered_topic": {
                    "type": "string",
                    "description": "A topic the user has mastered"
                }
            }
        })
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let update = normalize_profile_args(args);
        info!(
            tool = "update_user_profile",
            difficult = update.added_difficult_topics.len(),
            mastered = update.added_mastered_topics.len(),
            "profile update captured"
        );
        self.sink.update_profile(update).await?;
        Ok("User profile updated successfully.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<ProfileUpdate>>);

    #[async_trait]
    impl ProfileSink for Captured {
        async fn update_profile(&self, update: ProfileUpdate) -> Result<(), ToolError> {
            self.0.lock().unwrap().push(update);
            Ok(())
        }
    }

    #[test]
    fn single_topics_fold_into_lists() {
        let update = normalize_profile_args(&json!({
            "expertise": {"attention": "beginner"},
            "difficult_topic": "positional encoding",
            "added_difficult_topics": "softmax",
            "mastered_topic": "tokenization"
        }));
        assert_eq!(update.expertise["attention"], "beginner");
        assert_eq!(
            update.added_difficult_topics,
            vec!["softmax".to_string(), "positional encoding".to_string()]
        );
        assert_eq!(update.added_mastered_topics, vec!["tokenization".to_string()]);
        assert!(update.preferences.is_empty());
    }

    #[tokio::test]
    async fn execute_forwards_normalized_update() {
        let sink = Arc::new(Captured::default());
        let tool = UpdateProfileTool::new(sink.clone());
        let out = tool
            .execute(&json!({"preferences": {"likes_examples": true}}))
            .await
            .unwrap();
        assert_eq!(out, "User profile updated successfully.");
        let captured = sink.0.lock().unwrap();
        assert_eq!(captured[0].preferences["likes_examples"], true);
    }
}
