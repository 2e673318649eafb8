//! Shared project notes tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{optional_str, NotesStore, Tool};
use crate::error::ToolError;

/// Reads and rewrites project-level notes through an injected [`NotesStore`].
pub struct ProjectMemoryTool {
    store: Arc<dyn NotesStore>,
}

impl ProjectMemoryTool {
    pub fn new(store: Arc<dyn NotesStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ProjectMemoryTool {
    fn name(&self) -> &'static str {
        "project_memory"
    }

    fn description(&self) -> &str {
        "Read/write project-level shared notes.\n\
         Use this to store project conventions, translation rules, important conclusions, etc.\n\
         Actions: read (get current notes), append (add to notes), replace (overwrite notes), clear (delete notes)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "append", "replace", "clear"],
                    "description": "Action to perform on project notes"
                },
                "content": {
                    "type": "string",
                    "description": "Notes content (required for append/replace)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let action = optional_str(args, "action").unwrap_or("");
        let content = optional_str(args, "content");

        match action {
            "read" => {
                let notes = self.store.read_notes().await?;
                if notes.trim().is_empty() {
                    Ok("(empty)".to_string())
                } else {
                    Ok(notes)
                }
            }
            "clear" => {
                self.store.write_notes("").await?;
                Ok("Cleared project notes.".to_string())
            }
            "replace" => {
                let content = content.ok_or_else(|| {
                    ToolError::InvalidArguments("content is required for replace.".into())
                })?;
                self.store.write_notes(content).await?;
                Ok("Replaced project notes.".to_string())
            }
            "append" => {
                let content = content.ok_or_else(|| {
                    ToolError::InvalidArguments("content is required for append.".into())
                })?;
                let notes = self.store.read_notes().await?;
                let joined = if notes.is_empty() {
                    content.to_string()
                } else {
                    format!("{notes}\n\n{content}").trim().to_string()
                };
                self.store.write_notes(&joined).await?;
                Ok("Appended to project notes.".to_string())
            }
            other => Err(ToolError::InvalidArguments(format!("Invalid action: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryNotes(Mutex<String>);

    #[async_trait]
    impl NotesStore for MemoryNotes {
        async fn read_notes(&self) -> Result<String, ToolError> {
            Ok(self.0.lock().unwrap().clone())
        }
        async fn write_notes(&self, notes: &str) -> Result<(), ToolError> {
            *self.0.lock().unwrap() = notes.to_string();
            Ok(())
        }
    }

    #[tokio::test]
    async fn append_read_replace_clear_cycle() {
        let store = Arc::new(MemoryNotes::default());
        let tool = ProjectMemoryTool::new(store.clone());

        assert_eq!(tool.execute(&json!({"action": "read"})).await.unwrap(), "(empty)");
        tool.execute(&json!({"action": "append", "content": "Use 注意力 for attention"}))
            .await
            .unwrap();
        tool.execute(&json!({"action": "append", "content": "Keep LaTeX"}))
            .await
            .unwrap();
        assert_eq!(
            tool.execute(&json!({"action": "read"})).await.unwrap(),
            "Use 注意力 for attention\n\nKeep LaTeX"
        );

        tool.execute(&json!({"action": "replace", "content": "fresh"}))
            .await
            .unwrap();
        assert_eq!(*store.0.lock().unwrap(), "fresh");

        assert_eq!(
            tool.execute(&json!({"action": "clear"})).await.unwrap(),
            "Cleared project notes."
        );
        assert_eq!(*store.0.lock().unwrap(), "");
    }

    #[tokio::test]
    async fn invalid_action_and_missing_content_are_rejected() {
        let tool = ProjectMemoryTool::new(Arc::new(MemoryNotes::default()));
        assert!(matches!(
            tool.execute(&json!({"action": "delete"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(&json!({"action": "append", "content": " "})).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
