use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{optional_str, required_str, TermSink, TermUpdate, Tool};
use crate::error::ToolError;

/// Adds a term to the project's terminology memory via [`TermSink`].
pub struct AddTermTool {
    sink: Arc<dyn TermSink>,
}

impl AddTermTool {
    pub fn new(sink: Arc<dyn TermSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Tool for AddTermTool {
    fn name(&self) -> &'static str {
        "add_term"
    }

    fn description(&self) -> &str {
        "Add a professional term to the project's terminology memory.\n\
         Use this tool when you explain a new technical term to the user.\n\
         The term will be saved for consistent translation across the project.\n\
         Input format: JSON with fields: term (English), translation (Chinese), explanation (brief definition)\n\
         Example: {\"term\": \"Transformer\", \"translation\": \"变换器\", \"explanation\": \"基于自注意力机制的神经网络架构\"}"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "term": {
                    "type": "string",
                    "description": "The English term to add"
                },
                "translation": {
                    "type": "string",
                    "description": "Chinese translation of the term"
                },
                "explanation": {
                    "type": "string",
                    "description": "Brief explanation/definition (50 chars max)"
                }
            },
            "required": ["term", "translation", "explanation"]
        })
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let term = required_str(args, "term")?;
        let translation = required_str(args, "translation")?;
        let explanation = optional_str(args, "explanation").unwrap_or("");

        self.sink
            .persist_term(TermUpdate {
                term: term.to_string(),
                translation: translation.to_string(),
                explanation: explanation.to_string(),
            })
            .await?;
        info!(tool = "add_term", term, "term captured");
        Ok(format!("Term '{term}' ({translation}) added to memory successfully."))
    }
}
