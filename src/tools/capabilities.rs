//! Narrow capabilities injected into side-effecting tools.
//!
//! Each trait exposes exactly the one operation a tool needs, so tools stay
//! storage-agnostic and tests can substitute in-memory fakes.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared project notes (read whole, write whole).
#[async_trait]
pub trait NotesStore: Send + Sync {
    async fn read_notes(&self) -> Result<String, ToolError>;
    async fn write_notes(&self, notes: &str) -> Result<(), ToolError>;
}

/// One matching paper section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperSection {
    pub paper_title: String,
    pub section_title: Option<String>,
    pub content: String,
}

/// Which papers a section search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionScope<'a> {
    All,
    Paper(&'a str),
    OtherThan(&'a str),
}

/// Case-insensitive substring search over section titles and bodies.
///
/// A section matches when any needle occurs in its title or content.
#[async_trait]
pub trait SectionSearch: Send + Sync {
    async fn search_sections(
        &self,
        needles: &[String],
        scope: SectionScope<'_>,
        limit: usize,
    ) -> Result<Vec<PaperSection>, ToolError>;
}

/// A terminology entry proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermUpdate {
    pub term: String,
    pub translation: String,
    #[serde(default)]
    pub explanation: String,
}

#[async_trait]
pub trait TermSink: Send + Sync {
    async fn persist_term(&self, term: TermUpdate) -> Result<(), ToolError>;
}

/// A learning-profile change proposed by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub expertise: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub preferences: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_difficult_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added_mastered_topics: Vec<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.expertise.is_empty()
            && self.preferences.is_empty()
            && self.added_difficult_topics.is_empty()
            && self.added_mastered_topics.is_empty()
    }
}

#[async_trait]
pub trait ProfileSink: Send + Sync {
    async fn update_profile(&self, update: ProfileUpdate) -> Result<(), ToolError>;
}
