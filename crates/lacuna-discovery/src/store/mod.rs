//! Knowledge-store interface: the user's existing paper collection.

pub mod notion;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::EnrichedPaperRecord;

pub use notion::NotionStore;

/// Status given to papers the pipeline adds on its own.
pub const DEFAULT_STATUS: &str = "To Read";

/// Context stored alongside an appended paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendMetadata {
    /// Title of the paper whose gap this one fills.
    pub original_title: String,
    pub gap_text: String,
    /// Used when the record carries no theme of its own.
    pub theme: String,
    pub status: String,
}

impl AppendMetadata {
    pub fn new(original_title: impl Into<String>, gap_text: impl Into<String>) -> Self {
        Self {
            original_title: original_title.into(),
            gap_text: gap_text.into(),
            theme: "General".to_string(),
            status: DEFAULT_STATUS.to_string(),
        }
    }
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Whether an entry whose title contains `title_prefix` exists.
    async fn exists(&self, title_prefix: &str) -> Result<bool, StoreError>;

    /// Appends a record and returns the URL of the created entry.
    async fn append(
        &self,
        record: &EnrichedPaperRecord,
        metadata: &AppendMetadata,
    ) -> Result<String, StoreError>;
}
