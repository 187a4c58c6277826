
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// Isolation unit grouping one owner's documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Notebook {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Fixed by the first indexed chunk; `None` while the notebook is empty
    pub embedding_dimension: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Ingested,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Pending => write!(f, "Pending"),
            DocumentStatus::Ingested => write!(f, "Ingested"),
            DocumentStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Markdown,
    Html,
    Pdf,
    Pptx,
    Url,
}

impl std::fmt::Display for SourceType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SourceType::Text => write!(f, "text"),
            SourceType::Markdown => write!(f, "markdown"),
            SourceType::Html => write!(f, "html"),
            SourceType::Pdf => write!(f, "pdf"),
            SourceType::Pptx => write!(f, "pptx"),
            SourceType::Url => write!(f, "url"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub notebook_id: String,
    pub title: String,
    pub source_type: SourceType,
    /// Path, URL or caller-supplied label
    pub source: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub chunk_count: i64,
    pub created_at: DateTime<Utc>,
    pub ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub notebook_id: String,
    pub title: String,
    pub source_type: SourceType,
    pub source: String,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub notebook_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    #[inline]
    pub fn is_ingested(&self) -> bool {
        self.status == DocumentStatus::Ingested
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == DocumentStatus::Failed
    }
}
