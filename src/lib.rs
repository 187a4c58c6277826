use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThinkbookError>;

#[derive(Error, Debug)]
pub enum ThinkbookError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Notebook not found: {0}")]
    NotebookNotFound(String),

    #[error("Document {document_id} not found in notebook {notebook_id}")]
    DocumentNotFound {
        notebook_id: String,
        document_id: String,
    },

    #[error("Ingestion of document {document_id} into notebook {notebook_id} failed: {reason}")]
    IngestionFailed {
        notebook_id: String,
        document_id: String,
        reason: String,
    },

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector index unavailable for notebook {notebook_id}: {reason}")]
    IndexUnavailable { notebook_id: String, reason: String },

    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("{task} generation failed for notebook {notebook_id}: {cause}")]
    GenerationFailed {
        task: synthesis::TaskKind,
        notebook_id: String,
        cause: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ThinkbookError {
    /// Wrap a query-layer failure, keeping its context chain
    #[inline]
    pub fn database(error: anyhow::Error) -> Self {
        Self::Database(format!("{error:#}"))
    }
}

impl From<sqlx::Error> for ThinkbookError {
    #[inline]
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

pub mod assistant;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod ingestion;
pub mod llm;
pub mod retrieval;
pub mod retry;
pub mod synthesis;

#[cfg(test)]
mod testing;
