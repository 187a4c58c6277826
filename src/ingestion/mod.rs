//! The write path: load, chunk, embed, index.
//!
//! A document is recorded as `pending` before any work starts. It becomes
//! `ingested` in the same transaction that writes its chunks, or `failed`
//! with the reason if any step after loading goes wrong.

pub mod loaders;

#[cfg(test)]
mod tests;

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::Database;
use crate::database::sqlite::models::{Document, NewDocument};
use crate::database::sqlite::queries::{DocumentQueries, NotebookQueries};
use crate::database::vector_index::{IndexEntry, NewChunk, VectorIndex};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_text};
use crate::{Result, ThinkbookError};

pub use loaders::{LoadedDocument, Loader, Source};

/// What a failed indexing attempt does to the document record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    MarkFailed,
    KeepPrevious,
}

#[derive(Clone)]
pub struct Ingestor {
    database: Database,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    loader: Loader,
    chunking: ChunkingConfig,
}

impl Ingestor {
    #[inline]
    pub fn new(
        database: Database,
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        loader: Loader,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
            loader,
            chunking,
        }
    }

    /// Ingest one source into an existing notebook.
    ///
    /// Sources that cannot be loaded are rejected before a document record
    /// exists. Once recorded, any failure leaves the document `failed` and
    /// surfaces as [`ThinkbookError::IngestionFailed`].
    #[inline]
    pub async fn ingest(&self, notebook_id: &str, source: &Source) -> Result<Document> {
        if NotebookQueries::get_by_id(self.database.pool(), notebook_id)
            .await
            .map_err(ThinkbookError::database)?
            .is_none()
        {
            return Err(ThinkbookError::NotebookNotFound(notebook_id.to_string()));
        }

        let loaded = self.loader.load(source).await?;
        let document = DocumentQueries::create_pending(
            self.database.pool(),
            &NewDocument {
                notebook_id: notebook_id.to_string(),
                title: loaded.title,
                source_type: loaded.source_type,
                source: loaded.source,
                raw_text: loaded.text.clone(),
            },
        )
        .await
        .map_err(ThinkbookError::database)?;

        info!(
            "Ingesting '{}' as document {} into notebook {}",
            document.title, document.id, notebook_id
        );
        self.index_text(notebook_id, &document.id, &loaded.text, OnFailure::MarkFailed)
            .await
    }

    /// Ingest several sources concurrently; results are in input order
    #[inline]
    pub async fn ingest_many(&self, notebook_id: &str, sources: &[Source]) -> Vec<Result<Document>> {
        join_all(sources.iter().map(|source| self.ingest(notebook_id, source))).await
    }

    /// Rebuild a document's chunks from its stored text, e.g. after a failure.
    ///
    /// The old chunks are replaced in the same transaction that writes the
    /// new ones. If rebuilding an ingested document fails, it keeps its
    /// previous chunks and status.
    #[inline]
    pub async fn reingest(&self, notebook_id: &str, document_id: &str) -> Result<Document> {
        let not_found = || ThinkbookError::DocumentNotFound {
            notebook_id: notebook_id.to_string(),
            document_id: document_id.to_string(),
        };
        let pool = self.database.pool();
        let previous = DocumentQueries::get(pool, notebook_id, document_id)
            .await
            .map_err(ThinkbookError::database)?
            .ok_or_else(not_found)?;
        let text = DocumentQueries::raw_text(pool, notebook_id, document_id)
            .await
            .map_err(ThinkbookError::database)?
            .ok_or_else(not_found)?;

        let failure = if previous.is_ingested() {
            OnFailure::KeepPrevious
        } else {
            OnFailure::MarkFailed
        };
        self.index_text(notebook_id, document_id, &text, failure)
            .await
    }

    async fn index_text(
        &self,
        notebook_id: &str,
        document_id: &str,
        text: &str,
        on_failure: OnFailure,
    ) -> Result<Document> {
        if let Err(e) = self.chunk_embed_commit(notebook_id, document_id, text).await {
            let reason = e.to_string();
            error!(
                "Ingestion of document {} into notebook {} failed: {}",
                document_id, notebook_id, reason
            );
            match on_failure {
                OnFailure::KeepPrevious => {
                    warn!(
                        "Document {} keeps its previously indexed chunks",
                        document_id
                    );
                }
                OnFailure::MarkFailed => {
                    if let Err(mark_error) = DocumentQueries::mark_failed(
                        self.database.pool(),
                        notebook_id,
                        document_id,
                        &reason,
                    )
                    .await
                    {
                        warn!(
                            "Could not record failure of document {}: {:#}",
                            document_id, mark_error
                        );
                    }
                }
            }
            return Err(ThinkbookError::IngestionFailed {
                notebook_id: notebook_id.to_string(),
                document_id: document_id.to_string(),
                reason,
            });
        }

        let document = DocumentQueries::get(self.database.pool(), notebook_id, document_id)
            .await
            .map_err(ThinkbookError::database)?
            .ok_or_else(|| ThinkbookError::DocumentNotFound {
                notebook_id: notebook_id.to_string(),
                document_id: document_id.to_string(),
            })?;
        Ok(document)
    }

    async fn chunk_embed_commit(&self, notebook_id: &str, document_id: &str, text: &str) -> Result<()> {
        let chunks = chunk_text(text, &self.chunking)?;
        if chunks.is_empty() {
            return Err(ThinkbookError::InvalidInput(
                "document produced no chunks".to_string(),
            ));
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&contents).await?;
        if embeddings.len() != chunks.len() {
            return Err(ThinkbookError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry {
                chunk: NewChunk::from_text_chunk(document_id, chunk),
                embedding,
            })
            .collect();

        self.index
            .commit_document(notebook_id, document_id, &entries)
            .await?;
        Ok(())
    }
}
