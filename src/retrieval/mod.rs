//! The read path: turn a question into the passages most likely to answer it.


use std::sync::Arc;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::database::vector_index::VectorIndex;
use crate::embeddings::Embedder;
use crate::{Result, ThinkbookError};

pub use crate::database::vector_index::{RetrievalResult, ScoredChunk};

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    config: RetrievalConfig,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, index: VectorIndex, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn default_top_k(&self) -> usize {
        self.config.default_top_k
    }

    /// `k` outside `1..=max_top_k` is clamped rather than rejected
    #[inline]
    pub fn clamp_top_k(&self, k: usize) -> usize {
        k.clamp(1, self.config.max_top_k.max(1))
    }

    /// Top passages for `query` from `notebook_id` only, best first.
    ///
    /// An empty notebook yields an empty result without embedding the query.
    #[inline]
    pub async fn retrieve(&self, notebook_id: &str, query: &str, k: usize) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ThinkbookError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        let k = self.clamp_top_k(k);
        if self.index.dimension(notebook_id).await?.is_none() {
            debug!("Notebook {} has no chunks, skipping embedding", notebook_id);
            return Ok(RetrievalResult::empty(notebook_id));
        }

        let query_vector = self.embedder.embed(query).await?;
        let result = self.index.query(notebook_id, &query_vector, k).await?;

        debug!(
            "Retrieved {} passages from notebook {} (k = {})",
            result.hits.len(),
            notebook_id,
            k
        );
        Ok(result)
    }
}
