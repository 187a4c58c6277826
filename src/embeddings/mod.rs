pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{ChunkingConfig, TextChunk, chunk, chunk_text, estimate_token_count};
pub use ollama::OllamaClient;

/// Maps text to fixed-length vectors.
///
/// Implementations return exactly one vector per input, in input order, and
/// signal [`crate::ThinkbookError::EmbeddingUnavailable`] when the backing
/// model cannot be reached.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            crate::ThinkbookError::EmbeddingUnavailable("embedder returned no vector".to_string())
        })
    }
}
