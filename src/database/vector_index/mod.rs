//! Per-notebook vector storage on top of the SQLite `chunks` table.
//!
//! Every statement filters on `notebook_id`, so nothing written to one
//! notebook is ever visible from another. Writes to a notebook are
//! serialized by an in-process async lock and each write is a single
//! transaction. Queries are a single `SELECT`, so under WAL they observe
//! either the state before a write or the state after it.


use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Row, Sqlite, Transaction};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::sqlite::queries::DocumentQueries;
use super::sqlite::{Database, DbPool};
use crate::embeddings::TextChunk;
use crate::{Result, ThinkbookError};

/// A chunk ready to be written to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub start: usize,
    pub end: usize,
    pub content: String,
    pub token_count: usize,
}

impl NewChunk {
    /// Chunk ids are derived from the document id and ordinal, so
    /// re-indexing a document overwrites its previous chunks in place.
    #[inline]
    pub fn from_text_chunk(document_id: &str, chunk: TextChunk) -> Self {
        Self {
            id: format!("{document_id}:{}", chunk.ordinal),
            document_id: document_id.to_string(),
            ordinal: chunk.ordinal,
            start: chunk.start,
            end: chunk.end,
            content: chunk.content,
            token_count: chunk.token_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: NewChunk,
    pub embedding: Vec<f32>,
}

/// A chunk as stored, without its vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct IndexedChunk {
    pub id: String,
    pub notebook_id: String,
    pub document_id: String,
    pub ordinal: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub content: String,
    pub token_count: i64,
    pub ingested_at: DateTime<Utc>,
}

impl IndexedChunk {
    #[inline]
    pub fn char_length(&self) -> i64 {
        self.end_offset - self.start_offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: IndexedChunk,
    pub document_title: String,
    /// Cosine similarity to the query vector
    pub score: f32,
}

/// Top-K passages for one query, best first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub notebook_id: String,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    #[inline]
    pub fn empty(notebook_id: &str) -> Self {
        Self {
            notebook_id: notebook_id.to_string(),
            hits: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

#[derive(Debug, Clone)]
pub struct VectorIndex {
    pool: DbPool,
    locks: Arc<Mutex<LockMap>>,
}

const CHUNK_COLUMNS: &str = "c.id, c.notebook_id, c.document_id, c.ordinal, c.start_offset, \
     c.end_offset, c.content, c.token_count, c.ingested_at";

impl VectorIndex {
    #[inline]
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_notebook(&self, notebook_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(notebook_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    fn forget_lock(&self, notebook_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(notebook_id);
    }

    /// Insert or replace one chunk. Idempotent on `(notebook_id, chunk.id)`.
    #[inline]
    pub async fn upsert(&self, notebook_id: &str, chunk: NewChunk, embedding: Vec<f32>) -> Result<()> {
        self.upsert_batch(notebook_id, &[IndexEntry { chunk, embedding }])
            .await
            .map(|_| ())
    }

    /// Insert or replace several chunks; either all are written or none
    #[inline]
    pub async fn upsert_batch(&self, notebook_id: &str, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let dimension = batch_dimension(entries)?;

        let _guard = self.lock_notebook(notebook_id).await;
        let mut tx = self.pool.begin().await.map_err(index_error(notebook_id))?;
        write_entries(&mut tx, notebook_id, dimension, entries).await?;
        tx.commit().await.map_err(index_error(notebook_id))?;

        debug!("Upserted {} chunks into notebook {}", entries.len(), notebook_id);
        Ok(entries.len())
    }

    /// Replace a document's chunks and mark it ingested in one transaction.
    /// Chunks from an earlier ingestion stay visible until the commit.
    #[inline]
    pub async fn commit_document(
        &self,
        notebook_id: &str,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<usize> {
        if let Some(stray) = entries.iter().find(|e| e.chunk.document_id != document_id) {
            return Err(ThinkbookError::InvalidInput(format!(
                "chunk {} belongs to document {}, not {}",
                stray.chunk.id, stray.chunk.document_id, document_id
            )));
        }
        let dimension = if entries.is_empty() {
            None
        } else {
            Some(batch_dimension(entries)?)
        };

        let _guard = self.lock_notebook(notebook_id).await;
        let mut tx = self.pool.begin().await.map_err(index_error(notebook_id))?;

        let marked = DocumentQueries::mark_ingested(
            &mut *tx,
            notebook_id,
            document_id,
            entries.len() as i64,
        )
        .await
        .map_err(|e| ThinkbookError::IndexUnavailable {
            notebook_id: notebook_id.to_string(),
            reason: format!("{e:#}"),
        })?;
        if !marked {
            return Err(ThinkbookError::DocumentNotFound {
                notebook_id: notebook_id.to_string(),
                document_id: document_id.to_string(),
            });
        }

        let replaced = sqlx::query("DELETE FROM chunks WHERE notebook_id = ? AND document_id = ?")
            .bind(notebook_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(index_error(notebook_id))?
            .rows_affected();
        if replaced > 0 {
            debug!("Replacing {} chunks of document {}", replaced, document_id);
            release_dimension_if_empty(&mut tx, notebook_id).await?;
        }

        if let Some(dimension) = dimension {
            write_entries(&mut tx, notebook_id, dimension, entries).await?;
        }
        tx.commit().await.map_err(index_error(notebook_id))?;

        info!(
            "Indexed {} chunks for document {} in notebook {}",
            entries.len(),
            document_id,
            notebook_id
        );
        Ok(entries.len())
    }

    /// Remove a document, its chunks and their vectors. Returns the number
    /// of chunks removed.
    #[inline]
    pub async fn delete(&self, notebook_id: &str, document_id: &str) -> Result<u64> {
        let _guard = self.lock_notebook(notebook_id).await;
        let mut tx = self.pool.begin().await.map_err(index_error(notebook_id))?;

        let removed = sqlx::query("DELETE FROM chunks WHERE notebook_id = ? AND document_id = ?")
            .bind(notebook_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(index_error(notebook_id))?
            .rows_affected();

        let documents = sqlx::query("DELETE FROM documents WHERE notebook_id = ? AND id = ?")
            .bind(notebook_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(index_error(notebook_id))?
            .rows_affected();

        if documents == 0 {
            tx.rollback().await.map_err(index_error(notebook_id))?;
            return Err(ThinkbookError::DocumentNotFound {
                notebook_id: notebook_id.to_string(),
                document_id: document_id.to_string(),
            });
        }

        release_dimension_if_empty(&mut tx, notebook_id).await?;
        tx.commit().await.map_err(index_error(notebook_id))?;

        info!(
            "Deleted document {} and {} chunks from notebook {}",
            document_id, removed, notebook_id
        );
        Ok(removed)
    }

    /// Drop a document's chunks but keep the document record, as a repair
    /// for documents that failed after partially reaching the index
    #[inline]
    pub async fn purge_chunks(&self, notebook_id: &str, document_id: &str) -> Result<u64> {
        let _guard = self.lock_notebook(notebook_id).await;
        let mut tx = self.pool.begin().await.map_err(index_error(notebook_id))?;

        let removed = sqlx::query("DELETE FROM chunks WHERE notebook_id = ? AND document_id = ?")
            .bind(notebook_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(index_error(notebook_id))?
            .rows_affected();
        release_dimension_if_empty(&mut tx, notebook_id).await?;
        tx.commit().await.map_err(index_error(notebook_id))?;

        debug!("Purged {} chunks of document {}", removed, document_id);
        Ok(removed)
    }

    /// Remove a notebook with everything it owns
    #[inline]
    pub async fn delete_notebook(&self, notebook_id: &str) -> Result<()> {
        {
            let _guard = self.lock_notebook(notebook_id).await;
            let deleted = sqlx::query("DELETE FROM notebooks WHERE id = ?")
                .bind(notebook_id)
                .execute(&self.pool)
                .await
                .map_err(index_error(notebook_id))?
                .rows_affected();

            if deleted == 0 {
                return Err(ThinkbookError::NotebookNotFound(notebook_id.to_string()));
            }
        }
        self.forget_lock(notebook_id);

        info!("Deleted notebook {}", notebook_id);
        Ok(())
    }

    /// The `k` chunks most similar to `query_vector`, drawn only from `notebook_id`
    #[inline]
    pub async fn query(
        &self,
        notebook_id: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Ok(RetrievalResult::empty(notebook_id));
        }

        let rows = sqlx::query(&format!(
            "SELECT {CHUNK_COLUMNS}, c.dimension, c.embedding, d.title AS document_title \
             FROM chunks c \
             JOIN documents d ON d.notebook_id = c.notebook_id AND d.id = c.document_id \
             WHERE c.notebook_id = ?"
        ))
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_error(notebook_id))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let dimension: i64 = row.try_get("dimension").map_err(index_error(notebook_id))?;
            if dimension as usize != query_vector.len() {
                return Err(ThinkbookError::InvalidInput(format!(
                    "query vector has {} dimensions but notebook {} stores {}",
                    query_vector.len(),
                    notebook_id,
                    dimension
                )));
            }
            let blob: Vec<u8> = row.try_get("embedding").map_err(index_error(notebook_id))?;
            let embedding = decode_embedding(&blob);
            hits.push(ScoredChunk {
                chunk: IndexedChunk::from_row(row).map_err(index_error(notebook_id))?,
                document_title: row
                    .try_get("document_title")
                    .map_err(index_error(notebook_id))?,
                score: cosine_similarity(query_vector, &embedding),
            });
        }

        hits.sort_by(rank);
        hits.truncate(k);

        debug!(
            "Query on notebook {} scanned {} chunks, returning {}",
            notebook_id,
            rows.len(),
            hits.len()
        );

        Ok(RetrievalResult {
            notebook_id: notebook_id.to_string(),
            hits,
        })
    }

    #[inline]
    pub async fn count(&self, notebook_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE notebook_id = ?")
            .bind(notebook_id)
            .fetch_one(&self.pool)
            .await
            .map_err(index_error(notebook_id))?;
        Ok(count as u64)
    }

    /// The dimension fixed for this notebook, if any chunk has been written
    #[inline]
    pub async fn dimension(&self, notebook_id: &str) -> Result<Option<usize>> {
        let dimension: Option<Option<i64>> =
            sqlx::query_scalar("SELECT embedding_dimension FROM notebooks WHERE id = ?")
                .bind(notebook_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(index_error(notebook_id))?;

        match dimension {
            None => Err(ThinkbookError::NotebookNotFound(notebook_id.to_string())),
            Some(dimension) => Ok(dimension.map(|d| d as usize)),
        }
    }

    /// A document's chunks in ordinal order
    #[inline]
    pub async fn document_chunks(
        &self,
        notebook_id: &str,
        document_id: &str,
    ) -> Result<Vec<IndexedChunk>> {
        sqlx::query_as::<_, IndexedChunk>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c \
             WHERE c.notebook_id = ? AND c.document_id = ? ORDER BY c.ordinal"
        ))
        .bind(notebook_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_error(notebook_id))
    }

    /// Every chunk in the notebook: documents in the order they were added,
    /// chunks in ordinal order
    #[inline]
    pub async fn notebook_chunks(&self, notebook_id: &str) -> Result<Vec<IndexedChunk>> {
        sqlx::query_as::<_, IndexedChunk>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c \
             JOIN documents d ON d.notebook_id = c.notebook_id AND d.id = c.document_id \
             WHERE c.notebook_id = ? ORDER BY d.rowid, c.ordinal"
        ))
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_error(notebook_id))
    }

    /// Chunk counts and stored dimensions per document, for consistency checks
    #[inline]
    pub async fn document_stats(&self, notebook_id: &str) -> Result<Vec<DocumentIndexStats>> {
        sqlx::query_as::<_, DocumentIndexStats>(
            "SELECT document_id, COUNT(*) AS chunk_count, \
             MIN(dimension) AS min_dimension, MAX(dimension) AS max_dimension \
             FROM chunks WHERE notebook_id = ? GROUP BY document_id",
        )
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_error(notebook_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DocumentIndexStats {
    pub document_id: String,
    pub chunk_count: i64,
    pub min_dimension: i64,
    pub max_dimension: i64,
}

async fn write_entries(
    tx: &mut Transaction<'_, Sqlite>,
    notebook_id: &str,
    dimension: usize,
    entries: &[IndexEntry],
) -> Result<()> {
    // Write first so the transaction takes the database write lock up front
    let claimed = sqlx::query(
        "UPDATE notebooks SET embedding_dimension = COALESCE(embedding_dimension, ?) WHERE id = ?",
    )
    .bind(dimension as i64)
    .bind(notebook_id)
    .execute(&mut **tx)
    .await
    .map_err(index_error(notebook_id))?
    .rows_affected();

    if claimed == 0 {
        return Err(ThinkbookError::NotebookNotFound(notebook_id.to_string()));
    }

    let stored: i64 = sqlx::query_scalar("SELECT embedding_dimension FROM notebooks WHERE id = ?")
        .bind(notebook_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(index_error(notebook_id))?;

    if stored as usize != dimension {
        warn!(
            "Rejected {}-dimensional vectors for notebook {} (stores {})",
            dimension, notebook_id, stored
        );
        return Err(ThinkbookError::InvalidInput(format!(
            "notebook {notebook_id} stores {stored}-dimensional vectors, got {dimension}"
        )));
    }

    let document_ids: BTreeSet<&str> = entries.iter().map(|e| e.chunk.document_id.as_str()).collect();
    for document_id in document_ids {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM documents WHERE notebook_id = ? AND id = ?")
                .bind(notebook_id)
                .bind(document_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(index_error(notebook_id))?;
        if exists.is_none() {
            return Err(ThinkbookError::DocumentNotFound {
                notebook_id: notebook_id.to_string(),
                document_id: document_id.to_string(),
            });
        }
    }

    let now = Utc::now();
    for entry in entries {
        let chunk = &entry.chunk;
        sqlx::query(
            "INSERT INTO chunks (notebook_id, id, document_id, ordinal, start_offset, end_offset, \
             content, token_count, dimension, embedding, ingested_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (notebook_id, id) DO UPDATE SET \
             document_id = excluded.document_id, ordinal = excluded.ordinal, \
             start_offset = excluded.start_offset, end_offset = excluded.end_offset, \
             content = excluded.content, token_count = excluded.token_count, \
             dimension = excluded.dimension, embedding = excluded.embedding, \
             ingested_at = excluded.ingested_at",
        )
        .bind(notebook_id)
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.ordinal as i64)
        .bind(chunk.start as i64)
        .bind(chunk.end as i64)
        .bind(&chunk.content)
        .bind(chunk.token_count as i64)
        .bind(dimension as i64)
        .bind(encode_embedding(&entry.embedding))
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(index_error(notebook_id))?;
    }

    Ok(())
}

/// An emptied notebook may be refilled by a different embedding model
async fn release_dimension_if_empty(
    tx: &mut Transaction<'_, Sqlite>,
    notebook_id: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE notebooks SET embedding_dimension = NULL WHERE id = ? \
         AND NOT EXISTS (SELECT 1 FROM chunks WHERE notebook_id = ?)",
    )
    .bind(notebook_id)
    .bind(notebook_id)
    .execute(&mut **tx)
    .await
    .map_err(index_error(notebook_id))?;
    Ok(())
}

fn batch_dimension(entries: &[IndexEntry]) -> Result<usize> {
    let dimension = entries.first().map_or(0, |e| e.embedding.len());
    if dimension == 0 {
        return Err(ThinkbookError::InvalidInput(
            "embeddings must not be empty".to_string(),
        ));
    }
    if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
        return Err(ThinkbookError::InvalidInput(format!(
            "chunk {} has a {}-dimensional embedding, expected {}",
            bad.chunk.id,
            bad.embedding.len(),
            dimension
        )));
    }
    Ok(dimension)
}

fn index_error(notebook_id: &str) -> impl Fn(sqlx::Error) -> ThinkbookError + '_ {
    move |error| ThinkbookError::IndexUnavailable {
        notebook_id: notebook_id.to_string(),
        reason: error.to_string(),
    }
}

/// Higher score first; ties go to the most recently ingested chunk, then by id
fn rank(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.chunk.ingested_at.cmp(&a.chunk.ingested_at))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

#[inline]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Zero vectors score 0 against everything
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });
    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}
