
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;
use uuid::Uuid;

const DOCUMENT_COLUMNS: &str = "id, notebook_id, title, source_type, source, status, \
     error_message, chunk_count, created_at, ingested_at";

pub struct NotebookQueries;

impl NotebookQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, owner_id: &str, title: &str) -> Result<Notebook> {
        let notebook = Notebook {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            embedding_dimension: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO notebooks (id, owner_id, title, embedding_dimension, created_at) \
             VALUES (?, ?, ?, NULL, ?)",
        )
        .bind(&notebook.id)
        .bind(&notebook.owner_id)
        .bind(&notebook.title)
        .bind(notebook.created_at)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to create notebook '{title}'"))?;

        debug!("Created notebook {} ({})", notebook.id, notebook.title);
        Ok(notebook)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Notebook>> {
        sqlx::query_as::<_, Notebook>(
            "SELECT id, owner_id, title, embedding_dimension, created_at \
             FROM notebooks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get notebook by id")
    }

    #[inline]
    pub async fn get_by_title(
        pool: &SqlitePool,
        owner_id: &str,
        title: &str,
    ) -> Result<Option<Notebook>> {
        sqlx::query_as::<_, Notebook>(
            "SELECT id, owner_id, title, embedding_dimension, created_at \
             FROM notebooks WHERE owner_id = ? AND title = ?",
        )
        .bind(owner_id)
        .bind(title)
        .fetch_optional(pool)
        .await
        .context("Failed to get notebook by title")
    }

    #[inline]
    pub async fn list_for_owner(pool: &SqlitePool, owner_id: &str) -> Result<Vec<Notebook>> {
        sqlx::query_as::<_, Notebook>(
            "SELECT id, owner_id, title, embedding_dimension, created_at \
             FROM notebooks WHERE owner_id = ? ORDER BY rowid",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .context("Failed to list notebooks")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Notebook>> {
        sqlx::query_as::<_, Notebook>(
            "SELECT id, owner_id, title, embedding_dimension, created_at \
             FROM notebooks ORDER BY rowid",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list all notebooks")
    }

    /// Returns false when no notebook has this id
    #[inline]
    pub async fn rename(pool: &SqlitePool, id: &str, title: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE notebooks SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to rename notebook {id}"))?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    /// Record a document before any of its chunks exist
    #[inline]
    pub async fn create_pending(pool: &SqlitePool, new_document: &NewDocument) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO documents \
             (id, notebook_id, title, source_type, source, raw_text, status, chunk_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(&new_document.notebook_id)
        .bind(&new_document.title)
        .bind(new_document.source_type)
        .bind(&new_document.source)
        .bind(&new_document.raw_text)
        .bind(DocumentStatus::Pending)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?;

        Self::get(pool, &new_document.notebook_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get(
        pool: &SqlitePool,
        notebook_id: &str,
        document_id: &str,
    ) -> Result<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE notebook_id = ? AND id = ?"
        ))
        .bind(notebook_id)
        .bind(document_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document")
    }

    #[inline]
    pub async fn list_for_notebook(pool: &SqlitePool, notebook_id: &str) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE notebook_id = ? ORDER BY rowid"
        ))
        .bind(notebook_id)
        .fetch_all(pool)
        .await
        .context("Failed to list documents")
    }

    #[inline]
    pub async fn list_by_status(
        pool: &SqlitePool,
        notebook_id: &str,
        status: DocumentStatus,
    ) -> Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE notebook_id = ? AND status = ? ORDER BY rowid"
        ))
        .bind(notebook_id)
        .bind(status)
        .fetch_all(pool)
        .await
        .context("Failed to list documents by status")
    }

    #[inline]
    pub async fn mark_ingested<'e, E: SqliteExecutor<'e>>(
        executor: E,
        notebook_id: &str,
        document_id: &str,
        chunk_count: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, chunk_count = ?, error_message = NULL, ingested_at = ? \
             WHERE notebook_id = ? AND id = ?",
        )
        .bind(DocumentStatus::Ingested)
        .bind(chunk_count)
        .bind(Utc::now())
        .bind(notebook_id)
        .bind(document_id)
        .execute(executor)
        .await
        .context("Failed to mark document ingested")?;
        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn mark_failed<'e, E: SqliteExecutor<'e>>(
        executor: E,
        notebook_id: &str,
        document_id: &str,
        error_message: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, error_message = ?, chunk_count = 0 \
             WHERE notebook_id = ? AND id = ?",
        )
        .bind(DocumentStatus::Failed)
        .bind(error_message)
        .bind(notebook_id)
        .bind(document_id)
        .execute(executor)
        .await
        .context("Failed to mark document failed")?;
        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn raw_text(
        pool: &SqlitePool,
        notebook_id: &str,
        document_id: &str,
    ) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT raw_text FROM documents WHERE notebook_id = ? AND id = ?")
            .bind(notebook_id)
            .bind(document_id)
            .fetch_optional(pool)
            .await
            .context("Failed to read document text")
    }
}

pub struct ChatMessageQueries;

impl ChatMessageQueries {
    #[inline]
    pub async fn append(
        pool: &SqlitePool,
        notebook_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO chat_messages (notebook_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(notebook_id)
        .bind(role)
        .bind(content)
        .bind(created_at)
        .execute(pool)
        .await
        .context("Failed to store chat message")?
        .last_insert_rowid();

        Ok(ChatMessage {
            id,
            notebook_id: notebook_id.to_string(),
            role,
            content: content.to_string(),
            created_at,
        })
    }

    /// The last `limit` messages, oldest first
    #[inline]
    pub async fn recent(pool: &SqlitePool, notebook_id: &str, limit: i64) -> Result<Vec<ChatMessage>> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            "SELECT id, notebook_id, role, content, created_at FROM chat_messages \
             WHERE notebook_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(notebook_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to load chat history")?;

        messages.reverse();
        Ok(messages)
    }

    #[inline]
    pub async fn clear(pool: &SqlitePool, notebook_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE notebook_id = ?")
            .bind(notebook_id)
            .execute(pool)
            .await
            .context("Failed to clear chat history")?;
        Ok(result.rows_affected())
    }
}
