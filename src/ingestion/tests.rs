use super::*;
use crate::database::sqlite::models::DocumentStatus;
use crate::retry::RetryPolicy;
use crate::testing::HashingEmbedder;
use anyhow::Result;
use tempfile::TempDir;

const CHAPTER: &str = "The French Revolution began in 1789. It transformed the political \
landscape of France and ended the absolute monarchy.\n\nThe storming of the Bastille on \
14 July became its enduring symbol. Revolutionary ideas spread across Europe in the \
following decades, reshaping ideas about citizenship and rights.";

fn chunking() -> ChunkingConfig {
    ChunkingConfig {
        max_chunk_size: 120,
        overlap_size: 20,
        boundary_window: 40,
    }
}

async fn setup(embedder: Arc<HashingEmbedder>) -> Result<(TempDir, Database, Ingestor)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    let ingestor = Ingestor::new(
        database.clone(),
        VectorIndex::new(&database),
        embedder,
        Loader::new(RetryPolicy::default()),
        chunking(),
    );
    Ok((temp_dir, database, ingestor))
}

fn text_source(title: &str, text: &str) -> Source {
    Source::Text {
        title: title.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn ingest_records_document_and_chunks() -> Result<()> {
    let (_temp_dir, database, ingestor) = setup(HashingEmbedder::new()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;

    let document = ingestor
        .ingest(&notebook.id, &text_source("Chapter 1", CHAPTER))
        .await?;

    assert_eq!(document.status, DocumentStatus::Ingested);
    assert_eq!(document.title, "Chapter 1");
    assert!(document.ingested_at.is_some());
    assert!(document.chunk_count > 1);

    let index = VectorIndex::new(&database);
    let chunks = index.document_chunks(&notebook.id, &document.id).await?;
    assert_eq!(chunks.len() as i64, document.chunk_count);
    assert_eq!(chunks[0].start_offset, 0);
    assert_eq!(
        chunks.last().map(|c| c.end_offset),
        Some(CHAPTER.chars().count() as i64)
    );
    assert_eq!(index.dimension(&notebook.id).await?, Some(crate::testing::FAKE_DIMENSION));
    Ok(())
}

#[tokio::test]
async fn embedding_failure_marks_document_failed() -> Result<()> {
    let (_temp_dir, database, ingestor) = setup(HashingEmbedder::failing()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;

    let error = ingestor
        .ingest(&notebook.id, &text_source("Chapter 1", CHAPTER))
        .await
        .expect_err("embedding outage should fail ingestion");

    let ThinkbookError::IngestionFailed {
        notebook_id,
        document_id,
        reason,
    } = error
    else {
        panic!("expected IngestionFailed");
    };
    assert_eq!(notebook_id, notebook.id);
    assert!(reason.contains("connection refused"));

    let document = DocumentQueries::get(database.pool(), &notebook.id, &document_id)
        .await?
        .expect("failed document should be recorded");
    assert!(document.is_failed());
    assert_eq!(document.error_message.as_deref(), Some(reason.as_str()));
    assert_eq!(VectorIndex::new(&database).count(&notebook.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn reingest_recovers_failed_document() -> Result<()> {
    let (_temp_dir, database, broken) = setup(HashingEmbedder::failing()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;
    let Err(ThinkbookError::IngestionFailed { document_id, .. }) = broken
        .ingest(&notebook.id, &text_source("Chapter 1", CHAPTER))
        .await
    else {
        panic!("ingestion should fail");
    };

    let working = Ingestor::new(
        database.clone(),
        VectorIndex::new(&database),
        HashingEmbedder::new(),
        Loader::new(RetryPolicy::default()),
        chunking(),
    );
    let document = working.reingest(&notebook.id, &document_id).await?;

    assert!(document.is_ingested());
    assert_eq!(document.error_message, None);
    assert!(document.chunk_count > 0);

    let missing = working.reingest(&notebook.id, "missing").await;
    assert!(matches!(missing, Err(ThinkbookError::DocumentNotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn unloadable_source_leaves_no_record() -> Result<()> {
    let embedder = HashingEmbedder::new();
    let (_temp_dir, database, ingestor) = setup(embedder.clone()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;

    let error = ingestor
        .ingest(&notebook.id, &text_source("Stub", "too short"))
        .await
        .expect_err("short text should be rejected");

    assert!(matches!(error, ThinkbookError::InvalidInput(_)));
    assert!(
        DocumentQueries::list_for_notebook(database.pool(), &notebook.id)
            .await?
            .is_empty()
    );
    assert_eq!(embedder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_notebook_rejected() -> Result<()> {
    let (_temp_dir, _database, ingestor) = setup(HashingEmbedder::new()).await?;
    let error = ingestor
        .ingest("nope", &text_source("Chapter 1", CHAPTER))
        .await
        .expect_err("missing notebook");
    assert!(matches!(error, ThinkbookError::NotebookNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn ingest_many_keeps_input_order() -> Result<()> {
    let (_temp_dir, database, ingestor) = setup(HashingEmbedder::new()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;

    let sources: Vec<Source> = (1..=4)
        .map(|i| text_source(&format!("Chapter {i}"), &format!("{CHAPTER} Chapter {i}.")))
        .chain(std::iter::once(text_source("Stub", "short")))
        .collect();

    let results = ingestor.ingest_many(&notebook.id, &sources).await;

    assert_eq!(results.len(), 5);
    for (i, result) in results.iter().take(4).enumerate() {
        let document = result.as_ref().expect("chapter should ingest");
        assert_eq!(document.title, format!("Chapter {}", i + 1));
    }
    assert!(results[4].is_err());

    let ingested =
        DocumentQueries::list_by_status(database.pool(), &notebook.id, DocumentStatus::Ingested)
            .await?;
    assert_eq!(ingested.len(), 4);
    Ok(())
}

#[tokio::test]
async fn failed_reingest_keeps_indexed_chunks() -> Result<()> {
    let (_temp_dir, database, working) = setup(HashingEmbedder::new()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;
    let document = working
        .ingest(&notebook.id, &text_source("Chapter 1", CHAPTER))
        .await?;
    let index = VectorIndex::new(&database);
    let before = index.document_chunks(&notebook.id, &document.id).await?;

    let broken = Ingestor::new(
        database.clone(),
        index.clone(),
        HashingEmbedder::failing(),
        Loader::new(RetryPolicy::default()),
        chunking(),
    );
    let error = broken
        .reingest(&notebook.id, &document.id)
        .await
        .expect_err("embedding outage should fail reingestion");
    assert!(matches!(error, ThinkbookError::IngestionFailed { .. }));

    let after = index.document_chunks(&notebook.id, &document.id).await?;
    assert_eq!(after, before);
    let stored = DocumentQueries::get(database.pool(), &notebook.id, &document.id)
        .await?
        .expect("document still recorded");
    assert!(stored.is_ingested());
    assert_eq!(stored.chunk_count, document.chunk_count);
    Ok(())
}

#[tokio::test]
async fn reingest_replaces_chunks() -> Result<()> {
    let (_temp_dir, database, ingestor) = setup(HashingEmbedder::new()).await?;
    let notebook = NotebookQueries::create(database.pool(), "tester", "History").await?;
    let document = ingestor
        .ingest(&notebook.id, &text_source("Chapter 1", CHAPTER))
        .await?;

    let rebuilt = ingestor.reingest(&notebook.id, &document.id).await?;

    assert!(rebuilt.is_ingested());
    assert_eq!(rebuilt.chunk_count, document.chunk_count);
    assert_eq!(
        VectorIndex::new(&database).count(&notebook.id).await?,
        document.chunk_count as u64
    );
    Ok(())
}
