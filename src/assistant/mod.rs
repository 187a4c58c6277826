//! The entry point for front ends: notebook management, ingestion and
//! every generation feature, scoped by an opaque owner id.


use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::Database;
use crate::database::consistency::{ConsistencyReport, ConsistencyValidator, RepairSummary};
use crate::database::sqlite::models::{ChatMessage, Document, MessageRole, Notebook};
use crate::database::sqlite::queries::{ChatMessageQueries, DocumentQueries, NotebookQueries};
use crate::database::vector_index::VectorIndex;
use crate::embeddings::{Embedder, OllamaClient};
use crate::ingestion::{Ingestor, Loader, Source};
use crate::llm::{GroqClient, LanguageModel, Message};
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;
use crate::synthesis::{ChatAnswer, PodcastScript, Quiz, StudyGuide, SummaryMode, Synthesizer};
use crate::{Result, ThinkbookError};

#[derive(Clone)]
pub struct Assistant {
    database: Database,
    index: VectorIndex,
    ingestor: Ingestor,
    synthesizer: Synthesizer,
    config: Config,
}

impl Assistant {
    /// Open the database under the configured base directory and connect
    /// to the configured embedding and language models
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .context("Failed to open the notebook database")?;
        let embedder = OllamaClient::new(config).context("Failed to initialize Ollama client")?;
        let model = GroqClient::new(config);

        Ok(Self::with_components(
            database,
            Arc::new(embedder),
            Arc::new(model),
            config,
        ))
    }

    #[inline]
    pub fn with_components(
        database: Database,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        config: &Config,
    ) -> Self {
        let index = VectorIndex::new(&database);
        let retry = RetryPolicy::from_config(&config.retry);
        let ingestor = Ingestor::new(
            database.clone(),
            index.clone(),
            Arc::clone(&embedder),
            Loader::new(retry),
            config.chunking,
        );
        let retriever = Retriever::new(embedder, index.clone(), config.retrieval);
        let synthesizer = Synthesizer::new(
            model,
            retriever,
            database.clone(),
            config.synthesis,
            config.retrieval,
        );

        Self {
            database,
            index,
            ingestor,
            synthesizer,
            config: config.clone(),
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    #[inline]
    pub async fn create_notebook(&self, owner_id: &str, title: &str) -> Result<Notebook> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ThinkbookError::InvalidInput(
                "notebook title must not be empty".to_string(),
            ));
        }
        if NotebookQueries::get_by_title(self.database.pool(), owner_id, title)
            .await
            .map_err(ThinkbookError::database)?
            .is_some()
        {
            return Err(ThinkbookError::InvalidInput(format!(
                "a notebook named '{title}' already exists"
            )));
        }

        let notebook = NotebookQueries::create(self.database.pool(), owner_id, title)
            .await
            .map_err(ThinkbookError::database)?;
        info!("Created notebook '{}' ({}) for {}", notebook.title, notebook.id, owner_id);
        Ok(notebook)
    }

    #[inline]
    pub async fn list_notebooks(&self, owner_id: &str) -> Result<Vec<Notebook>> {
        NotebookQueries::list_for_owner(self.database.pool(), owner_id)
            .await
            .map_err(ThinkbookError::database)
    }

    /// Find one of the owner's notebooks by id, falling back to title
    #[inline]
    pub async fn resolve_notebook(&self, owner_id: &str, notebook: &str) -> Result<Notebook> {
        let pool = self.database.pool();
        if let Some(found) = NotebookQueries::get_by_id(pool, notebook)
            .await
            .map_err(ThinkbookError::database)?
            .filter(|n| n.owner_id == owner_id)
        {
            return Ok(found);
        }

        NotebookQueries::get_by_title(pool, owner_id, notebook.trim())
            .await
            .map_err(ThinkbookError::database)?
            .ok_or_else(|| ThinkbookError::NotebookNotFound(notebook.to_string()))
    }

    #[inline]
    pub async fn rename_notebook(&self, owner_id: &str, notebook: &str, title: &str) -> Result<Notebook> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ThinkbookError::InvalidInput(
                "notebook title must not be empty".to_string(),
            ));
        }
        let found = self.resolve_notebook(owner_id, notebook).await?;
        let clash = NotebookQueries::get_by_title(self.database.pool(), owner_id, title)
            .await
            .map_err(ThinkbookError::database)?
            .is_some_and(|existing| existing.id != found.id);
        if clash {
            return Err(ThinkbookError::InvalidInput(format!(
                "a notebook named '{title}' already exists"
            )));
        }

        NotebookQueries::rename(self.database.pool(), &found.id, title)
            .await
            .map_err(ThinkbookError::database)?;
        Ok(Notebook {
            title: title.to_string(),
            ..found
        })
    }

    /// Delete a notebook with its documents, chunks and chat history
    #[inline]
    pub async fn delete_notebook(&self, owner_id: &str, notebook: &str) -> Result<Notebook> {
        let found = self.resolve_notebook(owner_id, notebook).await?;
        self.index.delete_notebook(&found.id).await?;
        Ok(found)
    }

    /// Ingest into a notebook, creating it when `notebook` names no existing one
    #[inline]
    pub async fn ingest(&self, owner_id: &str, notebook: &str, source: &Source) -> Result<Document> {
        let notebook = self.resolve_or_create(owner_id, notebook).await?;
        self.ingestor.ingest(&notebook.id, source).await
    }

    #[inline]
    pub async fn ingest_many(
        &self,
        owner_id: &str,
        notebook: &str,
        sources: &[Source],
    ) -> Result<Vec<Result<Document>>> {
        let notebook = self.resolve_or_create(owner_id, notebook).await?;
        Ok(self.ingestor.ingest_many(&notebook.id, sources).await)
    }

    #[inline]
    pub async fn reingest(&self, owner_id: &str, notebook: &str, document_id: &str) -> Result<Document> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        self.ingestor.reingest(&notebook.id, document_id).await
    }

    async fn resolve_or_create(&self, owner_id: &str, notebook: &str) -> Result<Notebook> {
        match self.resolve_notebook(owner_id, notebook).await {
            Err(ThinkbookError::NotebookNotFound(_)) => self.create_notebook(owner_id, notebook).await,
            other => other,
        }
    }

    #[inline]
    pub async fn list_documents(&self, owner_id: &str, notebook: &str) -> Result<Vec<Document>> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        DocumentQueries::list_for_notebook(self.database.pool(), &notebook.id)
            .await
            .map_err(ThinkbookError::database)
    }

    /// Remove a document and everything indexed from it; returns the chunk count removed
    #[inline]
    pub async fn remove_document(&self, owner_id: &str, notebook: &str, document_id: &str) -> Result<u64> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        self.index.delete(&notebook.id, document_id).await
    }

    /// Answer a question from the notebook, continuing its stored conversation
    #[inline]
    pub async fn chat(&self, owner_id: &str, notebook: &str, question: &str) -> Result<ChatAnswer> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        let pool = self.database.pool();

        let history: Vec<Message> = ChatMessageQueries::recent(
            pool,
            &notebook.id,
            self.config.retrieval.history_turns as i64,
        )
        .await
        .map_err(ThinkbookError::database)?
        .into_iter()
        .map(|m| match m.role {
            MessageRole::User => Message::user(m.content),
            MessageRole::Assistant => Message::assistant(m.content),
        })
        .collect();
        debug!("Loaded {} history messages for chat", history.len());

        let answer = self
            .synthesizer
            .chat(&notebook.id, question, &history)
            .await?;

        ChatMessageQueries::append(pool, &notebook.id, MessageRole::User, question.trim())
            .await
            .map_err(ThinkbookError::database)?;
        ChatMessageQueries::append(pool, &notebook.id, MessageRole::Assistant, answer.text())
            .await
            .map_err(ThinkbookError::database)?;

        Ok(answer)
    }

    #[inline]
    pub async fn chat_history(&self, owner_id: &str, notebook: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        ChatMessageQueries::recent(self.database.pool(), &notebook.id, limit as i64)
            .await
            .map_err(ThinkbookError::database)
    }

    #[inline]
    pub async fn clear_chat(&self, owner_id: &str, notebook: &str) -> Result<u64> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        ChatMessageQueries::clear(self.database.pool(), &notebook.id)
            .await
            .map_err(ThinkbookError::database)
    }

    #[inline]
    pub async fn summarize(
        &self,
        owner_id: &str,
        notebook: &str,
        mode: SummaryMode,
        document_id: Option<&str>,
    ) -> Result<String> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        self.synthesizer
            .summarize(&notebook.id, mode, document_id)
            .await
    }

    /// `questions` defaults to the configured quiz length
    #[inline]
    pub async fn quiz(&self, owner_id: &str, notebook: &str, questions: Option<usize>) -> Result<Quiz> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        let questions = questions.unwrap_or(self.config.synthesis.default_quiz_questions);
        self.synthesizer.quiz(&notebook.id, questions).await
    }

    #[inline]
    pub async fn study_guide(&self, owner_id: &str, notebook: &str) -> Result<StudyGuide> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        self.synthesizer.study_guide(&notebook.id).await
    }

    #[inline]
    pub async fn podcast_script(
        &self,
        owner_id: &str,
        notebook: &str,
        exchanges: Option<usize>,
    ) -> Result<PodcastScript> {
        let notebook = self.resolve_notebook(owner_id, notebook).await?;
        let exchanges = exchanges.unwrap_or(self.config.synthesis.default_podcast_exchanges);
        self.synthesizer.podcast_script(&notebook.id, exchanges).await
    }

    /// Audit the owner's notebooks, or every owner's when `owner_id` is
    /// `None` (admin use), optionally repairing what can be repaired
    #[inline]
    pub async fn check_consistency(
        &self,
        owner_id: Option<&str>,
        repair: bool,
    ) -> Result<(ConsistencyReport, Option<RepairSummary>)> {
        let validator = ConsistencyValidator::new(&self.database, &self.index);
        let report = match owner_id {
            Some(owner_id) => validator.validate_owner_consistency(owner_id).await?,
            None => validator.validate_consistency().await?,
        };
        let summary = if repair && !report.is_consistent {
            Some(validator.repair(&report).await?)
        } else {
            None
        };
        Ok((report, summary))
    }
}
