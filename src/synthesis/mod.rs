//! Grounded generation: every task builds its prompt from notebook content
//! and refuses to call the model when there is none.

pub mod podcast;
pub mod prompts;
pub mod quiz;
pub mod study_guide;


use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{RetrievalConfig, SynthesisConfig};
use crate::database::Database;
use crate::database::sqlite::queries::DocumentQueries;
use crate::database::vector_index::{IndexedChunk, ScoredChunk};
use crate::embeddings::chunking::reassemble;
use crate::llm::{CompletionRequest, LanguageModel, Message};
use crate::retrieval::Retriever;
use crate::{Result, ThinkbookError};

pub use podcast::{DialogueTurn, PodcastScript, Speaker};
pub use quiz::{Quiz, QuizItem};
pub use study_guide::{Flashcard, OutlineSection, StudyGuide};

/// Returned in place of a model answer when nothing relevant was retrieved
pub const INSUFFICIENT_GROUNDING_RESPONSE: &str = "I couldn't find anything in this notebook's \
documents to answer that. Try uploading a source that covers it, or rephrase the question.";

const TRUNCATION_MARKER: &str = "[... document truncated ...]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    Chat,
    Summary,
    Quiz,
    StudyGuide,
    PodcastScript,
}

impl fmt::Display for TaskKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Summary => write!(f, "summary"),
            Self::Quiz => write!(f, "quiz"),
            Self::StudyGuide => write!(f, "study guide"),
            Self::PodcastScript => write!(f, "podcast script"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SummaryMode {
    /// A handful of sentences
    Brief,
    /// A longer, sectioned summary
    Descriptive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Chat {
        question: String,
        /// Earlier turns, oldest first
        history: Vec<Message>,
    },
    Summary {
        mode: SummaryMode,
        /// Summarize one document rather than the whole notebook
        document_id: Option<String>,
    },
    Quiz {
        questions: usize,
    },
    StudyGuide,
    PodcastScript {
        exchanges: usize,
    },
}

impl Task {
    #[inline]
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Chat { .. } => TaskKind::Chat,
            Self::Summary { .. } => TaskKind::Summary,
            Self::Quiz { .. } => TaskKind::Quiz,
            Self::StudyGuide => TaskKind::StudyGuide,
            Self::PodcastScript { .. } => TaskKind::PodcastScript,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChatAnswer {
    Grounded {
        answer: String,
        /// Passages the answer was conditioned on, in prompt order
        sources: Vec<ScoredChunk>,
    },
    /// Nothing relevant was retrieved, so the model was not called
    InsufficientGrounding,
}

impl ChatAnswer {
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Self::Grounded { answer, .. } => answer,
            Self::InsufficientGrounding => INSUFFICIENT_GROUNDING_RESPONSE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TaskOutput {
    Chat(ChatAnswer),
    Summary(String),
    Quiz(Quiz),
    StudyGuide(StudyGuide),
    PodcastScript(PodcastScript),
}

/// Sampling settings per task
fn sampling(kind: TaskKind) -> (f32, u32) {
    match kind {
        TaskKind::Chat => (0.6, 2048),
        TaskKind::Summary => (0.4, 2048),
        TaskKind::Quiz => (0.4, 3000),
        TaskKind::StudyGuide => (0.5, 3000),
        TaskKind::PodcastScript => (0.88, 4096),
    }
}

#[derive(Clone)]
pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    retriever: Retriever,
    database: Database,
    synthesis: SynthesisConfig,
    retrieval: RetrievalConfig,
}

impl Synthesizer {
    #[inline]
    pub fn new(
        model: Arc<dyn LanguageModel>,
        retriever: Retriever,
        database: Database,
        synthesis: SynthesisConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            model,
            retriever,
            database,
            synthesis,
            retrieval,
        }
    }

    #[inline]
    pub async fn synthesize(&self, notebook_id: &str, task: Task) -> Result<TaskOutput> {
        debug!("Running {} task on notebook {}", task.kind(), notebook_id);
        match task {
            Task::Chat { question, history } => self
                .chat(notebook_id, &question, &history)
                .await
                .map(TaskOutput::Chat),
            Task::Summary { mode, document_id } => self
                .summarize(notebook_id, mode, document_id.as_deref())
                .await
                .map(TaskOutput::Summary),
            Task::Quiz { questions } => self
                .quiz(notebook_id, questions)
                .await
                .map(TaskOutput::Quiz),
            Task::StudyGuide => self
                .study_guide(notebook_id)
                .await
                .map(TaskOutput::StudyGuide),
            Task::PodcastScript { exchanges } => self
                .podcast_script(notebook_id, exchanges)
                .await
                .map(TaskOutput::PodcastScript),
        }
    }

    /// Answer from the notebook's most relevant passages only
    #[inline]
    pub async fn chat(
        &self,
        notebook_id: &str,
        question: &str,
        history: &[Message],
    ) -> Result<ChatAnswer> {
        let retrieved = self
            .retriever
            .retrieve(notebook_id, question, self.retriever.default_top_k())
            .await?;

        if retrieved.is_empty() {
            info!(
                "No passages for chat in notebook {}, answering without the model",
                notebook_id
            );
            return Ok(ChatAnswer::InsufficientGrounding);
        }

        let mut messages = vec![Message::system(prompts::CHAT_SYSTEM_PROMPT)];
        let skip = history.len().saturating_sub(self.retrieval.history_turns);
        messages.extend(history.iter().skip(skip).cloned());
        messages.push(Message::user(prompts::chat_user_message(
            &prompts::context_blocks(&retrieved.hits),
            question.trim(),
        )));

        let answer = self.generate(TaskKind::Chat, notebook_id, messages).await?;
        Ok(ChatAnswer::Grounded {
            answer,
            sources: retrieved.hits,
        })
    }

    /// Summarize from all chunks of one document, or of the whole notebook
    #[inline]
    pub async fn summarize(
        &self,
        notebook_id: &str,
        mode: SummaryMode,
        document_id: Option<&str>,
    ) -> Result<String> {
        let text = match document_id {
            Some(document_id) => self.document_text(notebook_id, document_id).await?,
            None => self.notebook_text(notebook_id).await?,
        };
        let text = truncate_words(&text, self.synthesis.summary_max_words);

        let instruction = match mode {
            SummaryMode::Brief => prompts::BRIEF_SUMMARY_PROMPT,
            SummaryMode::Descriptive => prompts::DESCRIPTIVE_SUMMARY_PROMPT,
        };
        let messages = vec![
            Message::system(instruction),
            Message::user(prompts::document_message(&text)),
        ];
        self.generate(TaskKind::Summary, notebook_id, messages).await
    }

    /// Generate up to `questions` validated items, regenerating on shortfall
    #[inline]
    pub async fn quiz(&self, notebook_id: &str, questions: usize) -> Result<Quiz> {
        if questions == 0 {
            return Err(ThinkbookError::InvalidInput(
                "a quiz needs at least one question".to_string(),
            ));
        }
        let text = self.bounded_notebook_text(notebook_id).await?;
        let messages = vec![
            Message::system(prompts::quiz_prompt(questions)),
            Message::user(prompts::document_message(&text)),
        ];

        let mut accepted: Vec<QuizItem> = Vec::new();
        let attempts = 1 + self.synthesis.quiz_regeneration_attempts;
        for attempt in 1..=attempts {
            let raw = self
                .generate(TaskKind::Quiz, notebook_id, messages.clone())
                .await?;
            let parsed = quiz::parse_items(&raw);
            if parsed.discarded > 0 {
                warn!(
                    "Discarded {} malformed quiz items on attempt {}/{}",
                    parsed.discarded, attempt, attempts
                );
            }

            for item in parsed.valid {
                let duplicate = accepted.iter().any(|a| a.question == item.question);
                if accepted.len() < questions && !duplicate {
                    accepted.push(item);
                }
            }
            if accepted.len() >= questions {
                break;
            }
        }

        if accepted.is_empty() {
            return Err(generation_failed(
                TaskKind::Quiz,
                notebook_id,
                format!("no valid quiz items after {attempts} attempts"),
            ));
        }
        if accepted.len() < questions {
            warn!(
                "Quiz for notebook {} has {} of {} requested questions",
                notebook_id,
                accepted.len(),
                questions
            );
        }

        Ok(Quiz {
            items: accepted,
            requested: questions,
        })
    }

    #[inline]
    pub async fn study_guide(&self, notebook_id: &str) -> Result<StudyGuide> {
        let text = self.bounded_notebook_text(notebook_id).await?;
        let messages = vec![
            Message::system(prompts::STUDY_GUIDE_PROMPT),
            Message::user(prompts::document_message(&text)),
        ];

        self.generate_validated(TaskKind::StudyGuide, notebook_id, messages, StudyGuide::parse)
            .await
    }

    #[inline]
    pub async fn podcast_script(&self, notebook_id: &str, exchanges: usize) -> Result<PodcastScript> {
        let text = self.bounded_notebook_text(notebook_id).await?;
        let messages = vec![
            Message::system(prompts::podcast_prompt(exchanges.max(1))),
            Message::user(prompts::podcast_user_message(&text)),
        ];

        self.generate_validated(TaskKind::PodcastScript, notebook_id, messages, |raw| {
            let script = PodcastScript::parse(raw);
            if script.is_well_formed() {
                Ok(script)
            } else {
                Err(format!(
                    "expected an exchange between two speakers, got {} turns",
                    script.turns.len()
                ))
            }
        })
        .await
    }

    async fn generate(
        &self,
        kind: TaskKind,
        notebook_id: &str,
        messages: Vec<Message>,
    ) -> Result<String> {
        let (temperature, max_tokens) = sampling(kind);
        let request = CompletionRequest {
            messages,
            temperature,
            max_tokens,
        };

        self.model
            .complete(&request)
            .await
            .map_err(|e| generation_failed(kind, notebook_id, e.to_string()))
    }

    /// Call the model until `parse` accepts the output, within the regeneration bound
    async fn generate_validated<T, P>(
        &self,
        kind: TaskKind,
        notebook_id: &str,
        messages: Vec<Message>,
        parse: P,
    ) -> Result<T>
    where
        P: Fn(&str) -> std::result::Result<T, String>,
    {
        let attempts = 1 + self.synthesis.quiz_regeneration_attempts;
        let mut last_problem = String::new();
        for attempt in 1..=attempts {
            let raw = self.generate(kind, notebook_id, messages.clone()).await?;
            match parse(&raw) {
                Ok(value) => return Ok(value),
                Err(problem) => {
                    warn!(
                        "Malformed {} output on attempt {}/{}: {}",
                        kind, attempt, attempts, problem
                    );
                    last_problem = problem;
                }
            }
        }

        Err(generation_failed(
            kind,
            notebook_id,
            format!("malformed output after {attempts} attempts: {last_problem}"),
        ))
    }

    async fn bounded_notebook_text(&self, notebook_id: &str) -> Result<String> {
        let text = self.notebook_text(notebook_id).await?;
        Ok(truncate_words(&text, self.synthesis.max_context_words))
    }

    /// All ingested text in the notebook, one titled section per document
    async fn notebook_text(&self, notebook_id: &str) -> Result<String> {
        let index = self.retriever.index();
        if index.dimension(notebook_id).await?.is_none() {
            return Err(no_content());
        }

        let titles: HashMap<String, String> =
            DocumentQueries::list_for_notebook(self.database.pool(), notebook_id)
                .await
                .map_err(ThinkbookError::database)?
                .into_iter()
                .map(|d| (d.id, d.title))
                .collect();

        let chunks = index.notebook_chunks(notebook_id).await?;
        let by_document = chunks.iter().chunk_by(|chunk| chunk.document_id.as_str());
        let sections: Vec<String> = by_document
            .into_iter()
            .map(|(document_id, group)| {
                let title = titles.get(document_id).map_or(document_id, String::as_str);
                format!("## {title}\n\n{}", reassemble_chunks(group))
            })
            .collect();

        if sections.is_empty() {
            return Err(no_content());
        }
        Ok(sections.join("\n\n"))
    }

    async fn document_text(&self, notebook_id: &str, document_id: &str) -> Result<String> {
        let document = DocumentQueries::get(self.database.pool(), notebook_id, document_id)
            .await
            .map_err(ThinkbookError::database)?;
        if document.is_none() {
            // Distinguish a missing notebook from a missing document
            self.retriever.index().dimension(notebook_id).await?;
            return Err(ThinkbookError::DocumentNotFound {
                notebook_id: notebook_id.to_string(),
                document_id: document_id.to_string(),
            });
        }

        let chunks = self
            .retriever
            .index()
            .document_chunks(notebook_id, document_id)
            .await?;
        if chunks.is_empty() {
            return Err(ThinkbookError::InvalidInput(format!(
                "document {document_id} has no ingested content"
            )));
        }
        Ok(reassemble_chunks(chunks.iter()))
    }
}

fn reassemble_chunks<'a, I: IntoIterator<Item = &'a IndexedChunk>>(chunks: I) -> String {
    reassemble(chunks.into_iter().map(|c| {
        (
            c.start_offset as usize,
            c.end_offset as usize,
            c.content.as_str(),
        )
    }))
}

fn no_content() -> ThinkbookError {
    ThinkbookError::InvalidInput("notebook has no ingested content".to_string())
}

fn generation_failed(task: TaskKind, notebook_id: &str, cause: String) -> ThinkbookError {
    ThinkbookError::GenerationFailed {
        task,
        notebook_id: notebook_id.to_string(),
        cause,
    }
}

/// Keep the first `max_words` words, marking the cut when one is made
#[inline]
pub fn truncate_words(text: &str, max_words: usize) -> String {
    if text.split_whitespace().nth(max_words).is_none() {
        return text.to_string();
    }
    let kept = text.split_whitespace().take(max_words).join(" ");
    format!("{kept}\n\n{TRUNCATION_MARKER}")
}
