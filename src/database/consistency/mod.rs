//! Audits agreement between document records and the vector index.


use chrono::{Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::sqlite::Database;
use super::sqlite::models::{Document, DocumentStatus, Notebook};
use super::sqlite::queries::{DocumentQueries, NotebookQueries};
use super::vector_index::VectorIndex;
use crate::{Result, ThinkbookError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub notebooks_checked: usize,
    pub documents_checked: usize,
    pub issues: Vec<NotebookConsistencyIssue>,
    pub is_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCountMismatch {
    pub document_id: String,
    /// `chunk_count` on the document record
    pub recorded: i64,
    /// Chunks actually present in the index
    pub indexed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotebookConsistencyIssue {
    pub notebook_id: String,
    pub notebook_title: String,
    pub count_mismatches: Vec<ChunkCountMismatch>,
    /// Documents still pending long after ingestion should have finished
    pub stale_pending: Vec<String>,
    /// Failed or pending documents that nonetheless have indexed chunks
    pub unexpected_chunks: Vec<String>,
    /// Documents whose stored vectors disagree with the notebook dimension
    pub dimension_mismatches: Vec<String>,
}

impl NotebookConsistencyIssue {
    fn is_empty(&self) -> bool {
        self.count_mismatches.is_empty()
            && self.stale_pending.is_empty()
            && self.unexpected_chunks.is_empty()
            && self.dimension_mismatches.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairSummary {
    pub documents_failed: usize,
    pub chunks_removed: u64,
}

pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    index: &'a VectorIndex,
    stale_after: Duration,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database, index: &'a VectorIndex) -> Self {
        Self {
            database,
            index,
            stale_after: Duration::hours(1),
        }
    }

    /// How old a pending document must be before it counts as abandoned
    #[inline]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Audit every owner's notebooks. Admin-only: callers acting for one
    /// owner use [`Self::validate_owner_consistency`].
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting index consistency validation");

        let notebooks = NotebookQueries::list_all(self.database.pool())
            .await
            .map_err(ThinkbookError::database)?;
        self.validate_notebooks(&notebooks).await
    }

    /// Audit only the notebooks belonging to `owner_id`
    #[inline]
    pub async fn validate_owner_consistency(&self, owner_id: &str) -> Result<ConsistencyReport> {
        info!("Starting index consistency validation for owner {}", owner_id);

        let notebooks = NotebookQueries::list_for_owner(self.database.pool(), owner_id)
            .await
            .map_err(ThinkbookError::database)?;
        self.validate_notebooks(&notebooks).await
    }

    async fn validate_notebooks(&self, notebooks: &[Notebook]) -> Result<ConsistencyReport> {
        let mut issues = Vec::new();
        let mut documents_checked = 0;
        for notebook in notebooks {
            let (issue, documents) = self.check_notebook(notebook).await?;
            documents_checked += documents;
            if !issue.is_empty() {
                issues.push(issue);
            }
        }

        let report = ConsistencyReport {
            notebooks_checked: notebooks.len(),
            documents_checked,
            is_consistent: issues.is_empty(),
            issues,
        };

        if report.is_consistent {
            info!(
                "Consistency validation passed for {} notebooks",
                report.notebooks_checked
            );
        } else {
            warn!(
                "Consistency validation found issues in {} notebooks",
                report.issues.len()
            );
        }

        Ok(report)
    }

    async fn check_notebook(&self, notebook: &Notebook) -> Result<(NotebookConsistencyIssue, usize)> {
        let documents = DocumentQueries::list_for_notebook(self.database.pool(), &notebook.id)
            .await
            .map_err(ThinkbookError::database)?;
        let stats: HashMap<String, _> = self
            .index
            .document_stats(&notebook.id)
            .await?
            .into_iter()
            .map(|s| (s.document_id.clone(), s))
            .collect();

        let stale_before = Utc::now() - self.stale_after;
        let mut issue = NotebookConsistencyIssue {
            notebook_id: notebook.id.clone(),
            notebook_title: notebook.title.clone(),
            ..NotebookConsistencyIssue::default()
        };

        for document in &documents {
            let indexed = stats.get(&document.id);
            let indexed_count = indexed.map_or(0, |s| s.chunk_count);

            match document.status {
                DocumentStatus::Ingested if indexed_count != document.chunk_count => {
                    issue.count_mismatches.push(ChunkCountMismatch {
                        document_id: document.id.clone(),
                        recorded: document.chunk_count,
                        indexed: indexed_count,
                    });
                }
                DocumentStatus::Ingested => {}
                DocumentStatus::Pending | DocumentStatus::Failed => {
                    if indexed_count > 0 {
                        issue.unexpected_chunks.push(document.id.clone());
                    }
                    if is_stale(document, stale_before) {
                        issue.stale_pending.push(document.id.clone());
                    }
                }
            }

            let dimension_mismatch = match (indexed, notebook.embedding_dimension) {
                (Some(stats), Some(dimension)) => {
                    stats.min_dimension != dimension || stats.max_dimension != dimension
                }
                _ => false,
            };
            if dimension_mismatch {
                issue.dimension_mismatches.push(document.id.clone());
            }
        }

        debug!(
            "Checked notebook {} ({} documents)",
            notebook.id,
            documents.len()
        );
        Ok((issue, documents.len()))
    }

    /// Mark abandoned ingestions failed and drop chunks of documents that
    /// never finished ingesting
    #[inline]
    pub async fn repair(&self, report: &ConsistencyReport) -> Result<RepairSummary> {
        let mut summary = RepairSummary::default();

        for issue in &report.issues {
            for document_id in &issue.stale_pending {
                let marked = DocumentQueries::mark_failed(
                    self.database.pool(),
                    &issue.notebook_id,
                    document_id,
                    "ingestion did not complete",
                )
                .await
                .map_err(ThinkbookError::database)?;
                if marked {
                    summary.documents_failed += 1;
                }
            }

            for document_id in &issue.unexpected_chunks {
                summary.chunks_removed += self
                    .index
                    .purge_chunks(&issue.notebook_id, document_id)
                    .await?;
            }
        }

        info!(
            "Repair marked {} documents failed and removed {} chunks",
            summary.documents_failed, summary.chunks_removed
        );
        Ok(summary)
    }
}

fn is_stale(document: &Document, stale_before: chrono::DateTime<Utc>) -> bool {
    document.status == DocumentStatus::Pending && document.created_at < stale_before
}
