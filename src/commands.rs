use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::assistant::Assistant;
use crate::database::sqlite::models::{Document, MessageRole};
use crate::ingestion::Source;
use crate::synthesis::{ChatAnswer, Quiz, SummaryMode};

#[inline]
pub async fn create_notebook(assistant: &Assistant, owner: &str, title: &str) -> Result<()> {
    let notebook = assistant.create_notebook(owner, title).await?;
    println!("Created notebook: {} (ID: {})", notebook.title, notebook.id);
    Ok(())
}

#[inline]
pub async fn list_notebooks(assistant: &Assistant, owner: &str) -> Result<()> {
    let notebooks = assistant.list_notebooks(owner).await?;
    if notebooks.is_empty() {
        println!("No notebooks yet.");
        println!("Use 'thinkbook ingest <notebook> <file-or-url>' to create one.");
        return Ok(());
    }

    println!("Notebooks ({} total):", notebooks.len());
    println!();
    for notebook in &notebooks {
        let documents = assistant.list_documents(owner, &notebook.id).await?;
        let ingested = documents.iter().filter(|d| d.is_ingested()).count();
        let chunks: i64 = documents.iter().map(|d| d.chunk_count).sum();

        println!("📓 {} (ID: {})", style(&notebook.title).bold(), notebook.id);
        println!("   Documents: {} ({} ingested)", documents.len(), ingested);
        println!("   Chunks: {chunks}");
        println!(
            "   Created: {}",
            notebook.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }
    Ok(())
}

#[inline]
pub async fn rename_notebook(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    title: &str,
) -> Result<()> {
    let renamed = assistant.rename_notebook(owner, notebook, title).await?;
    println!("Renamed notebook {} to '{}'", renamed.id, renamed.title);
    Ok(())
}

#[inline]
pub async fn delete_notebook(assistant: &Assistant, owner: &str, notebook: &str) -> Result<()> {
    let deleted = assistant.delete_notebook(owner, notebook).await?;
    println!(
        "Deleted notebook '{}' with all of its documents",
        deleted.title
    );
    Ok(())
}

/// Ingest every source concurrently behind a spinner, then report each outcome
#[inline]
pub async fn ingest_sources(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    sources: &[String],
) -> Result<()> {
    let sources: Vec<Source> = sources.iter().map(|s| Source::from_arg(s)).collect();

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} Ingesting {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("{} source(s) into '{}'", sources.len(), notebook));
    bar.enable_steady_tick(Duration::from_millis(120));

    let results = assistant.ingest_many(owner, notebook, &sources).await;
    bar.finish_and_clear();
    let results = results?;

    let mut failures = 0;
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(document) => print_ingested(&document),
            Err(e) => {
                failures += 1;
                error!("Failed to ingest {}: {}", source.label(), e);
                println!("{} {}: {}", style("✗").red(), source.label(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} sources failed to ingest", sources.len());
    }
    Ok(())
}

fn print_ingested(document: &Document) {
    println!(
        "{} {} ({}, {} chunks, ID: {})",
        style("✓").green(),
        document.title,
        document.source_type,
        document.chunk_count,
        document.id
    );
}

#[inline]
pub async fn list_documents(assistant: &Assistant, owner: &str, notebook: &str) -> Result<()> {
    let documents = assistant.list_documents(owner, notebook).await?;
    if documents.is_empty() {
        println!("This notebook has no documents.");
        return Ok(());
    }

    for document in &documents {
        println!("📄 {} (ID: {})", style(&document.title).bold(), document.id);
        println!("   Source: {} ({})", document.source, document.source_type);
        println!("   Status: {}", document.status);
        println!("   Chunks: {}", document.chunk_count);
        if let Some(ingested_at) = document.ingested_at {
            println!("   Ingested: {}", ingested_at.format("%Y-%m-%d %H:%M:%S"));
        }
        if let Some(error) = &document.error_message {
            println!("   ⚠️  Error: {error}");
        }
        println!();
    }
    Ok(())
}

#[inline]
pub async fn remove_document(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    document_id: &str,
) -> Result<()> {
    let removed = assistant
        .remove_document(owner, notebook, document_id)
        .await?;
    println!("Removed document {document_id} and {removed} chunks");
    Ok(())
}

#[inline]
pub async fn reingest_document(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    document_id: &str,
) -> Result<()> {
    let document = assistant.reingest(owner, notebook, document_id).await?;
    print_ingested(&document);
    Ok(())
}

#[inline]
pub async fn chat(assistant: &Assistant, owner: &str, notebook: &str, question: &str) -> Result<()> {
    let answer = assistant.chat(owner, notebook, question).await?;
    println!("{}", answer.text());

    if let ChatAnswer::Grounded { sources, .. } = &answer {
        println!();
        println!("{}", style("Sources:").dim());
        for (i, source) in sources.iter().enumerate() {
            println!(
                "{}",
                style(format!(
                    "  [{}] {} (chunk {}, score {:.3})",
                    i + 1,
                    source.document_title,
                    source.chunk.ordinal,
                    source.score
                ))
                .dim()
            );
        }
    }
    Ok(())
}

#[inline]
pub async fn show_history(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    limit: usize,
) -> Result<()> {
    let messages = assistant.chat_history(owner, notebook, limit).await?;
    if messages.is_empty() {
        println!("No chat history yet.");
        return Ok(());
    }

    for message in &messages {
        let speaker = match message.role {
            MessageRole::User => style("You").cyan().bold(),
            MessageRole::Assistant => style("ThinkBook").green().bold(),
        };
        println!(
            "{} {}",
            speaker,
            style(message.created_at.format("%Y-%m-%d %H:%M")).dim()
        );
        println!("{}", message.content);
        println!();
    }
    Ok(())
}

#[inline]
pub async fn clear_chat(assistant: &Assistant, owner: &str, notebook: &str) -> Result<()> {
    let cleared = assistant.clear_chat(owner, notebook).await?;
    println!("Cleared {cleared} chat messages");
    Ok(())
}

#[inline]
pub async fn summarize(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    document: Option<&str>,
    descriptive: bool,
) -> Result<()> {
    let mode = if descriptive {
        SummaryMode::Descriptive
    } else {
        SummaryMode::Brief
    };
    let summary = assistant.summarize(owner, notebook, mode, document).await?;
    println!("{summary}");
    Ok(())
}

#[inline]
pub async fn quiz(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    questions: Option<usize>,
    interactive: bool,
) -> Result<()> {
    let quiz = assistant.quiz(owner, notebook, questions).await?;
    if !quiz.is_complete() {
        println!(
            "{}",
            style(format!(
                "Only {} of {} requested questions could be generated.",
                quiz.items.len(),
                quiz.requested
            ))
            .yellow()
        );
    }

    if interactive {
        run_quiz(&quiz)
    } else {
        print_quiz(&quiz);
        Ok(())
    }
}

fn print_quiz(quiz: &Quiz) {
    for (i, item) in quiz.items.iter().enumerate() {
        println!("{}. {}", i + 1, style(&item.question).bold());
        for (key, text) in &item.options {
            println!("   {key}) {text}");
        }
        println!("   Answer: {}", item.answer);
        if !item.explanation.is_empty() {
            println!("   {}", style(&item.explanation).dim());
        }
        println!();
    }
}

fn run_quiz(quiz: &Quiz) -> Result<()> {
    let mut answers = Vec::with_capacity(quiz.items.len());

    for (i, item) in quiz.items.iter().enumerate() {
        let prompt = format!("{}. {}", i + 1, item.question);
        let answer = if item.options.is_empty() {
            Input::<String>::new().with_prompt(prompt).interact_text()?
        } else {
            let labels: Vec<String> = item
                .options
                .iter()
                .map(|(key, text)| format!("{key}) {text}"))
                .collect();
            let choice = Select::new()
                .with_prompt(prompt)
                .items(&labels)
                .default(0)
                .interact()?;
            item.options.keys().nth(choice).cloned().unwrap_or_default()
        };

        if item.check(&answer) {
            eprintln!("{}", style("✓ Correct!").green());
        } else {
            eprintln!(
                "{}",
                style(format!("✗ The answer was {}", item.answer)).red()
            );
        }
        if !item.explanation.is_empty() {
            eprintln!("  {}", style(&item.explanation).dim());
        }
        eprintln!();
        answers.push(answer);
    }

    println!(
        "Score: {}/{}",
        quiz.score(&answers),
        quiz.items.len()
    );
    Ok(())
}

#[inline]
pub async fn study_guide(assistant: &Assistant, owner: &str, notebook: &str) -> Result<()> {
    let guide = assistant.study_guide(owner, notebook).await?;
    println!("{}", guide.to_markdown());
    Ok(())
}

#[inline]
pub async fn podcast(
    assistant: &Assistant,
    owner: &str,
    notebook: &str,
    exchanges: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let script = assistant.podcast_script(owner, notebook, exchanges).await?;
    let tagged = script.to_tagged_text();

    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{tagged}\n"))
                .await
                .with_context(|| format!("Failed to write script to {}", path.display()))?;
            info!("Wrote {} podcast turns to {}", script.turns.len(), path.display());
            println!(
                "Wrote {} turns to {}",
                script.turns.len(),
                path.display()
            );
        }
        None => println!("{tagged}"),
    }
    Ok(())
}

/// `owner` of `None` checks every owner's notebooks
#[inline]
pub async fn check(assistant: &Assistant, owner: Option<&str>, repair: bool) -> Result<()> {
    let (report, summary) = assistant.check_consistency(owner, repair).await?;

    if report.is_consistent {
        println!(
            "{} {} notebooks, {} documents checked, no issues",
            style("✓").green(),
            report.notebooks_checked,
            report.documents_checked
        );
        return Ok(());
    }

    for issue in &report.issues {
        println!("📓 {} ({})", style(&issue.notebook_title).bold(), issue.notebook_id);
        for mismatch in &issue.count_mismatches {
            println!(
                "   Document {}: {} chunks recorded, {} indexed",
                mismatch.document_id, mismatch.recorded, mismatch.indexed
            );
        }
        for document_id in &issue.stale_pending {
            println!("   Document {document_id}: ingestion never completed");
        }
        for document_id in &issue.unexpected_chunks {
            println!("   Document {document_id}: chunks indexed for an unfinished document");
        }
        for document_id in &issue.dimension_mismatches {
            println!("   Document {document_id}: embedding dimension differs from notebook");
        }
    }

    match summary {
        Some(summary) => println!(
            "Repaired: {} documents marked failed, {} chunks removed",
            summary.documents_failed, summary.chunks_removed
        ),
        None => println!("Run 'thinkbook check --repair' to fix what can be fixed."),
    }

    let needs_rebuild = report
        .issues
        .iter()
        .any(|i| !i.count_mismatches.is_empty() || !i.dimension_mismatches.is_empty());
    if needs_rebuild {
        println!(
            "Rebuild mismatched documents with 'thinkbook reingest <notebook> <document-id>'."
        );
    }
    Ok(())
}
