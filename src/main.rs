use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thinkbook::assistant::Assistant;
use thinkbook::commands::{
    chat, check, clear_chat, create_notebook, delete_notebook, ingest_sources, list_documents,
    list_notebooks, podcast, quiz, reingest_document, remove_document, rename_notebook,
    show_history, study_guide, summarize,
};
use thinkbook::config::{get_config_dir, load_default, run_interactive_config, show_config};
use thinkbook::{Result, ThinkbookError};

#[derive(Parser)]
#[command(name = "thinkbook")]
#[command(about = "Ask questions about your documents, and turn them into summaries, quizzes and podcasts")]
#[command(version)]
struct Cli {
    /// Owner whose notebooks are used; defaults to the configured user
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding service and language model
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Manage notebooks
    Notebook {
        #[command(subcommand)]
        action: NotebookAction,
    },
    /// Ingest files or URLs into a notebook, creating it if needed
    Ingest {
        /// Notebook ID or title
        notebook: String,
        /// File paths or http(s) URLs
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// List the documents of a notebook
    Documents {
        /// Notebook ID or title
        notebook: String,
    },
    /// Remove a document and its chunks from a notebook
    Remove {
        /// Notebook ID or title
        notebook: String,
        document_id: String,
    },
    /// Rebuild a document's chunks from its stored text
    Reingest {
        /// Notebook ID or title
        notebook: String,
        document_id: String,
    },
    /// Ask a question answered from the notebook's documents
    Chat {
        /// Notebook ID or title
        notebook: String,
        question: String,
    },
    /// Show the notebook's recent chat messages
    History {
        /// Notebook ID or title
        notebook: String,
        /// Number of messages to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Forget the notebook's chat history
    ClearChat {
        /// Notebook ID or title
        notebook: String,
    },
    /// Summarize a notebook or one of its documents
    Summarize {
        /// Notebook ID or title
        notebook: String,
        /// Summarize only this document
        #[arg(long)]
        document: Option<String>,
        /// Produce a sectioned summary instead of a short one
        #[arg(long)]
        descriptive: bool,
    },
    /// Generate a multiple-choice quiz
    Quiz {
        /// Notebook ID or title
        notebook: String,
        /// Number of questions
        #[arg(long)]
        questions: Option<usize>,
        /// Answer the questions in the terminal
        #[arg(long)]
        interactive: bool,
    },
    /// Generate an outline with flashcards
    StudyGuide {
        /// Notebook ID or title
        notebook: String,
    },
    /// Generate a two-host podcast script
    Podcast {
        /// Notebook ID or title
        notebook: String,
        /// Minimum number of exchanges
        #[arg(long)]
        exchanges: Option<usize>,
        /// Write the script to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check that stored documents and indexed chunks agree
    Check {
        /// Fix the issues that can be fixed
        #[arg(long)]
        repair: bool,
        /// Check every owner's notebooks, not just the current user's
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum NotebookAction {
    /// Create an empty notebook
    Create { title: String },
    /// List notebooks
    List,
    /// Rename a notebook
    Rename {
        /// Notebook ID or title
        notebook: String,
        title: String,
    },
    /// Delete a notebook with its documents and chat history
    Delete {
        /// Notebook ID or title
        notebook: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&load_default()?);
        } else {
            let dir = get_config_dir().map_err(|e| ThinkbookError::Config(e.to_string()))?;
            run_interactive_config(&dir).await?;
        }
        return Ok(());
    }

    let config = load_default()?;
    let owner = cli.user.unwrap_or_else(|| config.default_user.clone());
    let assistant = Assistant::open(&config).await?;

    match cli.command {
        Commands::Config { .. } => {}
        Commands::Notebook { action } => match action {
            NotebookAction::Create { title } => create_notebook(&assistant, &owner, &title).await?,
            NotebookAction::List => list_notebooks(&assistant, &owner).await?,
            NotebookAction::Rename { notebook, title } => {
                rename_notebook(&assistant, &owner, &notebook, &title).await?;
            }
            NotebookAction::Delete { notebook } => {
                delete_notebook(&assistant, &owner, &notebook).await?;
            }
        },
        Commands::Ingest { notebook, sources } => {
            ingest_sources(&assistant, &owner, &notebook, &sources).await?;
        }
        Commands::Documents { notebook } => list_documents(&assistant, &owner, &notebook).await?,
        Commands::Remove {
            notebook,
            document_id,
        } => remove_document(&assistant, &owner, &notebook, &document_id).await?,
        Commands::Reingest {
            notebook,
            document_id,
        } => reingest_document(&assistant, &owner, &notebook, &document_id).await?,
        Commands::Chat { notebook, question } => {
            chat(&assistant, &owner, &notebook, &question).await?;
        }
        Commands::History { notebook, limit } => {
            show_history(&assistant, &owner, &notebook, limit).await?;
        }
        Commands::ClearChat { notebook } => clear_chat(&assistant, &owner, &notebook).await?,
        Commands::Summarize {
            notebook,
            document,
            descriptive,
        } => summarize(&assistant, &owner, &notebook, document.as_deref(), descriptive).await?,
        Commands::Quiz {
            notebook,
            questions,
            interactive,
        } => quiz(&assistant, &owner, &notebook, questions, interactive).await?,
        Commands::StudyGuide { notebook } => study_guide(&assistant, &owner, &notebook).await?,
        Commands::Podcast {
            notebook,
            exchanges,
            output,
        } => podcast(&assistant, &owner, &notebook, exchanges, output.as_deref()).await?,
        Commands::Check { repair, all } => {
            let scope = if all { None } else { Some(owner.as_str()) };
            check(&assistant, scope, repair).await?;
        }
    }

    Ok(())
}
