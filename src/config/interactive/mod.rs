
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use std::time::Duration;

use super::{Config, ConfigError, LlmConfig, OllamaConfig};
use crate::embeddings::ollama::OllamaClient;
use crate::retry::RetryPolicy;

#[inline]
pub async fn run_interactive_config(config_dir: &std::path::Path) -> Result<()> {
    eprintln!("{}", style("🔧 ThinkBook Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Model (Ollama)").bold().yellow());
    eprintln!("Configure the Ollama instance used to embed your documents.");
    eprintln!();
    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Language Model").bold().yellow());
    eprintln!("Any OpenAI-compatible chat completion endpoint works. Use 'auto' to pick a model.");
    eprintln!();
    configure_llm(&mut config.llm)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_ollama_connection(&config).await {
        Ok(()) => eprintln!("{}", style("✓ Ollama connection successful!").green()),
        Err(reason) => {
            eprintln!(
                "{}",
                style(format!("⚠ Warning: Ollama check failed: {reason}")).yellow()
            );
            eprintln!(
                "You can continue, but make sure Ollama is running and the model is pulled before ingesting."
            );
        }
    }

    if std::env::var(&config.llm.api_key_env).is_ok() {
        eprintln!(
            "{}",
            style(format!("✓ {} is set", config.llm.api_key_env)).green()
        );
    } else {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: {} is not set; chat and generation will fail",
                config.llm.api_key_env
            ))
            .yellow()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();
    eprintln!("Default user: {}", style(&config.default_user).cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Language Model:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.llm.base_url).cyan());
    eprintln!("  Model: {}", style(&config.llm.model).cyan());
    eprintln!("  API key variable: {}", style(&config.llm.api_key_env).cyan());

    eprintln!();
    eprintln!("{}", style("Pipeline:").bold().yellow());
    eprintln!(
        "  Chunks: {} chars, {} overlap, {} boundary window",
        style(config.chunking.max_chunk_size).cyan(),
        style(config.chunking.overlap_size).cyan(),
        style(config.chunking.boundary_window).cyan()
    );
    eprintln!(
        "  Retrieval: top {} (max {}), {} history turns",
        style(config.retrieval.default_top_k).cyan(),
        style(config.retrieval.max_top_k).cyan(),
        style(config.retrieval.history_turns).cyan()
    );
    eprintln!(
        "  Retry: {} attempts, {}ms initial backoff, {}s timeout",
        style(config.retry.max_attempts).cyan(),
        style(config.retry.initial_backoff_ms).cyan(),
        style(config.retry.timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Database: {}", style(config.database_path().display()).dim());
}

fn load_existing_config(config_dir: &std::path::Path) -> Config {
    if config_dir.join("config.toml").exists() {
        match Config::load(config_dir) {
            Ok(config) => {
                eprintln!("{}", style("Found existing configuration.").green());
                return config;
            }
            Err(e) => eprintln!(
                "{}",
                style(format!("Existing configuration is invalid ({e}). Using defaults.")).yellow()
            ),
        }
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
    }

    Config {
        base_dir: config_dir.to_path_buf(),
        ..Config::default()
    }
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            candidate.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(dimension)?;

    Ok(())
}

fn configure_llm(llm: &mut LlmConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("Chat completion base URL")
        .default(llm.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = LlmConfig {
                base_url: input.clone(),
                ..LlmConfig::default()
            };
            candidate.validate()
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Model (or 'auto')")
        .default(llm.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    llm.set_base_url(base_url)?;
    llm.set_model(model)?;

    Ok(())
}

/// Reach the server once and confirm the configured model is pulled
async fn test_ollama_connection(config: &Config) -> std::result::Result<(), String> {
    let client = OllamaClient::new(config)
        .map_err(|e| format!("{e:#}"))?
        .with_retry_policy(RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        });
    client.health_check().await.map_err(|e| e.to_string())
}
