#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;

/// Environment variable overriding the data directory
pub const HOME_ENV_VAR: &str = "THINKBOOK_HOME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Owner id used when the caller does not supply one
    #[serde(default = "default_user")]
    pub default_user: String,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_user() -> String {
    "local".to_string()
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            default_user: default_user(),
            ollama: OllamaConfig::default(),
            llm: LlmConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            retry: RetryConfig::default(),
            synthesis: SynthesisConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// OpenAI-compatible chat completion endpoint (Groq by default)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Model id, or `auto` to pick one from the provider's model list
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl Default for LlmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "auto".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Number of previous chat turns passed to the model
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            default_top_k: 6,
            max_top_k: 20,
            history_turns: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    /// Per-attempt timeout for embedding, completion and fetch calls
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Word budget for source text handed to quiz, study guide and podcast prompts
    pub max_context_words: usize,
    /// Word budget for summaries
    pub summary_max_words: usize,
    pub quiz_regeneration_attempts: u32,
    pub default_quiz_questions: usize,
    pub default_podcast_exchanges: usize,
}

impl Default for SynthesisConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_context_words: 10_000,
            summary_max_words: 12_000,
            quiz_regeneration_attempts: 1,
            default_quiz_questions: 5,
            default_podcast_exchanges: 12,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid API key variable: {0} (cannot be empty)")]
    InvalidApiKeyEnv(String),
    #[error("Invalid owner id: {0} (cannot be empty)")]
    InvalidUser(String),
    #[error("Invalid max chunk size: {0} (must be between 100 and 8000)")]
    InvalidMaxChunkSize(usize),
    #[error("Overlap size ({0}) must be smaller than max chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Boundary window ({0}) must not exceed max chunk size ({1})")]
    BoundaryWindowTooLarge(usize, usize),
    #[error("Invalid top-k: default {0}, max {1} (need 1 <= default <= max <= 100)")]
    InvalidTopK(usize, usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid word budget: {0} (must be between 100 and 100000)")]
    InvalidWordBudget(usize),
    #[error("Invalid quiz regeneration attempts: {0} (must be at most 5)")]
    InvalidRegenerationAttempts(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// `$THINKBOOK_HOME`, falling back to `~/.thinkbook`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        Self::resolve_config_dir(std::env::var_os(HOME_ENV_VAR), dirs::home_dir())
    }

    /// The override directory if given, else `.thinkbook` under `home`
    #[inline]
    pub fn resolve_config_dir(
        home_override: Option<OsString>,
        home: Option<PathBuf>,
    ) -> Result<PathBuf, ConfigError> {
        match home_override {
            Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
            _ => home
                .map(|home| home.join(".thinkbook"))
                .ok_or(ConfigError::DirectoryError),
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_user.trim().is_empty() {
            return Err(ConfigError::InvalidUser(self.default_user.clone()));
        }
        self.ollama.validate()?;
        self.llm.validate()?;
        self.validate_chunking_config()?;
        self.validate_retrieval_config()?;

        if !(1..=10).contains(&self.retry.max_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry.max_attempts));
        }
        if !(1..=600).contains(&self.retry.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.retry.timeout_seconds));
        }

        for budget in [
            self.synthesis.max_context_words,
            self.synthesis.summary_max_words,
        ] {
            if !(100..=100_000).contains(&budget) {
                return Err(ConfigError::InvalidWordBudget(budget));
            }
        }
        if self.synthesis.quiz_regeneration_attempts > 5 {
            return Err(ConfigError::InvalidRegenerationAttempts(
                self.synthesis.quiz_regeneration_attempts,
            ));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=8000).contains(&config.max_chunk_size) {
            return Err(ConfigError::InvalidMaxChunkSize(config.max_chunk_size));
        }

        if config.overlap_size >= config.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap_size,
                config.max_chunk_size,
            ));
        }

        if config.boundary_window > config.max_chunk_size {
            return Err(ConfigError::BoundaryWindowTooLarge(
                config.boundary_window,
                config.max_chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;
        if retrieval.default_top_k == 0
            || retrieval.default_top_k > retrieval.max_top_k
            || retrieval.max_top_k > 100
        {
            return Err(ConfigError::InvalidTopK(
                retrieval.default_top_k,
                retrieval.max_top_k,
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("thinkbook.db")
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let candidate = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        candidate.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl LlmConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidApiKeyEnv(self.api_key_env.clone()));
        }
        Ok(())
    }

    #[inline]
    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let candidate = LlmConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        candidate.validate()?;
        self.base_url = base_url;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn uses_auto_model(&self) -> bool {
        self.model.eq_ignore_ascii_case("auto")
    }
}
