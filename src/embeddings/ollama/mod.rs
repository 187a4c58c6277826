
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::retry::{CallError, RetryPolicy};
use crate::{Result, ThinkbookError};

/// Output size of the default `nomic-embed-text` model
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    dimension: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;
        let retry = RetryPolicy::from_config(&config.retry);

        Ok(Self {
            base_url,
            model: config.ollama.model.clone(),
            batch_size: config.ollama.batch_size.max(1),
            dimension: config.ollama.embedding_dimension as usize,
            agent: build_agent(retry.timeout),
            retry,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.retry.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.agent = build_agent(retry.timeout);
        self.retry = retry;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Verify the server answers and has the configured model pulled
    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().await?;
        if models.iter().any(|m| m.name == self.model) {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(ThinkbookError::EmbeddingUnavailable(format!(
                "model '{}' is not available; pulled models: {:?}",
                self.model, available
            )))
        }
    }

    #[inline]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let agent = self.agent.clone();
        let response_text = self
            .retry
            .call_blocking("ollama list models", move || {
                agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .await
            .map_err(|e| unavailable("failed to list models", &e))?;

        let models: ModelsResponse = serde_json::from_str(&response_text).map_err(|e| {
            ThinkbookError::EmbeddingUnavailable(format!("unreadable models response: {e}"))
        })?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| {
            ThinkbookError::Config(format!("invalid Ollama endpoint {path}: {e}"))
        })
    }

    async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("/api/embed")?;
        let request_json = serde_json::to_string(&BatchEmbedRequest {
            model: &self.model,
            inputs: texts,
        })
        .map_err(|e| ThinkbookError::Other(e.into()))?;

        let agent = self.agent.clone();
        let response_text = self
            .retry
            .call_blocking("ollama embed", move || {
                agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .await
            .map_err(|e| unavailable("embedding request failed", &e))?;

        let response: BatchEmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            ThinkbookError::EmbeddingUnavailable(format!("unreadable embedding response: {e}"))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(ThinkbookError::EmbeddingUnavailable(format!(
                "mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        if let Some(bad) = response
            .embeddings
            .iter()
            .find(|v| v.len() != self.dimension)
        {
            return Err(ThinkbookError::EmbeddingUnavailable(format!(
                "model {} returned {}-dimensional vectors, expected {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }

        Ok(response.embeddings)
    }
}

fn unavailable(context: &str, error: &CallError) -> ThinkbookError {
    ThinkbookError::EmbeddingUnavailable(format!("{context}: {error}"))
}

#[async_trait]
impl Embedder for OllamaClient {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());
        let mut vectors = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for batch in texts.chunks(self.batch_size as usize) {
            vectors.extend(self.embed_single_batch(batch).await?);
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }
}
