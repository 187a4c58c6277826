#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{CompletionRequest, LanguageModel, Message, select_model};
use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::{Result, ThinkbookError};

/// Client for Groq and other OpenAI-compatible chat completion APIs
#[derive(Debug)]
pub struct GroqClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
    resolved_model: OnceCell<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl GroqClient {
    /// Reads the API key from the environment variable named in the config.
    /// A missing key is only reported when a completion is requested.
    #[inline]
    pub fn new(config: &Config) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self {
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            model: config.llm.model.clone(),
            api_key: std::env::var(&config.llm.api_key_env).ok(),
            api_key_env: config.llm.api_key_env.clone(),
            agent: build_agent(retry.timeout),
            retry,
            resolved_model: OnceCell::new(),
        }
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.agent = build_agent(retry.timeout);
        self.retry = retry;
        self
    }

    fn api_key(&self) -> Result<String> {
        self.api_key.clone().ok_or_else(|| {
            ThinkbookError::ModelUnavailable(format!("{} is not set", self.api_key_env))
        })
    }

    /// The model completions are sent to, listing the provider's models
    /// once when configured as `auto`
    #[inline]
    pub async fn resolve_model(&self) -> Result<String> {
        if !self.model.eq_ignore_ascii_case("auto") {
            return Ok(self.model.clone());
        }

        self.resolved_model
            .get_or_try_init(|| async {
                let ids = self.list_models().await?;
                let model = select_model(&ids).ok_or_else(|| {
                    ThinkbookError::ModelUnavailable("provider lists no models".to_string())
                })?;
                info!("Selected language model {}", model);
                Ok(model)
            })
            .await
            .cloned()
    }

    #[inline]
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let authorization = format!("Bearer {}", self.api_key()?);
        debug!("Listing models from {}", url);

        let agent = self.agent.clone();
        let response_text = self
            .retry
            .call_blocking("list models", move || {
                agent
                    .get(url.as_str())
                    .header("Authorization", authorization.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .await
            .map_err(|e| ThinkbookError::ModelUnavailable(format!("failed to list models: {e}")))?;

        let list: ModelList = serde_json::from_str(&response_text).map_err(|e| {
            ThinkbookError::ModelUnavailable(format!("unreadable model list: {e}"))
        })?;
        Ok(list.data.into_iter().map(|entry| entry.id).collect())
    }
}

#[async_trait]
impl LanguageModel for GroqClient {
    #[inline]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let authorization = format!("Bearer {}", self.api_key()?);
        let model = self.resolve_model().await?;
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::to_string(&ChatCompletionBody {
            model: &model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        })
        .map_err(|e| ThinkbookError::Other(e.into()))?;

        debug!(
            "Requesting completion from {} ({} messages, max {} tokens)",
            model,
            request.messages.len(),
            request.max_tokens
        );

        let agent = self.agent.clone();
        let response_text = self
            .retry
            .call_blocking("chat completion", move || {
                agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .header("Authorization", authorization.as_str())
                    .send(&body)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .await
            .map_err(|e| {
                ThinkbookError::ModelUnavailable(format!("completion with {model} failed: {e}"))
            })?;

        let response: ChatCompletionResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                ThinkbookError::ModelUnavailable(format!("unreadable completion response: {e}"))
            })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ThinkbookError::ModelUnavailable("completion response had no content".to_string())
            })?;

        Ok(content.trim().to_string())
    }
}
