//! Chat-completion language models.

pub mod groq;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use groq::GroqClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the assistant's reply text. Failures to reach the model
    /// surface as [`crate::ThinkbookError::ModelUnavailable`].
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

const OVERSIZED_MARKERS: [&str; 3] = ["70b", "120b", "preview"];
const PREFERRED_MARKERS: [&str; 3] = ["8b", "instant", "instruct"];

/// Pick a lightweight chat model from a provider's model list.
///
/// Large and preview models are skipped; among the rest, ids mentioning
/// `8b`, then `instant`, then `instruct` win. Falls back to the first
/// remaining id, then to the first id overall.
#[inline]
pub fn select_model(model_ids: &[String]) -> Option<String> {
    let safe: Vec<&String> = model_ids
        .iter()
        .filter(|id| {
            let lower = id.to_lowercase();
            !OVERSIZED_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .collect();

    PREFERRED_MARKERS
        .iter()
        .find_map(|marker| {
            safe.iter()
                .find(|id| id.to_lowercase().contains(marker))
                .copied()
        })
        .or_else(|| safe.first().copied())
        .or_else(|| model_ids.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn prefers_small_instant_models() {
        let models = ids(&[
            "llama-3.3-70b-versatile",
            "gemma2-9b-it",
            "llama-3.1-8b-instant",
            "openai/gpt-oss-120b",
        ]);
        assert_eq!(
            select_model(&models).as_deref(),
            Some("llama-3.1-8b-instant")
        );
    }

    #[test]
    fn keyword_order_beats_list_order() {
        let models = ids(&["mixtral-instruct", "fast-instant", "tiny-8b"]);
        assert_eq!(select_model(&models).as_deref(), Some("tiny-8b"));
    }

    #[test]
    fn skips_preview_models() {
        let models = ids(&["llama-8b-preview", "whisper-large-v3", "qwen-instruct"]);
        assert_eq!(select_model(&models).as_deref(), Some("qwen-instruct"));
    }

    #[test]
    fn falls_back_to_first_safe_then_first_overall() {
        let models = ids(&["llama-70b", "gemma2-9b-it"]);
        assert_eq!(select_model(&models).as_deref(), Some("gemma2-9b-it"));

        let models = ids(&["llama-70b", "big-120b"]);
        assert_eq!(select_model(&models).as_deref(), Some("llama-70b"));

        assert_eq!(select_model(&[]), None);
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::system("hi")).expect("should serialize");
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
