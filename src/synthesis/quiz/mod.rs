//! Multiple-choice quiz items and their validation.


use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    /// Option letter to option text; may be empty for open questions
    pub options: BTreeMap<String, String>,
    pub answer: String,
    pub explanation: String,
}

impl QuizItem {
    /// Whether `choice` is the correct answer, ignoring case and surrounding space
    #[inline]
    pub fn check(&self, choice: &str) -> bool {
        choice.trim().eq_ignore_ascii_case(self.answer.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quiz {
    pub items: Vec<QuizItem>,
    /// How many questions were asked for; `items` may hold fewer
    pub requested: usize,
}

impl Quiz {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.items.len() >= self.requested
    }

    /// Number of `answers` that match their item, paired by position
    #[inline]
    pub fn score<S: AsRef<str>>(&self, answers: &[S]) -> usize {
        self.items
            .iter()
            .zip(answers)
            .filter(|(item, answer)| item.check(answer.as_ref()))
            .count()
    }
}

/// Item as the model wrote it; every field is optional until validated
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawQuizItem {
    question: Option<String>,
    options: Option<BTreeMap<String, String>>,
    answer: Option<String>,
    explanation: Option<String>,
}

impl RawQuizItem {
    fn validate(self) -> Option<QuizItem> {
        let question = self.question?.trim().to_string();
        let answer = self.answer?.trim().to_string();
        if question.is_empty() || answer.is_empty() {
            return None;
        }

        let options: BTreeMap<String, String> = self
            .options
            .unwrap_or_default()
            .into_iter()
            .map(|(key, text)| (key.trim().to_uppercase(), text.trim().to_string()))
            .filter(|(key, text)| !key.is_empty() && !text.is_empty())
            .collect();

        let answer = if options.is_empty() {
            answer
        } else {
            let key = answer.to_uppercase();
            if !options.contains_key(&key) {
                return None;
            }
            key
        };

        Some(QuizItem {
            question,
            options,
            answer,
            explanation: self.explanation.unwrap_or_default().trim().to_string(),
        })
    }
}

/// Outcome of parsing one model response
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedItems {
    pub valid: Vec<QuizItem>,
    pub discarded: usize,
}

/// Pull quiz items out of free-form model output.
///
/// The first `[` to the last `]` is read as a JSON array; prose or code
/// fences around it are ignored. Entries missing a question or a correct
/// answer are counted as discarded.
#[inline]
pub fn parse_items(raw: &str) -> ParsedItems {
    let json = match JSON_ARRAY.find(raw) {
        Ok(Some(found)) => found.as_str(),
        _ => raw.trim(),
    };

    let Ok(entries) = serde_json::from_str::<Vec<serde_json::Value>>(json) else {
        return ParsedItems::default();
    };

    let mut parsed = ParsedItems::default();
    for entry in entries {
        match serde_json::from_value::<RawQuizItem>(entry)
            .ok()
            .and_then(RawQuizItem::validate)
        {
            Some(item) => parsed.valid.push(item),
            None => parsed.discarded += 1,
        }
    }
    parsed
}
