//! Study guides: a topic outline plus flashcards.


use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyGuide {
    pub outline: Vec<OutlineSection>,
    pub flashcards: Vec<Flashcard>,
}

impl StudyGuide {
    /// Parse model output, returning why it was rejected when malformed
    #[inline]
    pub fn parse(raw: &str) -> Result<Self, String> {
        let json = match JSON_OBJECT.find(raw) {
            Ok(Some(found)) => found.as_str(),
            _ => raw.trim(),
        };

        let mut guide: Self =
            serde_json::from_str(json).map_err(|e| format!("not a study guide object: {e}"))?;
        guide.normalise();
        guide.validate()?;
        Ok(guide)
    }

    fn normalise(&mut self) {
        for section in &mut self.outline {
            section.heading = section.heading.trim().to_string();
            section.points = section
                .points
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        for card in &mut self.flashcards {
            card.term = card.term.trim().to_string();
            card.definition = card.definition.trim().to_string();
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.outline.is_empty() {
            return Err("outline has no sections".to_string());
        }
        if self.flashcards.is_empty() {
            return Err("no flashcards".to_string());
        }
        if let Some(section) = self
            .outline
            .iter()
            .find(|s| s.heading.is_empty() || s.points.is_empty())
        {
            return Err(format!(
                "outline section '{}' is missing a heading or points",
                section.heading
            ));
        }
        if self
            .flashcards
            .iter()
            .any(|c| c.term.is_empty() || c.definition.is_empty())
        {
            return Err("flashcard with an empty term or definition".to_string());
        }
        Ok(())
    }

    #[inline]
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("## Study Guide\n\n### Outline\n");
        for section in &self.outline {
            let _ = write!(out, "\n#### {}\n", section.heading);
            for point in &section.points {
                let _ = writeln!(out, "- {point}");
            }
        }

        out.push_str("\n### Flashcards\n");
        for card in &self.flashcards {
            let _ = write!(out, "\n**Q:** {}\n**A:** {}\n", card.term, card.definition);
        }
        out
    }
}
