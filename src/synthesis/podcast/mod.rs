//! Two-speaker podcast scripts.

#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static EXPERT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^dr\.?\s*sam\s*:\s*").expect("valid regex"));
static HOST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^alex\s*:\s*").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Speaker {
    /// The curious host
    Alex,
    /// The expert guest
    DrSam,
}

impl fmt::Display for Speaker {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alex => write!(f, "Alex"),
            Self::DrSam => write!(f, "Dr. Sam"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueTurn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodcastScript {
    pub turns: Vec<DialogueTurn>,
}

impl PodcastScript {
    /// Parse raw model output into alternating turns.
    ///
    /// Lines not addressed to a known speaker are dropped, and consecutive
    /// lines from the same speaker are merged into one turn.
    #[inline]
    pub fn parse(raw: &str) -> Self {
        let mut turns: Vec<DialogueTurn> = Vec::new();

        for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some((speaker, text)) = split_speaker(line) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            match turns.last_mut() {
                Some(last) if last.speaker == speaker => {
                    last.text.push(' ');
                    last.text.push_str(text);
                }
                _ => turns.push(DialogueTurn {
                    speaker,
                    text: text.to_string(),
                }),
            }
        }

        Self { turns }
    }

    /// A usable script has at least one exchange between the two speakers
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.turns.len() >= 2
    }

    /// Speaker-tagged text, one `Speaker: line` per turn, for audio rendering
    #[inline]
    pub fn to_tagged_text(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker, turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn split_speaker(line: &str) -> Option<(Speaker, &str)> {
    // Checked first: "Dr. Sam:" must not be read as narration
    for (speaker, prefix) in [(Speaker::DrSam, &*EXPERT_PREFIX), (Speaker::Alex, &*HOST_PREFIX)] {
        if let Ok(Some(found)) = prefix.find(line) {
            return Some((speaker, line[found.end()..].trim()));
        }
    }
    None
}
