
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, ThinkbookError};

pub const DEFAULT_BOUNDARY_WINDOW: usize = 200;

/// A bounded window of document text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of this chunk within its document
    pub ordinal: usize,
    /// Character offset of the first character (inclusive)
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
    pub content: String,
    /// Estimated token count
    pub token_count: usize,
}

impl TextChunk {
    #[inline]
    pub fn char_length(&self) -> usize {
        self.end - self.start
    }
}

/// Configuration for document chunking. Sizes are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub max_chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub overlap_size: usize,
    /// How far back from a hard cut to look for a paragraph or sentence break
    pub boundary_window: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap_size: 100,
            boundary_window: DEFAULT_BOUNDARY_WINDOW,
        }
    }
}

/// Split `text` into windows of at most `max_size` characters, each sharing
/// `overlap` characters with its predecessor.
#[inline]
pub fn chunk(text: &str, max_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    chunk_text(
        text,
        &ChunkingConfig {
            max_chunk_size: max_size,
            overlap_size: overlap,
            boundary_window: DEFAULT_BOUNDARY_WINDOW.min(max_size),
        },
    )
}

#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    let max_size = config.max_chunk_size;
    let overlap = config.overlap_size;
    if max_size == 0 || overlap >= max_size {
        return Err(ThinkbookError::InvalidInput(format!(
            "chunk overlap ({overlap}) must be smaller than max chunk size ({max_size})"
        )));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = (start + max_size).min(len);
        // Never cut at or before start + overlap, or the next window would not advance
        let floor = start + overlap + 1;
        let end = if hard_end == len {
            len
        } else {
            find_cut(&chars, floor, hard_end, config.boundary_window)
        };

        let content: String = chars[start..end].iter().collect();
        chunks.push(TextChunk {
            ordinal: chunks.len(),
            start,
            end,
            token_count: estimate_token_count(&content),
            content,
        });

        if end == len {
            break;
        }
        start = end - overlap;
    }

    debug!(
        "Chunked {} characters into {} chunks (max {}, overlap {})",
        len,
        chunks.len(),
        max_size,
        overlap
    );

    Ok(chunks)
}

/// Pick the cut position for a window whose hard limit is `hard_end`.
fn find_cut(chars: &[char], floor: usize, hard_end: usize, window: usize) -> usize {
    if is_sentence_boundary(chars, hard_end) {
        return hard_end;
    }

    let lowest = hard_end.saturating_sub(window).max(floor);
    if lowest >= hard_end {
        return hard_end;
    }

    let candidates = || (lowest..hard_end).rev();

    candidates()
        .find(|&pos| is_paragraph_boundary(chars, pos))
        .or_else(|| candidates().find(|&pos| is_sentence_boundary(chars, pos)))
        .unwrap_or(hard_end)
}

/// A cut at `pos` falls right after a blank line
fn is_paragraph_boundary(chars: &[char], pos: usize) -> bool {
    pos >= 2 && chars[pos - 1] == '\n' && chars[pos - 2] == '\n'
}

/// A cut at `pos` falls right after a newline or sentence terminator
fn is_sentence_boundary(chars: &[char], pos: usize) -> bool {
    if pos == 0 || pos >= chars.len() {
        return true;
    }
    let previous = chars[pos - 1];
    previous == '\n' || (matches!(previous, '.' | '!' | '?') && chars[pos].is_whitespace())
}

/// Rebuild the covered text from a document's chunks, emitting each
/// overlapped region once. Chunks must be sorted by ordinal.
#[inline]
pub fn reassemble<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = (usize, usize, &'a str)>,
{
    let mut text = String::new();
    let mut covered = 0;
    for (start, end, content) in chunks {
        if end <= covered && !text.is_empty() {
            continue;
        }
        let skip = covered.saturating_sub(start);
        text.extend(content.chars().skip(skip));
        covered = covered.max(end);
    }
    text
}

#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
