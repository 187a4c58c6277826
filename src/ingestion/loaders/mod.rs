//! Turn files and web pages into plain text.

#[cfg(test)]
mod tests;

use anyhow::Context;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use scraper::{Html, Selector};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::database::sqlite::models::SourceType;
use crate::retry::RetryPolicy;
use crate::{Result, ThinkbookError};

/// Extracted text shorter than this (after trimming) is treated as empty
pub const MIN_TEXT_CHARS: usize = 50;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ThinkBook)";

const EXCLUDED_HTML_ELEMENTS: [&str; 6] = ["script", "style", "nav", "footer", "header", "noscript"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Text supplied directly, e.g. pasted into the UI
    Text { title: String, text: String },
    File(PathBuf),
    Url(String),
}

impl Source {
    /// Short label for progress output and logs
    #[inline]
    pub fn label(&self) -> String {
        match self {
            Self::Text { title, .. } => title.clone(),
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    /// Interpret a CLI argument: anything with an http(s) scheme is a URL
    #[inline]
    pub fn from_arg(arg: &str) -> Self {
        match Url::parse(arg) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Url(arg.to_string()),
            _ => Self::File(PathBuf::from(arg)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub title: String,
    pub source_type: SourceType,
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Loader {
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl Loader {
    #[inline]
    pub fn new(retry: RetryPolicy) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(retry.timeout))
            .build()
            .into();
        Self { agent, retry }
    }

    #[inline]
    pub async fn load(&self, source: &Source) -> Result<LoadedDocument> {
        let loaded = match source {
            Source::Text { title, text } => LoadedDocument {
                title: title.trim().to_string(),
                source_type: SourceType::Text,
                source: "pasted text".to_string(),
                text: text.trim().to_string(),
            },
            Source::File(path) => load_file(path).await?,
            Source::Url(url) => self.load_url(url).await?,
        };

        if loaded.title.is_empty() {
            return Err(ThinkbookError::InvalidInput(
                "document title must not be empty".to_string(),
            ));
        }
        ensure_enough_text(&loaded.source, &loaded.text)?;

        debug!(
            "Loaded {} ({}, {} chars)",
            loaded.source,
            loaded.source_type,
            loaded.text.chars().count()
        );
        Ok(loaded)
    }

    async fn load_url(&self, raw_url: &str) -> Result<LoadedDocument> {
        let url = Url::parse(raw_url)
            .map_err(|e| ThinkbookError::InvalidInput(format!("invalid URL {raw_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ThinkbookError::InvalidInput(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        info!("Fetching {}", url);
        let agent = self.agent.clone();
        let target = url.clone();
        let html = self
            .retry
            .call_blocking("fetch url", move || {
                agent
                    .get(target.as_str())
                    .header("User-Agent", USER_AGENT)
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .await
            .map_err(|e| ThinkbookError::Network(format!("failed to fetch {url}: {e}")))?;

        let (title, text) = html_to_text(&html);
        Ok(LoadedDocument {
            title: title.unwrap_or_else(|| url.to_string()),
            source_type: SourceType::Url,
            source: url.to_string(),
            text,
        })
    }
}

async fn load_file(path: &Path) -> Result<LoadedDocument> {
    let source_type = source_type_for(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let (title, text) = match source_type {
        SourceType::Pdf => {
            let owned = path.to_path_buf();
            let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
                .await
                .context("PDF extraction task panicked")?
                .map_err(|e| {
                    ThinkbookError::InvalidInput(format!(
                        "could not extract text from {}: {e}",
                        path.display()
                    ))
                })?;
            (None, text.trim().to_string())
        }
        SourceType::Pptx => {
            let owned = path.to_path_buf();
            let text = tokio::task::spawn_blocking(move || pptx_to_text(&owned))
                .await
                .context("PPTX extraction task panicked")??;
            (None, text)
        }
        SourceType::Markdown => {
            let markdown = read_text(path).await?;
            (markdown_title(&markdown), markdown_to_text(&markdown))
        }
        SourceType::Html => html_to_text(&read_text(path).await?),
        SourceType::Text | SourceType::Url => (None, read_text(path).await?.trim().to_string()),
    };

    Ok(LoadedDocument {
        title: title.unwrap_or(stem),
        source_type,
        source: path.display().to_string(),
        text,
    })
}

async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(decode_text(&bytes))
}

#[inline]
pub fn source_type_for(path: &Path) -> Result<SourceType> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "txt" | "text" => Ok(SourceType::Text),
        "md" | "markdown" => Ok(SourceType::Markdown),
        "html" | "htm" => Ok(SourceType::Html),
        "pdf" => Ok(SourceType::Pdf),
        "pptx" => Ok(SourceType::Pptx),
        _ => Err(ThinkbookError::InvalidInput(format!(
            "unsupported file type '.{extension}' for {}",
            path.display()
        ))),
    }
}

/// Slide text in deck order, each slide under a `--- Slide N ---` header.
///
/// Slides are the `ppt/slides/slideN.xml` parts ordered by `N`; every
/// `<a:p>` paragraph becomes one line built from its `<a:t>` runs.
#[inline]
pub fn pptx_to_text(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| slide_error(path, e))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|number| (number, name.to_string())))
        .collect();
    if slides.is_empty() {
        return Err(slide_error(path, "no slides found"));
    }
    slides.sort_unstable_by_key(|(number, _)| *number);

    let mut sections = Vec::with_capacity(slides.len());
    for (position, (_, name)) in slides.iter().enumerate() {
        let mut xml = String::new();
        archive
            .by_name(name)
            .map_err(|e| slide_error(path, e))?
            .read_to_string(&mut xml)
            .map_err(|e| slide_error(path, e))?;

        let mut section = format!("--- Slide {} ---", position + 1);
        for paragraph in slide_paragraphs(&xml).map_err(|e| slide_error(path, e))? {
            section.push('\n');
            section.push_str(&paragraph);
        }
        sections.push(section);
    }

    debug!("Read {} slides from {}", sections.len(), path.display());
    Ok(sections.join("\n\n"))
}

fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn slide_paragraphs(xml: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) if e.name().as_ref() == b"a:t" => in_run = true,
            XmlEvent::Empty(e) if e.name().as_ref() == b"a:br" => current.push(' '),
            XmlEvent::Text(e) if in_run => current.push_str(&e.unescape()?),
            XmlEvent::End(e) => match e.name().as_ref() {
                b"a:t" => in_run = false,
                b"a:p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        paragraphs.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

fn slide_error(path: &Path, error: impl std::fmt::Display) -> ThinkbookError {
    ThinkbookError::InvalidInput(format!(
        "could not read slides from {}: {error}",
        path.display()
    ))
}

/// UTF-8, falling back to Latin-1 so any byte sequence decodes
#[inline]
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Markdown rendered to plain text: markup dropped, blocks separated by blank lines
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Start(Tag::Item) => text.push_str("- "),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::List(_)
                | TagEnd::Table,
            ) => text.push_str("\n\n"),
            Event::End(TagEnd::Item | TagEnd::TableRow | TagEnd::TableHead) => text.push('\n'),
            Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }

    collapse_blank_lines(&text, true)
}

/// Text of the first level-one heading
#[inline]
pub fn markdown_title(markdown: &str) -> Option<String> {
    let mut in_heading = false;
    let mut title = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_heading = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if !title.trim().is_empty() {
                    return Some(title.trim().to_string());
                }
                in_heading = false;
            }
            Event::Text(t) | Event::Code(t) if in_heading => title.push_str(&t),
            _ => {}
        }
    }
    None
}

/// Visible page text, one line per text run, plus the `<title>` if present.
///
/// Scripts, styles and page chrome (navigation, header, footer) are skipped.
#[inline]
pub fn html_to_text(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|e| e.text().collect::<String>())
        })
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(run) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|element| {
                EXCLUDED_HTML_ELEMENTS.contains(&element.name()) || element.name() == "title"
            })
        });
        if !hidden {
            text.push_str(run);
            text.push('\n');
        }
    }

    (title, collapse_blank_lines(&text, false))
}

/// Trim every line and drop empty ones. With `keep_paragraphs`, runs of
/// blank lines collapse to one instead of disappearing.
fn collapse_blank_lines(text: &str, keep_paragraphs: bool) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if !line.is_empty() {
            out.push(line);
        } else if keep_paragraphs && out.last().is_some_and(|l| !l.is_empty()) {
            out.push("");
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn ensure_enough_text(source: &str, text: &str) -> Result<()> {
    let length = text.trim().chars().count();
    if length < MIN_TEXT_CHARS {
        return Err(ThinkbookError::InvalidInput(format!(
            "{source} contains too little text ({length} characters, need at least {MIN_TEXT_CHARS})"
        )));
    }
    Ok(())
}
