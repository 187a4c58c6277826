use super::*;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const LONG_TEXT: &str = "Photosynthesis converts light energy into chemical energy stored in glucose.";

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }
}

#[test]
fn decodes_utf8_and_latin1() {
    assert_eq!(decode_text("café".as_bytes()), "café");
    // 0xE9 alone is invalid UTF-8 but is 'é' in Latin-1
    assert_eq!(decode_text(&[b'c', b'a', b'f', 0xE9]), "café");
}

#[test]
fn markdown_stripped_to_text() {
    let markdown = "# Cells\n\nCells are the *basic* unit of `life`.\n\n- Nucleus\n- Membrane\n\n\n\n> Quoted";
    let text = markdown_to_text(markdown);
    assert_eq!(
        text,
        "Cells\n\nCells are the basic unit of life.\n\n- Nucleus\n- Membrane\n\nQuoted"
    );
}

#[test]
fn markdown_title_uses_first_h1() {
    assert_eq!(
        markdown_title("Intro\n\n## Sub\n\n# The **Real** Title\n"),
        Some("The Real Title".to_string())
    );
    assert_eq!(markdown_title("## Only a subheading"), None);
}

#[test]
fn html_chrome_removed() {
    let html = r#"<html><head><title> Plant   Biology </title><style>p { color: red }</style></head>
        <body>
          <header>Site header</header>
          <nav><a href="/">Home</a></nav>
          <main><h1>Leaves</h1><p>Leaves capture   light.</p><script>track()</script></main>
          <footer>Copyright</footer>
        </body></html>"#;

    let (title, text) = html_to_text(html);
    assert_eq!(title.as_deref(), Some("Plant Biology"));
    assert_eq!(text, "Leaves\nLeaves capture   light.");
}

#[test]
fn source_types_from_extension() {
    assert_eq!(source_type_for(Path::new("a.TXT")).ok(), Some(SourceType::Text));
    assert_eq!(source_type_for(Path::new("a.md")).ok(), Some(SourceType::Markdown));
    assert_eq!(source_type_for(Path::new("a.htm")).ok(), Some(SourceType::Html));
    assert_eq!(source_type_for(Path::new("a.pdf")).ok(), Some(SourceType::Pdf));
    assert_eq!(source_type_for(Path::new("deck.PPTX")).ok(), Some(SourceType::Pptx));
    assert!(source_type_for(Path::new("notes.docx")).is_err());
    assert!(source_type_for(Path::new("README")).is_err());
}

#[test]
fn source_from_arg() {
    assert_eq!(
        Source::from_arg("https://example.com/page"),
        Source::Url("https://example.com/page".to_string())
    );
    assert_eq!(
        Source::from_arg("notes/biology.md"),
        Source::File(PathBuf::from("notes/biology.md"))
    );
    assert_eq!(
        Source::from_arg("C:/notes.txt"),
        Source::File(PathBuf::from("C:/notes.txt"))
    );
}

#[tokio::test]
async fn pasted_text_needs_minimum_length() {
    let loader = Loader::new(quick_retry());

    let loaded = loader
        .load(&Source::Text {
            title: " Biology ".to_string(),
            text: format!("  {LONG_TEXT}  "),
        })
        .await
        .expect("long text should load");
    assert_eq!(loaded.title, "Biology");
    assert_eq!(loaded.text, LONG_TEXT);
    assert_eq!(loaded.source_type, SourceType::Text);

    let error = loader
        .load(&Source::Text {
            title: "Short".to_string(),
            text: "too short".to_string(),
        })
        .await
        .expect_err("short text should be rejected");
    assert!(matches!(error, ThinkbookError::InvalidInput(_)));

    let error = loader
        .load(&Source::Text {
            title: "  ".to_string(),
            text: LONG_TEXT.to_string(),
        })
        .await
        .expect_err("blank title should be rejected");
    assert!(matches!(error, ThinkbookError::InvalidInput(_)));
}

#[tokio::test]
async fn loads_files_by_type() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let loader = Loader::new(quick_retry());

    let txt = temp_dir.path().join("lecture-notes.txt");
    std::fs::write(&txt, LONG_TEXT)?;
    let loaded = loader.load(&Source::File(txt)).await?;
    assert_eq!(loaded.title, "lecture-notes");
    assert_eq!(loaded.source_type, SourceType::Text);

    let md = temp_dir.path().join("cells.md");
    std::fs::write(&md, format!("# Cell Theory\n\n{LONG_TEXT}"))?;
    let loaded = loader.load(&Source::File(md)).await?;
    assert_eq!(loaded.title, "Cell Theory");
    assert_eq!(loaded.text, format!("Cell Theory\n\n{LONG_TEXT}"));

    let html = temp_dir.path().join("page.html");
    std::fs::write(
        &html,
        format!("<html><head><title>Web Page</title></head><body><p>{LONG_TEXT}</p></body></html>"),
    )?;
    let loaded = loader.load(&Source::File(html)).await?;
    assert_eq!(loaded.title, "Web Page");
    assert_eq!(loaded.text, LONG_TEXT);
    Ok(())
}

#[tokio::test]
async fn missing_or_unsupported_files_fail() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let loader = Loader::new(quick_retry());

    let missing = loader
        .load(&Source::File(temp_dir.path().join("missing.txt")))
        .await;
    assert!(missing.is_err());

    let notes = temp_dir.path().join("notes.docx");
    std::fs::write(&notes, LONG_TEXT)?;
    let error = loader
        .load(&Source::File(notes))
        .await
        .expect_err("unsupported type");
    assert!(matches!(error, ThinkbookError::InvalidInput(_)));
    Ok(())
}

/// Slide part whose shape holds one `<a:p>` per entry, each split into runs
fn slide_xml(paragraphs: &[&[&str]]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:txBody>"#,
    );
    for runs in paragraphs {
        xml.push_str("<a:p>");
        for run in *runs {
            xml.push_str("<a:r><a:rPr lang=\"en-US\"/><a:t>");
            xml.push_str(run);
            xml.push_str("</a:t></a:r>");
        }
        xml.push_str("</a:p>");
    }
    xml.push_str("</p:txBody></p:sp></p:spTree></p:cSld></p:sld>");
    xml
}

fn write_deck(path: &Path, parts: &[(&str, String)]) -> anyhow::Result<()> {
    let mut zip = ZipWriter::new(std::fs::File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in parts {
        zip.start_file(*name, options)?;
        zip.write_all(content.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

#[tokio::test]
async fn loads_slides_in_deck_order() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let deck = temp_dir.path().join("Biology Lecture.pptx");
    write_deck(
        &deck,
        &[
            ("[Content_Types].xml", "<Types/>".to_string()),
            (
                "ppt/slides/slide10.xml",
                slide_xml(&[&["Summary: ", "plants feed the biosphere"]]),
            ),
            (
                "ppt/slides/slide2.xml",
                slide_xml(&[&["Photosynthesis"], &[], &["Light &amp; dark reactions"]]),
            ),
            (
                "ppt/slides/_rels/slide2.xml.rels",
                "<Relationships/>".to_string(),
            ),
            (
                "ppt/slideLayouts/slideLayout1.xml",
                slide_xml(&[&["Click to edit title"]]),
            ),
        ],
    )?;

    let loader = Loader::new(quick_retry());
    let loaded = loader.load(&Source::File(deck)).await?;

    assert_eq!(loaded.title, "Biology Lecture");
    assert_eq!(loaded.source_type, SourceType::Pptx);
    assert_eq!(
        loaded.text,
        "--- Slide 1 ---\nPhotosynthesis\nLight & dark reactions\n\n\
         --- Slide 2 ---\nSummary: plants feed the biosphere"
    );
    Ok(())
}

#[tokio::test]
async fn broken_decks_are_rejected() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let loader = Loader::new(quick_retry());

    let corrupt = temp_dir.path().join("corrupt.pptx");
    std::fs::write(&corrupt, b"not really slides")?;
    let error = loader
        .load(&Source::File(corrupt))
        .await
        .expect_err("not a zip archive");
    assert!(matches!(error, ThinkbookError::InvalidInput(_)));

    let empty = temp_dir.path().join("empty.pptx");
    write_deck(&empty, &[("[Content_Types].xml", "<Types/>".to_string())])?;
    let error = loader
        .load(&Source::File(empty))
        .await
        .expect_err("deck without slides");
    assert!(matches!(error, ThinkbookError::InvalidInput(ref message) if message.contains("no slides")));
    Ok(())
}

#[tokio::test]
async fn fetches_urls() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><head><title>Article</title></head><body><nav>Menu</nav><p>{LONG_TEXT}</p></body></html>"
        )))
        .expect(1)
        .mount(&server)
        .await;

    let loader = Loader::new(quick_retry());
    let url = format!("{}/article", server.uri());
    let loaded = loader.load(&Source::Url(url.clone())).await?;

    assert_eq!(loaded.title, "Article");
    assert_eq!(loaded.source_type, SourceType::Url);
    assert_eq!(loaded.source, url);
    assert_eq!(loaded.text, LONG_TEXT);
    Ok(())
}

#[tokio::test]
async fn url_client_errors_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let loader = Loader::new(quick_retry());
    let error = loader
        .load(&Source::Url(format!("{}/gone", server.uri())))
        .await
        .expect_err("404 should fail");
    assert!(matches!(error, ThinkbookError::Network(_)));
}

#[tokio::test]
async fn rejects_non_http_urls() {
    let loader = Loader::new(quick_retry());
    let error = loader
        .load(&Source::Url("ftp://example.com/file".to_string()))
        .await
        .expect_err("ftp should be rejected");
    assert!(matches!(error, ThinkbookError::InvalidInput(_)));
}
