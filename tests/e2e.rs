//! End-to-end integration tests for doc2llm.
//!
//! Every input here is generated on the fly, so no fixtures are needed.
//! Tests that read or write PDFs need the pdfium shared library and skip
//! themselves when it cannot be bound. No test makes network or LLM calls:
//! descriptions come from a scripted describer and URLs hit a local stub.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use doc2llm::pipeline::engine::pdfium_available;
use doc2llm::{
    ingest, ingest_to_file, ImageDescriber, IngestConfig, IngestError, InputKind, RenderEngine, RenderError,
};
use image::{Rgb, RgbImage};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test when no pdfium library can be bound.
macro_rules! pdfium_skip_unless_ready {
    () => {{
        if !pdfium_available() {
            println!("SKIP: pdfium not available; set PDFIUM_LIB_PATH to run");
            return;
        }
    }};
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let p = self.dir.path().join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    fn assets(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    fn extracted(&self) -> PathBuf {
        self.dir.path().join("extracted")
    }

    fn config(&self) -> IngestConfig {
        IngestConfig::builder()
            .output_dir(self.assets())
            .extract_dir(self.extracted())
            .describe_images(false)
            .build()
            .unwrap()
    }
}

struct CountingDescriber {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageDescriber for CountingDescriber {
    async fn describe(&self, _path: &Path) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        "A solid teal square.".to_string()
    }

    async fn describe_from_bytes(&self, _bytes: &[u8]) -> String {
        "A solid teal square.".to_string()
    }
}

/// Stands in for a headless browser by copying an already rendered PDF.
struct CopyEngine {
    pdf: PathBuf,
}

#[async_trait]
impl RenderEngine for CopyEngine {
    async fn render(&self, _url: &Url, out: &Path, _timeout: Duration) -> Result<(), RenderError> {
        tokio::fs::copy(&self.pdf, out).await?;
        Ok(())
    }
}

/// A two-slide deck with one text body per slide.
fn pptx(slides: &[&str]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let ids: String = (1..=slides.len())
        .map(|i| format!("<p:sldId id=\"{}\" r:id=\"rId{i}\"/>", 255 + i))
        .collect();
    let rels: String = (1..=slides.len())
        .map(|i| format!("<Relationship Id=\"rId{i}\" Type=\"slide\" Target=\"slides/slide{i}.xml\"/>"))
        .collect();

    zip.start_file("ppt/presentation.xml", options).unwrap();
    write!(
        zip,
        "<p:presentation xmlns:p=\"p\" xmlns:r=\"r\"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"
    )
    .unwrap();
    zip.start_file("ppt/_rels/presentation.xml.rels", options).unwrap();
    write!(zip, "<Relationships>{rels}</Relationships>").unwrap();
    for (i, text) in slides.iter().enumerate() {
        zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), options).unwrap();
        write!(
            zip,
            "<p:sld xmlns:a=\"a\" xmlns:p=\"p\"><p:cSld><p:spTree><p:sp><p:txBody>\
             <a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"
        )
        .unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([0, 128, 128]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

// ── Routing-level failures (no pdfium needed) ────────────────────────────────

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let err = ingest("/definitely/missing.md", &IngestConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_unknown_format_is_fatal() {
    let ws = Workspace::new();
    let path = ws.file("data.unknown", b"no magic here");
    let err = ingest(path.to_str().unwrap(), &ws.config()).await.unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat { .. }));
    assert!(!ws.assets().exists(), "no conversion should have started");
}

// ── Converters + extractors (pdfium) ─────────────────────────────────────────

#[tokio::test]
async fn test_markdown_with_table() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let md = ws.file(
        "inventory.md",
        b"# Inventory\n\nStock levels for the quarter.\n\n\
          | Item | Qty |\n|------|-----|\n| Bolt | 4 |\n| Nut | 12 |\n",
    );

    let output = ingest(md.to_str().unwrap(), &ws.config()).await.unwrap();

    assert_eq!(output.document.kind, InputKind::Markdown);
    assert_eq!(output.document.canonical_path, ws.assets().join("inventory.pdf"));
    assert!(output.document.canonical_path.exists());
    assert_eq!(output.structured.len(), output.document.page_count);
    assert!(output.content.contains("--- PAGE 1 ---"), "{}", output.content);
    assert!(output.text.contains("Inventory"));

    assert!(output.text.contains("Bolt"));

    // Grid detection depends on how pdfium reports the drawn rules, so only
    // check what a detected table must look like.
    for table in output.structured.tables() {
        assert_eq!(table.page_number, 1);
        assert!(table.shape.0 >= 2 && table.shape.1 >= 2);
        assert!(output.content.contains("TABLES ON THIS PAGE:"));
    }
}

#[tokio::test]
async fn test_image_input_becomes_one_page() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let photo = ws.file("photo.png", &png(200, 100));
    let describer = Arc::new(CountingDescriber {
        calls: AtomicUsize::new(0),
    });
    let config = IngestConfig::builder()
        .output_dir(ws.assets())
        .extract_dir(ws.extracted())
        .describer(describer.clone())
        .build()
        .unwrap();

    let output = ingest(photo.to_str().unwrap(), &config).await.unwrap();

    assert_eq!(output.document.kind, InputKind::Image);
    assert_eq!(output.document.page_count, 1);
    assert_eq!(output.structured.len(), 1);

    let images: Vec<_> = output.structured.images().collect();
    assert_eq!(images.len(), 1);
    assert!(images[0].width >= 50 && images[0].height >= 50);
    assert_eq!(images[0].description, "A solid teal square.");
    assert!(ws.extracted().join("image_p1_1.png").exists());
    assert_eq!(describer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tiny_images_are_dropped() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let icon = ws.file("icon.png", &png(40, 40));

    let output = ingest(icon.to_str().unwrap(), &ws.config()).await.unwrap();

    assert_eq!(output.structured.len(), 1);
    assert_eq!(output.structured.images().count(), 0);
}

#[tokio::test]
async fn test_html_and_artifacts() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let page = ws.file(
        "notes.html",
        b"<html><head><script>ignored()</script></head><body>\
          <h1>Meeting notes</h1><p>Decisions were made.</p>\
          <ul><li>Ship it</li></ul></body></html>",
    );

    let output = ingest(page.to_str().unwrap(), &ws.config()).await.unwrap();

    assert_eq!(output.document.kind, InputKind::Web);
    assert!(output.text.contains("Meeting notes"));
    assert!(!output.text.contains("ignored"));

    let report = std::fs::read_to_string(output.report_path.unwrap()).unwrap();
    assert!(report.starts_with("PDF CONTENT EXTRACTION REPORT"));
    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output.metadata_path.unwrap()).unwrap()).unwrap();
    assert_eq!(meta["filename"], "notes.pdf");

    let digest = std::fs::read_to_string(output.tables_path.unwrap()).unwrap();
    assert_eq!(digest, "No tables found in the document.");
}

#[tokio::test]
async fn test_presentation_keeps_slide_order() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let deck = ws.file("deck.pptx", &pptx(&["Quarterly review", "Next steps"]));

    let output = ingest(deck.to_str().unwrap(), &ws.config()).await.unwrap();

    assert_eq!(output.document.kind, InputKind::Presentation);
    assert!(output.document.page_count >= 2);
    let first = output.text.find("Quarterly review").expect("slide 1 text");
    let second = output.text.find("Next steps").expect("slide 2 text");
    assert!(first < second);
}

#[tokio::test]
async fn test_converted_names_never_collide() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let md = ws.file("same.md", b"Hello\n");
    let config = ws.config();

    let first = ingest(md.to_str().unwrap(), &config).await.unwrap();
    let second = ingest(md.to_str().unwrap(), &config).await.unwrap();

    assert_ne!(first.document.canonical_path, second.document.canonical_path);
    assert!(first.document.canonical_path.exists());
    assert!(second.document.canonical_path.exists());
}

#[tokio::test]
async fn test_corrupt_pdf_is_fatal() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let pdf = ws.file("broken.pdf", b"%PDF-1.7\nthis is not a real document");

    let err = ingest(pdf.to_str().unwrap(), &ws.config()).await.unwrap_err();
    assert!(matches!(err, IngestError::CorruptPdf { .. }), "got {err}");
}

#[tokio::test]
async fn test_url_through_stub_server() {
    pdfium_skip_unless_ready!();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    });

    let ws = Workspace::new();
    let md = ws.file("page.md", b"# Rendered page\n\nServed from a stub.\n");
    let rendered = ingest(md.to_str().unwrap(), &ws.config()).await.unwrap();

    let config = IngestConfig::builder()
        .output_dir(ws.dir.path().join("web"))
        .extract_dir(ws.extracted())
        .describe_images(false)
        .render_engine(Arc::new(CopyEngine {
            pdf: rendered.document.canonical_path,
        }))
        .build()
        .unwrap();

    let output = ingest(format!("http://{addr}/"), &config).await.unwrap();
    assert_eq!(output.document.kind, InputKind::Web);
    assert_eq!(output.document.canonical_path, ws.dir.path().join("web/127_0_0_1.pdf"));
    assert!(output.text.contains("Rendered page"));
}

#[tokio::test]
async fn test_ingest_to_file_writes_content() {
    pdfium_skip_unless_ready!();
    let ws = Workspace::new();
    let md = ws.file("short.md", b"Just one line.\n");
    let target = ws.dir.path().join("out/short.txt");

    let stats = ingest_to_file(md.to_str().unwrap(), &target, &ws.config())
        .await
        .unwrap();

    assert_eq!(stats.page_count, 1);
    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.contains("--- PAGE 1 ---"));
    assert!(written.contains("Just one line."));
}
