//! Content assembly: per-page text, records, and the final document string.
//!
//! The assembler owns the one invariant downstream consumers rely on:
//! [`StructuredContent`] has exactly one [`PageContent`] per page of the
//! canonical PDF, numbered `1..=page_count`, whatever the extractors found.

use crate::context::IngestContext;
use crate::error::{IngestError, Isolated, Unit};
use crate::output::{ImageRecord, Metadata, PageContent, StructuredContent, TableRecord};
use crate::pipeline::clean::TextCleaner;
use crate::pipeline::engine::bind_pdfium;
use crate::pipeline::isolate::isolate;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Width of the report's section rules.
const REPORT_RULE: usize = 50;
const SECTION_RULE: usize = 20;
/// Descriptions in the report are cut to this many characters.
const REPORT_DESCRIPTION_CHARS: usize = 100;

pub const REPORT_FILENAME: &str = "extraction_report.txt";
pub const METADATA_FILENAME: &str = "metadata.json";
pub const TABLES_FILENAME: &str = "tables.txt";

/// Where [`write_artifacts`] put each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub report: PathBuf,
    pub metadata: PathBuf,
    pub tables: PathBuf,
}

/// Read every page's raw text through pdfium.
///
/// Failing to open the document is fatal; a single unreadable page is
/// isolated and contributes `""`.
pub async fn read_page_texts(
    ctx: &IngestContext,
    pdf_path: &Path,
) -> Result<(Vec<String>, Vec<Isolated>), IngestError> {
    let path = pdf_path.to_path_buf();
    let task_ctx = ctx.clone();
    tokio::task::spawn_blocking(move || read_page_texts_blocking(&task_ctx, &path))
        .await
        .map_err(|e| IngestError::Internal(format!("Page text task panicked: {e}")))?
}

/// Blocking implementation of [`read_page_texts`].
pub fn read_page_texts_blocking(
    ctx: &IngestContext,
    pdf_path: &Path,
) -> Result<(Vec<String>, Vec<Isolated>), IngestError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| IngestError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let mut texts = Vec::new();
    let mut degraded = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let unit = Unit::PageText { page: idx + 1 };
        match isolate(ctx, unit, || page.text().map(|t| t.all()).map_err(|e| format!("{e:?}"))) {
            Ok(text) => texts.push(text),
            Err(isolated) => {
                texts.push(String::new());
                degraded.push(isolated);
            }
        }
    }
    debug!(request_id = %ctx.request_id(), pages = texts.len(), "page texts read");
    Ok((texts, degraded))
}

/// Build one [`PageContent`] per page text, attaching records by page.
///
/// Records pointing outside `1..=page_texts.len()` are dropped with a
/// warning. A page whose cleaning does not settle keeps its raw text.
pub fn assemble(
    ctx: &IngestContext,
    page_texts: Vec<String>,
    images: Vec<ImageRecord>,
    tables: Vec<TableRecord>,
    cleaner: &TextCleaner,
) -> (StructuredContent, Vec<Isolated>) {
    let page_count = page_texts.len();
    let mut degraded = Vec::new();

    let mut pages: Vec<PageContent> = page_texts
        .into_iter()
        .enumerate()
        .map(|(idx, text)| {
            let page_number = idx + 1;
            let cleaned_text = if text.trim().is_empty() {
                String::new()
            } else {
                match isolate(ctx, Unit::PageText { page: page_number }, || cleaner.clean(&text)) {
                    Ok(cleaned) => cleaned,
                    Err(isolated) => {
                        degraded.push(isolated);
                        text.clone()
                    }
                }
            };
            PageContent {
                page_number,
                text,
                cleaned_text,
                images: Vec::new(),
                tables: Vec::new(),
            }
        })
        .collect();

    for image in images {
        match image.page_number.checked_sub(1).and_then(|i| pages.get_mut(i)) {
            Some(page) => page.images.push(image),
            None => warn!(
                request_id = %ctx.request_id(),
                page = image.page_number,
                page_count,
                "dropping image on a page outside the document"
            ),
        }
    }
    for table in tables {
        match table.page_number.checked_sub(1).and_then(|i| pages.get_mut(i)) {
            Some(page) => page.tables.push(table),
            None => warn!(
                request_id = %ctx.request_id(),
                page = table.page_number,
                table_id = table.table_id,
                "dropping table on a page outside the document"
            ),
        }
    }

    (StructuredContent::from_pages(pages), degraded)
}

/// Format a number the way the report always has: integral values keep a
/// trailing `.0`.
fn decimal(v: f64) -> String {
    format!("{v:?}")
}

fn or_na<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Render the final LLM-ready document.
///
/// Deterministic for a given metadata record and structured content. An
/// empty document renders as `""`.
pub fn render_content(metadata: &Metadata, structured: &StructuredContent) -> String {
    if structured.is_empty() {
        return String::new();
    }

    let mut parts: Vec<String> = Vec::with_capacity(structured.len() + 5);

    if *metadata != Metadata::default() {
        parts.push("--- DOCUMENT METADATA ---".to_string());
        parts.push(format!("Filename: {}", or_na(metadata.filename.as_deref())));
        parts.push(format!("File Size: {} MB", or_na(metadata.file_size_mb.map(decimal))));
        parts.push(format!("Pages: {}", or_na(metadata.page_count)));
        parts.push(String::new());
    }

    for page in structured.pages() {
        let mut block = format!("\n--- PAGE {} ---\n", page.page_number);

        if !page.cleaned_text.is_empty() {
            block.push_str(&format!("\nTEXT CONTENT:\n{}\n", page.cleaned_text));
        }

        if !page.images.is_empty() {
            block.push_str("\nIMAGES ON THIS PAGE:\n");
            for image in &page.images {
                block.push_str(&format!(
                    "- Image {} ({}x{}, {}KB)\n",
                    image.filename,
                    image.width,
                    image.height,
                    decimal(image.size_kb)
                ));
                if !image.description.is_empty() {
                    block.push_str(&format!("  Description: {}\n", image.description));
                }
            }
        }

        if !page.tables.is_empty() {
            block.push_str("\nTABLES ON THIS PAGE:\n");
            for table in &page.tables {
                block.push_str(&format!("  JSON Data: {}\n", table.json));
            }
        }

        parts.push(block);
    }

    parts.join("\n")
}

/// Render a standalone summary of every accepted table.
pub fn render_tables(tables: &[TableRecord]) -> String {
    if tables.is_empty() {
        return "No tables found in the document.".to_string();
    }

    let mut out = vec!["--- EXTRACTED TABLES ---".to_string()];
    for table in tables {
        out.push(format!("\n=== TABLE {} ===", table.table_id));
        out.push(format!("Page: {}", table.page_number));
        out.push(format!("Size: {} rows × {} columns", table.shape.0, table.shape.1));
        out.push(format!("Accuracy: {}%", decimal(table.accuracy)));
        out.push(format!("Content Ratio: {}", decimal(table.content_ratio)));
        out.push("\nTable Data (JSON):".to_string());
        let pretty = serde_json::from_str::<serde_json::Value>(&table.json)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| table.json.clone());
        out.push(pretty);
        out.push("-".repeat(REPORT_RULE));
    }
    out.join("\n")
}

/// Render `extraction_report.txt`.
pub fn render_report(
    source: &str,
    metadata: &Metadata,
    structured: &StructuredContent,
    text_length: usize,
) -> String {
    let mut r = String::new();
    r.push_str("PDF CONTENT EXTRACTION REPORT\n");
    r.push_str(&"=".repeat(REPORT_RULE));
    r.push_str("\n\n");
    r.push_str(&format!("Source File: {source}\n"));
    r.push_str(&format!("Total Pages: {}\n", structured.len()));
    r.push_str(&format!("Images Extracted: {}\n", structured.images().count()));
    r.push_str(&format!("Text Length: {text_length} characters\n"));
    r.push('\n');

    if *metadata != Metadata::default() {
        r.push_str("METADATA\n");
        r.push_str(&"-".repeat(SECTION_RULE));
        r.push('\n');
        r.push_str(&format!("Filename: {}\n", or_na(metadata.filename.as_deref())));
        r.push_str(&format!("File Size: {} MB\n", or_na(metadata.file_size_mb.map(decimal))));
        r.push_str(&format!("Pages: {}\n", or_na(metadata.page_count)));
        r.push_str(&format!("Modified: {}\n", or_na(metadata.modified_time.as_deref())));
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(title) = present(&metadata.title) {
            r.push_str(&format!("Title: {title}\n"));
        }
        if let Some(author) = present(&metadata.author) {
            r.push_str(&format!("Author: {author}\n"));
        }
        if let Some(created) = present(&metadata.creation_date) {
            r.push_str(&format!("Created: {created}\n"));
        }
        if let Some(error) = present(&metadata.error) {
            r.push_str(&format!("Error: {error}\n"));
        }
        r.push('\n');
    }

    r.push_str("PAGE SUMMARY\n");
    r.push_str(&"-".repeat(SECTION_RULE));
    r.push('\n');
    for page in structured.pages() {
        r.push_str(&format!("Page {}:\n", page.page_number));
        r.push_str(&format!("  - Text: {} characters\n", page.text.chars().count()));
        r.push_str(&format!("  - Images: {}\n", page.images.len()));
        r.push_str(&format!("  - Tables: {}\n", page.tables.len()));
        for image in &page.images {
            r.push_str(&format!("    * {} ({}x{})\n", image.filename, image.width, image.height));
            if !image.description.is_empty() {
                let short: String = image.description.chars().take(REPORT_DESCRIPTION_CHARS).collect();
                r.push_str(&format!("      Description: {short}...\n"));
            }
        }
        r.push('\n');
    }
    r
}

/// Write `bytes` next to `path` and rename into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    let fail = |e| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }
    Ok(())
}

/// Persist the report, the table digest and `metadata.json` into
/// `extract_dir`.
pub async fn write_artifacts(
    extract_dir: &Path,
    report: &str,
    tables: &str,
    metadata: &Metadata,
) -> Result<ArtifactPaths, IngestError> {
    tokio::fs::create_dir_all(extract_dir)
        .await
        .map_err(|e| IngestError::OutputWriteFailed {
            path: extract_dir.to_path_buf(),
            source: e,
        })?;

    let report_path = extract_dir.join(REPORT_FILENAME);
    write_atomic(&report_path, report.as_bytes()).await?;

    let tables_path = extract_dir.join(TABLES_FILENAME);
    write_atomic(&tables_path, tables.as_bytes()).await?;

    let metadata_path = extract_dir.join(METADATA_FILENAME);
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| IngestError::Internal(format!("metadata serialization: {e}")))?;
    write_atomic(&metadata_path, json.as_bytes()).await?;

    Ok(ArtifactPaths {
        report: report_path,
        metadata: metadata_path,
        tables: tables_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> IngestContext {
        IngestContext::new(Some("assemble-test".into()))
    }

    fn image(page: usize, index: usize) -> ImageRecord {
        ImageRecord {
            page_number: page,
            index,
            filename: format!("image_p{page}_{index}.png"),
            path: PathBuf::from(format!("extracted_content/image_p{page}_{index}.png")),
            base64: String::new(),
            width: 120,
            height: 80,
            size_kb: 3.5,
            description: "A bar chart.".into(),
        }
    }

    fn table(id: usize, page: usize) -> TableRecord {
        let data = vec![
            vec!["Name".to_string(), "Qty".to_string()],
            vec!["Bolt".to_string(), "4".to_string()],
        ];
        TableRecord {
            table_id: id,
            page_number: page,
            accuracy: 99.0,
            content_ratio: 1.0,
            shape: (2, 2),
            json: TableRecord::records_json(&data),
            data,
        }
    }

    fn metadata() -> Metadata {
        Metadata {
            filename: Some("report.pdf".into()),
            file_size_mb: Some(1.0),
            page_count: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn one_page_content_per_page_even_when_empty() {
        let texts = vec!["First page".to_string(), String::new(), "   ".to_string()];
        let (sc, degraded) = assemble(&ctx(), texts, vec![], vec![], &TextCleaner::default());
        assert!(degraded.is_empty());
        assert_eq!(sc.len(), 3);
        let numbers: Vec<usize> = sc.pages().iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(sc.pages()[0].cleaned_text, "First page");
        assert_eq!(sc.pages()[1].cleaned_text, "");
    }

    #[test]
    fn records_attach_to_their_page_and_strays_are_dropped() {
        let texts = vec![String::new(), String::new()];
        let (sc, _) = assemble(
            &ctx(),
            texts,
            vec![image(2, 1), image(5, 1), image(0, 1)],
            vec![table(0, 1), table(1, 9)],
            &TextCleaner::default(),
        );
        assert_eq!(sc.page(2).unwrap().images.len(), 1);
        assert_eq!(sc.images().count(), 1);
        assert_eq!(sc.page(1).unwrap().tables.len(), 1);
        assert_eq!(sc.tables().count(), 1);
    }

    #[test]
    fn cleaning_failure_falls_back_to_raw_text() {
        // A single pass can never confirm a fixpoint.
        let cleaner = TextCleaner::with_max_passes(1);
        let (sc, degraded) = assemble(&ctx(), vec!["Raw  text".into()], vec![], vec![], &cleaner);
        assert_eq!(sc.pages()[0].cleaned_text, "Raw  text");
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].unit, Unit::PageText { page: 1 });
    }

    #[test]
    fn page_cleaned_to_nothing_has_no_text_section() {
        let (sc, degraded) = assemble(&ctx(), vec!["Page 3".into()], vec![], vec![], &TextCleaner::default());
        assert!(degraded.is_empty());
        assert_eq!(sc.pages()[0].text, "Page 3");
        assert_eq!(sc.pages()[0].cleaned_text, "");
        assert_eq!(render_content(&Metadata::default(), &sc), "\n--- PAGE 1 ---\n");
    }

    #[test]
    fn content_has_fixed_layout() {
        let (sc, _) = assemble(
            &ctx(),
            vec!["Hello world".into(), String::new(), String::new()],
            vec![image(1, 1)],
            vec![table(0, 1)],
            &TextCleaner::default(),
        );
        let content = render_content(&metadata(), &sc);
        let expected_head = "--- DOCUMENT METADATA ---\nFilename: report.pdf\nFile Size: 1.0 MB\nPages: 3\n\n\n--- PAGE 1 ---\n\nTEXT CONTENT:\nHello world\n\nIMAGES ON THIS PAGE:\n- Image image_p1_1.png (120x80, 3.5KB)\n  Description: A bar chart.\n\nTABLES ON THIS PAGE:\n  JSON Data: [{\"0\":\"Name\",\"1\":\"Qty\"},{\"0\":\"Bolt\",\"1\":\"4\"}]\n";
        assert!(content.starts_with(expected_head), "got:\n{content}");
        assert!(content.ends_with("\n--- PAGE 3 ---\n"));
        assert_eq!(content, render_content(&metadata(), &sc));
    }

    #[test]
    fn missing_metadata_fields_render_as_na() {
        let (sc, _) = assemble(&ctx(), vec![String::new()], vec![], vec![], &TextCleaner::default());
        let m = Metadata {
            error: Some("Failed to get file stats: gone".into()),
            ..Default::default()
        };
        let content = render_content(&m, &sc);
        assert!(content.contains("Filename: N/A"));
        assert!(content.contains("File Size: N/A MB"));
    }

    #[test]
    fn empty_document_renders_empty() {
        assert_eq!(render_content(&metadata(), &StructuredContent::default()), "");
    }

    #[test]
    fn report_truncates_descriptions() {
        let mut img = image(1, 1);
        img.description = "x".repeat(150);
        let (sc, _) = assemble(&ctx(), vec!["abc".into()], vec![img], vec![], &TextCleaner::default());
        let report = render_report("in.pdf", &metadata(), &sc, 3);
        assert!(report.starts_with("PDF CONTENT EXTRACTION REPORT\n=================================================="));
        assert!(report.contains("Images Extracted: 1\n"));
        assert!(report.contains("Text Length: 3 characters\n"));
        assert!(report.contains(&format!("      Description: {}...\n", "x".repeat(100))));
    }

    #[test]
    fn tables_summary_lists_each_table() {
        let summary = render_tables(&[table(3, 2)]);
        assert!(summary.starts_with("--- EXTRACTED TABLES ---"));
        assert!(summary.contains("=== TABLE 3 ==="));
        assert!(summary.contains("Size: 2 rows × 2 columns"));
        assert!(summary.contains("\"0\": \"Name\""));
        assert_eq!(render_tables(&[]), "No tables found in the document.");
    }

    #[tokio::test]
    async fn artifacts_are_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let digest = render_tables(&[table(1, 1)]);
        let paths = write_artifacts(&out, "report body", &digest, &metadata()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&paths.report).unwrap(), "report body");
        assert_eq!(paths.tables, out.join(TABLES_FILENAME));
        assert_eq!(std::fs::read_to_string(&paths.tables).unwrap(), digest);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.metadata).unwrap()).unwrap();
        assert_eq!(json["filename"], "report.pdf");
        assert!(json.get("error").is_none());
        let leftovers = std::fs::read_dir(&out)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn unwritable_extract_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let err = write_artifacts(&blocker, "r", "t", &metadata()).await.unwrap_err();
        assert!(matches!(err, IngestError::OutputWriteFailed { .. }));
    }

    #[test]
    fn corrupt_document_is_fatal_for_page_texts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"garbage").unwrap();
        let err = read_page_texts_blocking(&ctx(), &path).unwrap_err();
        assert!(matches!(
            err,
            IngestError::CorruptPdf { .. } | IngestError::PdfiumBindingFailed(_)
        ));
    }
}
