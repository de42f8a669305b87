//! Ingestion entry points.
//!
//! [`ingest`] runs the whole pipeline for one input and returns everything
//! it recovered. Unit-level failures (a page, an image, a table) are
//! collected in [`IngestOutput::degraded`]; only failures that leave no
//! canonical PDF to read are returned as `Err`.

use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::IngestError;
use crate::output::{Document, IngestOutput, IngestStats};
use crate::pipeline::assemble::{self, write_atomic};
use crate::pipeline::clean::TextCleaner;
use crate::pipeline::convert;
use crate::pipeline::describe::DescriptionService;
use crate::pipeline::images::extract_images;
use crate::pipeline::input::{self, Input};
use crate::pipeline::metadata::extract_metadata;
use crate::pipeline::tables::extract_tables;
use crate::pipeline::text::extract_text;
use crate::progress::Stage;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Ingest a local file or URL into LLM-ready content.
///
/// # Arguments
/// * `input`: local path (PDF, image, HTML, Markdown, PPTX) or http(s) URL
/// * `config`: ingestion configuration
///
/// # Errors
/// Returns `Err(IngestError)` only for fatal errors:
/// - input missing, unreadable or of an unsupported format
/// - conversion to PDF failed
/// - the canonical PDF cannot be opened
/// - the report or metadata file cannot be written
pub async fn ingest(input: impl AsRef<str>, config: &IngestConfig) -> Result<IngestOutput, IngestError> {
    let ctx = IngestContext::new(config.request_id.clone());
    let span = ctx.span();
    run(&ctx, input.as_ref(), config).instrument(span).await
}

async fn run(ctx: &IngestContext, source: &str, config: &IngestConfig) -> Result<IngestOutput, IngestError> {
    let total_start = Instant::now();
    let stage = |s: Stage| {
        debug!(request_id = %ctx.request_id(), "stage: {s}");
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage(s);
        }
    };
    info!(request_id = %ctx.request_id(), "Starting ingestion: {source}");
    if let Some(ref cb) = config.progress_callback {
        cb.on_ingest_start(source);
    }

    // ── Step 1: Route ────────────────────────────────────────────────────
    stage(Stage::Routing);
    let routed = input::detect(source)?;
    info!(request_id = %ctx.request_id(), "Input routed as {}", routed.kind());

    // ── Step 2: Canonical PDF ────────────────────────────────────────────
    stage(Stage::Converting);
    let convert_start = Instant::now();
    let canonical = convert::to_canonical(ctx, &routed, config).await?;
    let convert_duration_ms = convert_start.elapsed().as_millis() as u64;

    let extract_start = Instant::now();
    let mut degraded = Vec::new();

    // ── Step 3: Open pages ───────────────────────────────────────────────
    // The only extraction failure that is fatal: no pages, no structure.
    let (page_texts, page_degraded) = assemble::read_page_texts(ctx, &canonical).await?;
    degraded.extend(page_degraded);
    let page_count = page_texts.len();
    info!(request_id = %ctx.request_id(), "Canonical PDF has {page_count} pages");

    // ── Step 4: Metadata ─────────────────────────────────────────────────
    stage(Stage::Metadata);
    let metadata = extract_metadata(ctx, &canonical).await;

    // ── Step 5: Text layer ───────────────────────────────────────────────
    stage(Stage::Text);
    let text = extract_text(ctx, &canonical).await;

    // ── Step 6: Images ───────────────────────────────────────────────────
    stage(Stage::Images);
    let service = DescriptionService::from_config(ctx, config);
    let (images, image_degraded) = extract_images(ctx, &canonical, config, &service).await;
    degraded.extend(image_degraded);

    // ── Step 7: Tables ───────────────────────────────────────────────────
    stage(Stage::Tables);
    let (tables, table_degraded) =
        extract_tables(ctx, &canonical, &config.table_pages, config.table_thresholds).await;
    degraded.extend(table_degraded);

    // ── Step 8: Assemble ─────────────────────────────────────────────────
    stage(Stage::Assembling);
    let (structured, assemble_degraded) =
        assemble::assemble(ctx, page_texts, images, tables, &TextCleaner::default());
    degraded.extend(assemble_degraded);
    let content = assemble::render_content(&metadata, &structured);
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    let text_length = text.chars().count();

    // ── Step 9: Artifacts ────────────────────────────────────────────────
    let artifacts = if config.write_artifacts {
        stage(Stage::Writing);
        let report = assemble::render_report(
            &canonical.display().to_string(),
            &metadata,
            &structured,
            text_length,
        );
        let tables: Vec<_> = structured.tables().cloned().collect();
        let digest = assemble::render_tables(&tables);
        Some(assemble::write_artifacts(&config.extract_dir, &report, &digest, &metadata).await?)
    } else {
        None
    };

    // ── Step 10: Stats ───────────────────────────────────────────────────
    let stats = IngestStats {
        page_count,
        images: structured.images().count(),
        tables: structured.tables().count(),
        degraded_units: degraded.len(),
        text_length,
        convert_duration_ms,
        extract_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        request_id = %ctx.request_id(),
        "Ingestion complete: {} pages, {} images, {} tables, {} degraded, {}ms total",
        stats.page_count,
        stats.images,
        stats.tables,
        stats.degraded_units,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_ingest_complete(&stats);
    }

    Ok(IngestOutput {
        request_id: ctx.request_id().to_string(),
        document: Document {
            source: source.to_string(),
            kind: routed.kind(),
            canonical_path: canonical,
            page_count,
        },
        metadata,
        text,
        structured,
        content,
        report_path: artifacts.as_ref().map(|a| a.report.clone()),
        metadata_path: artifacts.as_ref().map(|a| a.metadata.clone()),
        tables_path: artifacts.map(|a| a.tables),
        degraded,
        stats,
    })
}

/// Ingest and write the final content string to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn ingest_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &IngestConfig,
) -> Result<IngestStats, IngestError> {
    let output = ingest(input, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IngestError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }
    write_atomic(path, output.content.as_bytes()).await?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`ingest`].
///
/// Creates a temporary tokio runtime internally.
pub fn ingest_sync(input: impl AsRef<str>, config: &IngestConfig) -> Result<IngestOutput, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ingest(input, config))
}

/// Route an input without converting or reading it.
pub fn detect(input: impl AsRef<str>) -> Result<Input, IngestError> {
    input::detect(input.as_ref())
}
