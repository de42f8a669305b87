//! Metadata extraction: filesystem stats plus PDF document properties.
//!
//! The two halves fail independently:
//!
//! * a stat failure ends this component early with a record holding only
//!   `error`, since nothing else about the file can be trusted;
//! * a document failure (corrupt PDF, engine unavailable) keeps the
//!   filesystem fields and adds `error`. Text, image and table extraction
//!   run regardless.

use crate::context::IngestContext;
use crate::error::IngestError;
use crate::output::{round2, Metadata};
use crate::pipeline::engine::bind_pdfium;
use chrono::{DateTime, Local};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Extract metadata asynchronously; pdfium work runs on the blocking pool.
pub async fn extract_metadata(ctx: &IngestContext, pdf_path: &Path) -> Metadata {
    let path = pdf_path.to_path_buf();
    let task_ctx = ctx.clone();
    match tokio::task::spawn_blocking(move || extract_metadata_blocking(&task_ctx, &path)).await {
        Ok(metadata) => metadata,
        Err(e) => Metadata {
            error: Some(format!("Metadata task panicked: {e}")),
            ..Default::default()
        },
    }
}

/// Blocking implementation of metadata extraction.
pub fn extract_metadata_blocking(ctx: &IngestContext, pdf_path: &Path) -> Metadata {
    let mut metadata = match filesystem_metadata(pdf_path) {
        Ok(m) => m,
        Err(e) => {
            warn!(request_id = %ctx.request_id(), path = %pdf_path.display(), "stat failed: {e}");
            return Metadata {
                error: Some(format!("Failed to get file stats: {e}")),
                ..Default::default()
            };
        }
    };

    match document_properties(pdf_path) {
        Ok(props) => {
            debug!(
                request_id = %ctx.request_id(),
                pages = props.page_count,
                "document properties read"
            );
            metadata.title = Some(props.title);
            metadata.author = Some(props.author);
            metadata.creation_date = Some(props.creation_date);
            metadata.page_count = Some(props.page_count);
        }
        Err(detail) => {
            warn!(request_id = %ctx.request_id(), path = %pdf_path.display(), "invalid PDF: {detail}");
            metadata.error = Some(format!("Invalid PDF file: {detail}"));
        }
    }

    metadata
}

fn filesystem_metadata(path: &Path) -> std::io::Result<Metadata> {
    let stat = std::fs::metadata(path)?;
    let modified: DateTime<Local> = stat.modified()?.into();
    Ok(Metadata {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        file_size_mb: Some(round2(stat.len() as f64 / BYTES_PER_MB)),
        modified_time: Some(modified.naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        ..Default::default()
    })
}

struct DocumentProperties {
    title: String,
    author: String,
    creation_date: String,
    page_count: usize,
}

fn document_properties(path: &Path) -> Result<DocumentProperties, String> {
    let pdfium = bind_pdfium().map_err(|e| match e {
        IngestError::PdfiumBindingFailed(detail) => format!("pdfium unavailable: {detail}"),
        other => other.to_string(),
    })?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| format!("{e:?}"))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> String {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .unwrap_or_default()
    };

    Ok(DocumentProperties {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        page_count: document.pages().len() as usize,
    })
}
