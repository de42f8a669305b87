//! Linear text extraction through an independent text-layer reader.
//!
//! `pdf-extract` parses the content streams itself instead of going through
//! pdfium, so a document that trips one reader can still yield text from the
//! other. An empty string means "no extractable text", never "error".

use crate::context::IngestContext;
use std::path::Path;
use tracing::{debug, warn};

/// Extract the document's full text asynchronously.
pub async fn extract_text(ctx: &IngestContext, pdf_path: &Path) -> String {
    let path = pdf_path.to_path_buf();
    let task_ctx = ctx.clone();
    tokio::task::spawn_blocking(move || extract_text_blocking(&task_ctx, &path))
        .await
        .unwrap_or_else(|e| {
            warn!(request_id = %ctx.request_id(), "text task failed: {e}");
            String::new()
        })
}

/// Blocking implementation; returns `""` on any failure.
pub fn extract_text_blocking(ctx: &IngestContext, pdf_path: &Path) -> String {
    let bytes = match std::fs::read(pdf_path) {
        Ok(b) => b,
        Err(e) => {
            warn!(request_id = %ctx.request_id(), path = %pdf_path.display(), "cannot read PDF: {e}");
            return String::new();
        }
    };

    // The parser panics on some malformed inputs instead of returning Err.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes)) {
        Ok(Ok(text)) => {
            debug!(request_id = %ctx.request_id(), chars = text.len(), "text layer read");
            text
        }
        Ok(Err(e)) => {
            warn!(request_id = %ctx.request_id(), path = %pdf_path.display(), "text layer unreadable: {e}");
            String::new()
        }
        Err(_) => {
            warn!(request_id = %ctx.request_id(), path = %pdf_path.display(), "text layer reader panicked");
            String::new()
        }
    }
}
