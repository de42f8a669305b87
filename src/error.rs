//! Error types for the doc2llm library.
//!
//! Three severities, three representations:
//!
//! * [`IngestError`]: **Fatal**: the ingestion cannot proceed at all
//!   (source missing, unsupported format, canonical PDF cannot be opened).
//!   Returned as `Err(IngestError)` from the top-level `ingest*` functions.
//!
//! * [`Isolated`]: **Degraded**: one page, image or table failed. Produced
//!   only by [`crate::pipeline::isolate`], logged, and collected into
//!   [`crate::output::IngestOutput::degraded`]; every other unit carries on.
//!
//! * Advisory: a filesystem stat failure is recorded on
//!   [`crate::output::Metadata::error`] and never surfaces as an `Err`.
//!
//! Converters have their own [`ConversionError`] so the failing source and
//! the underlying cause travel together.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doc2llm library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is empty or otherwise unusable.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Neither the extension table nor MIME sniffing recognised the file.
    #[error(
        "Unsupported format for '{path}'\n\
Supported: pdf, jpg/jpeg/png/bmp/tiff/gif, html/htm, md/markdown, pptx, or an http(s) URL."
    )]
    UnsupportedFormat { path: PathBuf },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// A format converter could not produce the canonical PDF.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The canonical PDF cannot be opened for per-page reading.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
binary, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A converter failure: the source it was converting plus the cause.
#[derive(Debug, Error)]
#[error("Failed to convert '{source_ref}' to PDF: {cause}")]
pub struct ConversionError {
    /// Path or URL that was being converted.
    pub source_ref: String,
    #[source]
    pub cause: ConversionCause,
}

impl ConversionError {
    pub fn new(source_ref: impl Into<String>, cause: impl Into<ConversionCause>) -> Self {
        Self {
            source_ref: source_ref.into(),
            cause: cause.into(),
        }
    }
}

/// Underlying reason a conversion failed.
#[derive(Debug, Error)]
pub enum ConversionCause {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("pdfium: {0}")]
    Pdfium(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The reachability probe got a non-success status.
    #[error("Unavailable page (code: {status})")]
    Unavailable { status: u16 },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("reachability probe timed out after {secs}s")]
    ProbeTimeout { secs: u64 },

    #[error("render timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Malformed zip container or XML part.
    #[error("malformed presentation: {0}")]
    Presentation(String),
}

/// Failure reported by a [`crate::pipeline::convert::url::RenderEngine`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not start render engine '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("render engine exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    #[error("render engine produced no output")]
    EmptyOutput,

    #[error("render engine timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("render engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The unit of work a degraded failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum Unit {
    /// Reading or cleaning one page's text (1-indexed).
    PageText { page: usize },
    /// One embedded image: page (1-indexed) and index within the page (1-based).
    Image { page: usize, index: usize },
    /// Lattice detection over one page.
    TablePage { page: usize },
    /// Cleaning one detected grid.
    Table { id: usize },
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::PageText { page } => write!(f, "page {page} text"),
            Unit::Image { page, index } => write!(f, "image {index} on page {page}"),
            Unit::TablePage { page } => write!(f, "table detection on page {page}"),
            Unit::Table { id } => write!(f, "table {id}"),
        }
    }
}

/// A non-fatal, unit-level failure.
///
/// Stored in [`crate::output::IngestOutput::degraded`]. The ingestion
/// continues with the unit's documented default.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{unit}: {reason}")]
pub struct Isolated {
    pub unit: Unit,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display_lists_formats() {
        let e = IngestError::UnsupportedFormat {
            path: PathBuf::from("notes.xyz"),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.xyz"), "got: {msg}");
        assert!(msg.contains("pptx"), "got: {msg}");
    }

    #[test]
    fn conversion_error_carries_source_and_cause() {
        let e = ConversionError::new(
            "https://example.com",
            ConversionCause::Unavailable { status: 404 },
        );
        let msg = e.to_string();
        assert!(msg.contains("https://example.com"));
        assert!(msg.contains("Unavailable page (code: 404)"));
    }

    #[test]
    fn conversion_error_is_transparent_in_ingest_error() {
        let e: IngestError =
            ConversionError::new("deck.pptx", ConversionCause::Presentation("no slides".into()))
                .into();
        assert!(e.to_string().contains("deck.pptx"));
        assert!(e.to_string().contains("no slides"));
    }

    #[test]
    fn isolated_display_names_the_unit() {
        let e = Isolated {
            unit: Unit::Image { page: 3, index: 2 },
            reason: "decode failed".into(),
        };
        assert_eq!(e.to_string(), "image 2 on page 3: decode failed");
    }

    #[test]
    fn unit_serializes_tagged() {
        let json = serde_json::to_string(&Unit::Table { id: 4 }).unwrap();
        assert_eq!(json, r#"{"unit":"table","id":4}"#);
    }
}
