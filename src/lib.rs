//! # doc2llm
//!
//! Turn documents of many formats into one LLM-ready text document.
//!
//! Every input is first normalised to a canonical PDF. Four independent
//! extractors then read that PDF: metadata, the linear text layer, embedded
//! images (described by a vision model) and ruled tables. Their results are
//! assembled page by page into a deterministic plain-text document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL
//!  │
//!  ├─ 1. Route     extension table, then magic bytes; URLs first
//!  ├─ 2. Convert   image / HTML / Markdown / PPTX / URL → PDF (PDFs pass through)
//!  ├─ 3. Extract   metadata · text · images (+ descriptions) · tables
//!  ├─ 4. Assemble  one PageContent per page, text cleaned to a fixpoint
//!  └─ 5. Output    content string, extraction_report.txt, metadata.json
//! ```
//!
//! A failing page, image or table never aborts the run: the unit is
//! replaced by its documented default and recorded in
//! [`IngestOutput::degraded`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2llm::{ingest, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Descriptions use whichever provider the environment configures.
//!     let config = IngestConfig::default();
//!     let output = ingest("slides.pptx", &config).await?;
//!     println!("{}", output.content);
//!     eprintln!(
//!         "{} pages, {} images, {} tables",
//!         output.stats.page_count, output.stats.images, output.stats.tables
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2llm` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doc2llm = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! * A pdfium shared library (`PDFIUM_LIB_PATH`, next to the binary, or
//!   system-wide) for everything past routing.
//! * A headless Chromium for URL inputs (`DOC2LLM_CHROMIUM` or `chromium`
//!   on `PATH`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, PageSelection, TableThresholds};
pub use context::IngestContext;
pub use error::{ConversionCause, ConversionError, IngestError, Isolated, RenderError, Unit};
pub use ingest::{detect, ingest, ingest_sync, ingest_to_file};
pub use output::{
    Document, ImageRecord, IngestOutput, IngestStats, Metadata, PageContent, StructuredContent, TableRecord,
};
pub use pipeline::convert::{ChromiumEngine, RenderEngine};
pub use pipeline::describe::{DescriptionService, ImageDescriber, LlmDescriber};
pub use pipeline::input::{Input, InputKind};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
