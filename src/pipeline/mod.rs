//! Pipeline stages for document ingestion.
//!
//! Each submodule implements one step; [`crate::ingest`] wires them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ convert ──▶ ┬─ metadata ─┐
//! (route)   (→ PDF)     ├─ text ─────┤
//!                       ├─ images ───┼──▶ assemble ──▶ content string
//!                       │  └ describe│     └ clean
//!                       └─ tables ───┘
//! ```
//!
//! 1. [`input`]    classify a path or URL into an [`input::InputKind`]
//! 2. [`convert`]  produce the canonical PDF (no-op for PDFs)
//! 3. [`metadata`] filesystem stats plus the document info dictionary
//! 4. [`text`]     whole-document text
//! 5. [`images`]   embedded images, persisted and described via [`describe`]
//! 6. [`tables`]   ruled-grid detection
//! 7. [`assemble`] per-page structure, cleaned with [`clean`], and rendering
//!
//! [`engine`] binds pdfium; [`isolate`] confines unit-level failures;
//! [`encode`] turns images into PNG/base64 payloads.

pub mod assemble;
pub mod clean;
pub mod convert;
pub mod describe;
pub mod encode;
pub mod engine;
pub mod images;
pub mod input;
pub mod isolate;
pub mod metadata;
pub mod tables;
pub mod text;
