//! Progress-callback trait for ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. The trait is
//! `Send + Sync` because image descriptions complete concurrently.
//!
//! # Example
//!
//! ```rust
//! use doc2llm::{IngestConfig, IngestProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StageLogger;
//!
//! impl IngestProgressCallback for StageLogger {
//!     fn on_stage(&self, stage: Stage) {
//!         eprintln!("→ {stage}");
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(StageLogger))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::IngestStats;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage, reported in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Routing,
    Converting,
    Metadata,
    Text,
    Images,
    Tables,
    Assembling,
    Writing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Routing => "detecting format",
            Stage::Converting => "converting to PDF",
            Stage::Metadata => "reading metadata",
            Stage::Text => "reading text layer",
            Stage::Images => "extracting images",
            Stage::Tables => "detecting tables",
            Stage::Assembling => "assembling content",
            Stage::Writing => "writing artifacts",
        };
        f.write_str(name)
    }
}

/// Called by the ingestion pipeline as it progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_image_described` may be called concurrently
/// from different tasks.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before routing.
    fn on_ingest_start(&self, source: &str) {
        let _ = source;
    }

    /// Called when a stage begins.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once the number of retained images is known.
    fn on_images_found(&self, total: usize) {
        let _ = total;
    }

    /// Called as each retained image receives its description.
    ///
    /// # Arguments
    /// * `page`: 1-indexed page number
    /// * `index`: 1-based image index within the page
    fn on_image_described(&self, page: usize, index: usize) {
        let _ = (page, index);
    }

    /// Called once after the final document has been assembled.
    fn on_ingest_complete(&self, stats: &IngestStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
