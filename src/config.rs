//! Configuration types for document ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. Every threshold the pipeline relies on (image
//! noise floor, table acceptance, timeouts) lives here so two runs can be
//! compared by diffing their configs.

use crate::error::IngestError;
use crate::pipeline::convert::url::RenderEngine;
use crate::pipeline::describe::ImageDescriber;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one ingestion.
///
/// # Example
/// ```rust
/// use doc2llm::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .output_dir("assets")
///     .describe_images(false)
///     .min_image_dimension(64)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Directory receiving converted canonical PDFs. Default: `assets`.
    pub output_dir: PathBuf,

    /// Directory receiving extracted images, the report and `metadata.json`.
    /// Default: `extracted_content`.
    pub extract_dir: PathBuf,

    /// Correlation id attached to every log line. A v4 uuid is generated
    /// when `None`.
    pub request_id: Option<String>,

    /// Ask the description service about each retained image. Default: true.
    ///
    /// When false, every image gets the "No description available" sentinel
    /// and no provider is resolved.
    pub describe_images: bool,

    /// Pre-built describer. Takes precedence over every provider setting.
    pub describer: Option<Arc<dyn ImageDescriber>>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Vision model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Custom description prompt; `{topic}` is substituted. If None, uses
    /// [`crate::prompts::DEFAULT_DESCRIBE_PROMPT`].
    pub describe_prompt: Option<String>,

    /// Topic hint substituted into the description prompt. Default: "general".
    pub describe_topic: String,

    /// Sampling temperature for descriptions. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per description. Default: 4096.
    pub max_tokens: usize,

    /// Per-description call timeout in seconds. Default: 60.
    pub describe_timeout_secs: u64,

    /// Concurrent description calls. Default: 4.
    pub describe_concurrency: usize,

    /// Images narrower or shorter than this (pixels) are dropped. Default: 50.
    pub min_image_dimension: u32,

    /// Pages scanned for tables. Default: all.
    pub table_pages: PageSelection,

    /// Table acceptance thresholds. Default: ratio > 0.1 OR accuracy > 40.
    pub table_thresholds: TableThresholds,

    /// Resolution used when an image becomes a one-page PDF. Default: 100.
    pub image_dpi: f32,

    /// Reachability probe timeout for URL inputs, seconds. Default: 10.
    pub probe_timeout_secs: u64,

    /// Hard wall-clock limit for rendering a URL, seconds. Default: 30.
    pub render_timeout_secs: u64,

    /// Headless browser used by the default render engine.
    /// Default: `$DOC2LLM_CHROMIUM` or `chromium`.
    pub chromium_path: PathBuf,

    /// Pre-built render engine. Takes precedence over `chromium_path`.
    pub render_engine: Option<Arc<dyn RenderEngine>>,

    /// Progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,

    /// Write `extraction_report.txt` and `metadata.json`. Default: true.
    pub write_artifacts: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("assets"),
            extract_dir: PathBuf::from("extracted_content"),
            request_id: None,
            describe_images: true,
            describer: None,
            provider: None,
            provider_name: None,
            model: None,
            describe_prompt: None,
            describe_topic: "general".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            describe_timeout_secs: 60,
            describe_concurrency: 4,
            min_image_dimension: 50,
            table_pages: PageSelection::default(),
            table_thresholds: TableThresholds::default(),
            image_dpi: 100.0,
            probe_timeout_secs: 10,
            render_timeout_secs: 30,
            chromium_path: std::env::var_os("DOC2LLM_CHROMIUM")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("chromium")),
            render_engine: None,
            progress_callback: None,
            write_artifacts: true,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("output_dir", &self.output_dir)
            .field("extract_dir", &self.extract_dir)
            .field("request_id", &self.request_id)
            .field("describe_images", &self.describe_images)
            .field("describer", &self.describer.as_ref().map(|_| "<dyn ImageDescriber>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("describe_topic", &self.describe_topic)
            .field("describe_concurrency", &self.describe_concurrency)
            .field("min_image_dimension", &self.min_image_dimension)
            .field("table_pages", &self.table_pages)
            .field("table_thresholds", &self.table_thresholds)
            .field("image_dpi", &self.image_dpi)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("chromium_path", &self.chromium_path)
            .field("render_engine", &self.render_engine.as_ref().map(|_| "<dyn RenderEngine>"))
            .field("write_artifacts", &self.write_artifacts)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.extract_dir = dir.into();
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.config.request_id = Some(id.into());
        self
    }

    pub fn describe_images(mut self, v: bool) -> Self {
        self.config.describe_images = v;
        self
    }

    pub fn describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.config.describer = Some(describer);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn describe_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.describe_prompt = Some(prompt.into());
        self
    }

    pub fn describe_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.describe_topic = topic.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn describe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.describe_timeout_secs = secs.max(1);
        self
    }

    pub fn describe_concurrency(mut self, n: usize) -> Self {
        self.config.describe_concurrency = n.max(1);
        self
    }

    pub fn min_image_dimension(mut self, px: u32) -> Self {
        self.config.min_image_dimension = px;
        self
    }

    pub fn table_pages(mut self, selection: PageSelection) -> Self {
        self.config.table_pages = selection;
        self
    }

    pub fn table_thresholds(mut self, thresholds: TableThresholds) -> Self {
        self.config.table_thresholds = thresholds;
        self
    }

    pub fn image_dpi(mut self, dpi: f32) -> Self {
        self.config.image_dpi = dpi.clamp(36.0, 600.0);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs;
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chromium_path = path.into();
        self
    }

    pub fn render_engine(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.config.render_engine = Some(engine);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn write_artifacts(mut self, v: bool) -> Self {
        self.config.write_artifacts = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.probe_timeout_secs == 0 || c.render_timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "Probe and render timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() || c.extract_dir.as_os_str().is_empty() {
            return Err(IngestError::InvalidConfig(
                "Output and extract directories must not be empty".into(),
            ));
        }
        c.table_thresholds.validate()?;
        Ok(self.config)
    }
}

// ── Table thresholds ─────────────────────────────────────────────────────

/// Acceptance thresholds for detected tables.
///
/// A cleaned grid is kept when `content_ratio > min_content_ratio` **or**
/// `accuracy > min_accuracy`. Both values are empirical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableThresholds {
    /// Fraction of non-empty cells, 0.0–1.0. Default: 0.1.
    pub min_content_ratio: f64,
    /// Detector accuracy score, 0–100. Default: 40.
    pub min_accuracy: f64,
}

impl Default for TableThresholds {
    fn default() -> Self {
        Self {
            min_content_ratio: 0.1,
            min_accuracy: 40.0,
        }
    }
}

impl TableThresholds {
    fn validate(&self) -> Result<(), IngestError> {
        if !(0.0..=1.0).contains(&self.min_content_ratio) {
            return Err(IngestError::InvalidConfig(format!(
                "min_content_ratio must be 0.0–1.0, got {}",
                self.min_content_ratio
            )));
        }
        if !(0.0..=100.0).contains(&self.min_accuracy) {
            return Err(IngestError::InvalidConfig(format!(
                "min_accuracy must be 0–100, got {}",
                self.min_accuracy
            )));
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the canonical PDF to scan for tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
