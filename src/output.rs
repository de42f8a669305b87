//! Output types: the document, its metadata, and the page-indexed
//! structured content every extractor feeds into.

use crate::error::Isolated;
use crate::pipeline::input::InputKind;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// The ingested source and its canonical PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Path or URL exactly as supplied.
    pub source: String,
    /// Detected input kind; URLs are reported as [`InputKind::Web`].
    pub kind: InputKind,
    /// The PDF every extractor reads.
    pub canonical_path: PathBuf,
    /// Pages in the canonical PDF.
    pub page_count: usize,
}

/// Filesystem and document metadata of the canonical PDF.
///
/// Absent fields are omitted from `metadata.json`. A record holding only
/// `error` means the file could not even be stat'ed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One retained embedded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 1-indexed page.
    pub page_number: usize,
    /// 1-based position among the page's image objects, counted before the
    /// size filter.
    pub index: usize,
    pub filename: String,
    pub path: PathBuf,
    /// Standard base64 of the PNG bytes.
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub size_kb: f64,
    /// Description text or one of the sentinels in
    /// [`crate::pipeline::describe`].
    pub description: String,
}

/// One accepted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Ordinal of the detected grid within the document.
    pub table_id: usize,
    pub page_number: usize,
    pub accuracy: f64,
    pub content_ratio: f64,
    /// `(rows, columns)` after cleaning.
    pub shape: (usize, usize),
    /// Cleaned cells, row-major.
    pub data: Vec<Vec<String>>,
    /// Row records keyed by column label, serialized.
    pub json: String,
}

impl TableRecord {
    /// Serialize rows as `[{"0": .., "1": ..}, ..]`, keeping column order.
    pub fn records_json(rows: &[Vec<String>]) -> String {
        let records: Vec<RowRecord<'_>> = rows.iter().map(|r| RowRecord(r)).collect();
        // Serializing strings into a Vec cannot fail.
        serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string())
    }
}

struct RowRecord<'a>(&'a [String]);

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (col, cell) in self.0.iter().enumerate() {
            map.serialize_entry(&col.to_string(), cell)?;
        }
        map.end()
    }
}

/// Everything recovered from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// 1-indexed.
    pub page_number: usize,
    /// Raw text as read from the page.
    pub text: String,
    /// Text after [`crate::pipeline::clean`]; equals `text` when cleaning failed.
    pub cleaned_text: String,
    pub images: Vec<ImageRecord>,
    pub tables: Vec<TableRecord>,
}

/// Ordered per-page content, one entry for every page of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredContent {
    pages: Vec<PageContent>,
}

impl StructuredContent {
    pub(crate) fn from_pages(pages: Vec<PageContent>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[PageContent] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page by 1-indexed number.
    pub fn page(&self, page_number: usize) -> Option<&PageContent> {
        page_number
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.pages.iter().flat_map(|p| p.images.iter())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRecord> {
        self.pages.iter().flat_map(|p| p.tables.iter())
    }
}

/// Statistics for one ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub page_count: usize,
    pub images: usize,
    pub tables: usize,
    pub degraded_units: usize,
    /// Chars in the linear text layer.
    pub text_length: usize,
    pub convert_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The complete result of an ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutput {
    pub request_id: String,
    pub document: Document,
    pub metadata: Metadata,
    /// Linear text layer of the whole document; empty when unreadable.
    pub text: String,
    pub structured: StructuredContent,
    /// The final LLM-ready document string.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
    /// Standalone digest of every accepted table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_path: Option<PathBuf>,
    /// Units that failed and were replaced with their documented default.
    pub degraded: Vec<Isolated>,
    pub stats: IngestStats,
}

/// Round to two decimals, as every size and score in the output is.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
