//! Per-ingestion context passed explicitly through every stage.

use tracing::Span;

/// Identifies one ingestion call in logs.
///
/// Every stage takes `&IngestContext` instead of looking the request up from
/// ambient state, so each stage can be driven on its own in tests.
#[derive(Debug, Clone)]
pub struct IngestContext {
    request_id: String,
}

impl IngestContext {
    /// Use the given id, or mint a v4 uuid.
    pub fn new(request_id: Option<String>) -> Self {
        Self {
            request_id: request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Root span for one ingestion.
    pub fn span(&self) -> Span {
        tracing::info_span!("ingest", request_id = %self.request_id)
    }
}
