//! Markdown → HTML → PDF.

use super::html::html_to_pdf;
use super::Converter;
use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::ConversionError;
use crate::pipeline::input::file_base_name;
use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct MarkdownConverter {
    path: PathBuf,
    output_dir: PathBuf,
}

impl MarkdownConverter {
    pub fn new(path: &Path, config: &IngestConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            output_dir: config.output_dir.clone(),
        }
    }
}

#[async_trait]
impl Converter for MarkdownConverter {
    async fn convert(&self, ctx: &IngestContext) -> Result<PathBuf, ConversionError> {
        let source_ref = self.path.display().to_string();
        debug!(request_id = %ctx.request_id(), "Converting Markdown {source_ref}");
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConversionError::new(&source_ref, e))?;
        let html = markdown_to_html(&String::from_utf8_lossy(&bytes));
        html_to_pdf(&source_ref, html, &self.output_dir, &file_base_name(&self.path)).await
    }
}

/// Render Markdown (with tables and strikethrough) to HTML.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}
