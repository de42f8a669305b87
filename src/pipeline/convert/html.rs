//! HTML → PDF.
//!
//! The document tree is flattened into layout [`Block`]s: headings,
//! paragraphs, list items, preformatted runs and tables. Inline markup
//! contributes its text to the surrounding paragraph. Tables are drawn as
//! ruled grids so lattice detection recovers them from the PDF.

use super::layout::{layout_blocks, write_pdf, Block};
use super::{write_staged, Converter};
use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::{ConversionCause, ConversionError};
use crate::pipeline::input::file_base_name;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Elements whose content is never rendered.
const SKIPPED: &[&str] = &["head", "script", "style", "template", "noscript", "svg"];

/// Elements that end the current paragraph and start a new one.
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "header", "html", "main", "nav",
    "section", "summary",
];

pub struct HtmlConverter {
    path: PathBuf,
    output_dir: PathBuf,
}

impl HtmlConverter {
    pub fn new(path: &Path, config: &IngestConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            output_dir: config.output_dir.clone(),
        }
    }
}

#[async_trait]
impl Converter for HtmlConverter {
    async fn convert(&self, ctx: &IngestContext) -> Result<PathBuf, ConversionError> {
        let source_ref = self.path.display().to_string();
        debug!(request_id = %ctx.request_id(), "Converting HTML {source_ref}");
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConversionError::new(&source_ref, e))?;
        let html = String::from_utf8_lossy(&bytes).into_owned();
        html_to_pdf(&source_ref, html, &self.output_dir, &file_base_name(&self.path)).await
    }
}

/// Lay out an HTML string and persist it as `<output_dir>/<base>.pdf`.
pub(crate) async fn html_to_pdf(
    source_ref: &str,
    html: String,
    output_dir: &Path,
    base: &str,
) -> Result<PathBuf, ConversionError> {
    write_staged(source_ref, output_dir, base, move |out| -> Result<(), ConversionCause> {
        let layout = layout_blocks(&html_blocks(&html));
        write_pdf(&layout, out)
    })
    .await
}

/// Flatten an HTML document into layout blocks.
pub fn html_blocks(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut walker = Walker::default();
    walker.element(document.root_element());
    walker.flush();
    walker.blocks
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    inline: String,
}

impl Walker {
    fn flush(&mut self) {
        let text = collapse(&self.inline);
        self.inline.clear();
        if !text.is_empty() {
            self.blocks.push(Block::Paragraph(text));
        }
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.inline.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            _ if SKIPPED.contains(&name) => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name[1..].parse().unwrap_or(6);
                let text = collapse(&inline_text(el));
                if !text.is_empty() {
                    self.blocks.push(Block::Heading { level, text });
                }
            }
            "p" => {
                self.flush();
                self.children(el);
                self.flush();
            }
            "br" | "hr" => self.flush(),
            "ul" | "ol" | "menu" => {
                self.flush();
                for child in el.children().filter_map(ElementRef::wrap) {
                    self.element(child);
                }
            }
            "li" => {
                self.flush();
                let text = collapse(&inline_text(el));
                if !text.is_empty() {
                    self.blocks.push(Block::ListItem(text));
                }
                // Nested lists follow their parent item.
                for nested in el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| matches!(c.value().name(), "ul" | "ol"))
                {
                    self.element(nested);
                }
            }
            "pre" => {
                self.flush();
                let text: String = el.text().collect();
                let text = text.trim_matches('\n');
                if !text.trim().is_empty() {
                    self.blocks.push(Block::Preformatted(text.to_string()));
                }
            }
            "table" => {
                self.flush();
                let rows = table_rows(el);
                if !rows.is_empty() {
                    self.blocks.push(Block::Table(rows));
                }
            }
            "img" => {
                if let Some(alt) = el.value().attr("alt") {
                    self.inline.push(' ');
                    self.inline.push_str(alt);
                    self.inline.push(' ');
                }
            }
            _ if BLOCKS.contains(&name) => {
                self.flush();
                self.children(el);
                self.flush();
            }
            _ => self.children(el),
        }
    }
}

/// Text of an element, excluding nested lists and skipped elements.
fn inline_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if matches!(e.name(), "ul" | "ol") || SKIPPED.contains(&e.name()) => {}
            Node::Element(e) if e.name() == "br" => out.push(' '),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    out.push(' ');
                    out.push_str(&inline_text(child));
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
    out
}

/// Rows of a table, ignoring rows with no cells. Nested tables are
/// flattened into their enclosing cell's text.
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "tr")
        .filter(|tr| nearest_table(*tr) == Some(table))
        .map(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(|cell| collapse(&cell.text().collect::<Vec<_>>().join(" ")))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect()
}

fn nearest_table(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

/// Collapse runs of whitespace to single spaces and trim.
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
