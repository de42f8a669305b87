//! Page layout for generated PDFs.
//!
//! Converters never talk to pdfium directly while laying out. They build a
//! [`Layout`] (pages of positioned [`Mark`]s), which is plain data and easy
//! to test, and [`write_pdf`] turns it into a document in one blocking call.
//!
//! Coordinates are PDF points, origin bottom-left. Text widths are estimated
//! from average glyph widths of the standard fonts; the goal is readable,
//! extractable text, not typographic fidelity.

use crate::error::ConversionCause;
use crate::pipeline::engine::bind_pdfium;
use pdfium_render::prelude::*;
use std::path::Path;

/// US Letter, portrait.
pub const LETTER_WIDTH: f32 = 612.0;
pub const LETTER_HEIGHT: f32 = 792.0;
/// Left margin and bottom limit of flowed content.
pub const MARGIN: f32 = 40.0;

const BODY_SIZE: f32 = 11.0;
const MONO_SIZE: f32 = 9.5;
const TABLE_SIZE: f32 = 10.0;
const LEADING: f32 = 1.35;
const BLOCK_GAP: f32 = 6.0;
const CELL_PAD: f32 = 4.0;
const RULE_WIDTH: f32 = 0.75;

// Slide pages.
const SLIDE_SIZE: f32 = 12.0;
const SLIDE_TITLE_GAP: f32 = 30.0;
const SLIDE_LINE_GAP: f32 = 15.0;
const SLIDE_MAX_CHARS: usize = 100;

/// Standard font faces used in generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Mono,
}

impl Face {
    /// Average glyph advance as a fraction of the font size.
    fn advance(self) -> f32 {
        match self {
            Face::Regular => 0.5,
            Face::Bold => 0.55,
            Face::Mono => 0.6,
        }
    }

    /// Characters that fit in `width` points at `size`.
    fn chars_in(self, width: f32, size: f32) -> usize {
        ((width / (size * self.advance())).floor() as usize).max(1)
    }
}

/// Something drawn on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    /// Text with its baseline starting at `(x, y)`.
    Text {
        x: f32,
        y: f32,
        text: String,
        face: Face,
        size: f32,
    },
    /// A straight ruling line.
    Rule { x1: f32, y1: f32, x2: f32, y2: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub width: f32,
    pub height: f32,
    pub marks: Vec<Mark>,
}

impl Page {
    pub fn letter() -> Self {
        Self {
            width: LETTER_WIDTH,
            height: LETTER_HEIGHT,
            marks: Vec::new(),
        }
    }

    /// Text of every text mark, top to bottom as drawn.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.marks.iter().filter_map(|m| match m {
            Mark::Text { text, .. } => Some(text.as_str()),
            Mark::Rule { .. } => None,
        })
    }
}

/// A whole document, ready to be written. Always at least one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub pages: Vec<Page>,
}

/// Block-level content shared by the HTML and Markdown paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem(String),
    Preformatted(String),
    Table(Vec<Vec<String>>),
}

/// Greedy word wrap to `max_chars` per line; over-long words are split.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
        if needed > max_chars && line_len > 0 {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line_len += word.len();
        line.extend(word);
    }
    if line_len > 0 {
        lines.push(line);
    }
    lines
}

/// Top-down flow of content across letter pages.
struct Flow {
    pages: Vec<Page>,
    y: f32,
}

impl Flow {
    fn new() -> Self {
        Self {
            pages: vec![Page::letter()],
            y: LETTER_HEIGHT - MARGIN,
        }
    }

    fn content_width(&self) -> f32 {
        LETTER_WIDTH - 2.0 * MARGIN
    }

    fn current(&mut self) -> &mut Page {
        // `pages` starts non-empty and only grows.
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Page::letter());
        self.y = LETTER_HEIGHT - MARGIN;
    }

    /// Start a new page unless `height` still fits (or the page is empty).
    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN && !self.current().marks.is_empty() {
            self.new_page();
        }
    }

    fn line(&mut self, x: f32, text: String, face: Face, size: f32) {
        let advance = size * LEADING;
        self.ensure(advance);
        let y = self.y - size;
        if !text.is_empty() {
            self.current().marks.push(Mark::Text { x, y, text, face, size });
        }
        self.y -= advance;
    }

    fn paragraph(&mut self, indent: f32, text: &str, face: Face, size: f32) {
        let width = self.content_width() - indent;
        for l in wrap(text, face.chars_in(width, size)) {
            self.line(MARGIN + indent, l, face, size);
        }
        self.y -= BLOCK_GAP;
    }

    fn preformatted(&mut self, text: &str) {
        let max = Face::Mono.chars_in(self.content_width(), MONO_SIZE);
        for raw in text.lines() {
            let chars: Vec<char> = raw.chars().collect();
            if chars.is_empty() {
                self.line(MARGIN, String::new(), Face::Mono, MONO_SIZE);
                continue;
            }
            for chunk in chars.chunks(max) {
                self.line(MARGIN, chunk.iter().collect(), Face::Mono, MONO_SIZE);
            }
        }
        self.y -= BLOCK_GAP;
    }

    fn table(&mut self, rows: &[Vec<String>]) {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        if cols == 0 {
            return;
        }
        let col_width = self.content_width() / cols as f32;
        let xs: Vec<f32> = (0..=cols).map(|c| MARGIN + c as f32 * col_width).collect();
        let max_chars = Face::Regular.chars_in(col_width - 2.0 * CELL_PAD, TABLE_SIZE);
        let advance = TABLE_SIZE * LEADING;

        let mut segment: Vec<f32> = Vec::new();
        for row in rows {
            let wrapped: Vec<Vec<String>> = (0..cols)
                .map(|c| row.get(c).map(|cell| wrap(cell, max_chars)).unwrap_or_default())
                .collect();
            let lines = wrapped.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let height = lines as f32 * advance + 2.0 * CELL_PAD;

            if self.y - height < MARGIN && !self.current().marks.is_empty() {
                self.close_table_segment(&segment, &xs);
                segment.clear();
                self.new_page();
            }
            if segment.is_empty() {
                segment.push(self.y);
            }

            let top = self.y;
            for (c, cell_lines) in wrapped.into_iter().enumerate() {
                for (i, text) in cell_lines.into_iter().enumerate() {
                    let y = top - CELL_PAD - TABLE_SIZE - i as f32 * advance;
                    self.current().marks.push(Mark::Text {
                        x: xs[c] + CELL_PAD,
                        y,
                        text,
                        face: Face::Regular,
                        size: TABLE_SIZE,
                    });
                }
            }
            self.y -= height;
            segment.push(self.y);
        }
        self.close_table_segment(&segment, &xs);
        self.y -= BLOCK_GAP;
    }

    /// Rule the rows laid out on the current page.
    fn close_table_segment(&mut self, ys: &[f32], xs: &[f32]) {
        let (Some(&top), Some(&bottom)) = (ys.first(), ys.last()) else {
            return;
        };
        if ys.len() < 2 {
            return;
        }
        let (left, right) = (xs[0], xs[xs.len() - 1]);
        let page = self.current();
        for &y in ys {
            page.marks.push(Mark::Rule { x1: left, y1: y, x2: right, y2: y });
        }
        for &x in xs {
            page.marks.push(Mark::Rule { x1: x, y1: top, x2: x, y2: bottom });
        }
    }

    fn finish(self) -> Layout {
        Layout { pages: self.pages }
    }
}

fn heading_size(level: u8) -> f32 {
    match level {
        1 => 20.0,
        2 => 16.0,
        3 => 14.0,
        _ => 12.0,
    }
}

/// Flow blocks onto as many letter pages as they need.
pub fn layout_blocks(blocks: &[Block]) -> Layout {
    let mut flow = Flow::new();
    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                let size = heading_size(*level);
                flow.ensure(size * LEADING * 2.0);
                flow.paragraph(0.0, text, Face::Bold, size);
            }
            Block::Paragraph(text) => flow.paragraph(0.0, text, Face::Regular, BODY_SIZE),
            Block::ListItem(text) => flow.paragraph(12.0, &format!("- {text}"), Face::Regular, BODY_SIZE),
            Block::Preformatted(text) => flow.preformatted(text),
            Block::Table(rows) => flow.table(rows),
        }
    }
    flow.finish()
}

/// Lay out slides: each slide opens a fresh page headed `Slide N`; its
/// lines run down the page at fixed spacing and continue on a new page
/// when they reach the bottom margin.
pub fn layout_slides(slides: &[Vec<String>]) -> Layout {
    let mut pages: Vec<Page> = Vec::new();
    let top = LETTER_HEIGHT - MARGIN;

    for (i, lines) in slides.iter().enumerate() {
        let mut page = Page::letter();
        let mut y = top;
        page.marks.push(Mark::Text {
            x: MARGIN,
            y,
            text: format!("Slide {}", i + 1),
            face: Face::Regular,
            size: SLIDE_SIZE,
        });
        y -= SLIDE_TITLE_GAP;

        for line in lines {
            if y < MARGIN {
                pages.push(std::mem::replace(&mut page, Page::letter()));
                y = top;
            }
            let text: String = line.chars().take(SLIDE_MAX_CHARS).collect();
            if !text.trim().is_empty() {
                page.marks.push(Mark::Text {
                    x: MARGIN,
                    y,
                    text,
                    face: Face::Regular,
                    size: SLIDE_SIZE,
                });
            }
            y -= SLIDE_LINE_GAP;
        }
        pages.push(page);
    }

    if pages.is_empty() {
        pages.push(Page::letter());
    }
    Layout { pages }
}

/// Write a layout as a PDF at `path` (blocking).
pub fn write_pdf(layout: &Layout, path: &Path) -> Result<(), ConversionCause> {
    let pdfium = bind_pdfium().map_err(|e| ConversionCause::Pdfium(e.to_string()))?;
    let pdf_err = |e: PdfiumError| ConversionCause::Pdfium(format!("{e:?}"));

    let mut document = pdfium.create_new_pdf().map_err(pdf_err)?;
    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();
    let mono = document.fonts_mut().courier();

    for sheet in &layout.pages {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(
                PdfPoints::new(sheet.width),
                PdfPoints::new(sheet.height),
            ))
            .map_err(pdf_err)?;

        for mark in &sheet.marks {
            match mark {
                Mark::Text { x, y, text, face, size } => {
                    let font = match face {
                        Face::Regular => regular,
                        Face::Bold => bold,
                        Face::Mono => mono,
                    };
                    page.objects_mut()
                        .create_text_object(
                            PdfPoints::new(*x),
                            PdfPoints::new(*y),
                            text,
                            font,
                            PdfPoints::new(*size),
                        )
                        .map_err(pdf_err)?;
                }
                Mark::Rule { x1, y1, x2, y2 } => {
                    page.objects_mut()
                        .create_path_object_line(
                            PdfPoints::new(*x1),
                            PdfPoints::new(*y1),
                            PdfPoints::new(*x2),
                            PdfPoints::new(*y2),
                            PdfColor::new(0, 0, 0, 255),
                            PdfPoints::new(RULE_WIDTH),
                        )
                        .map_err(pdf_err)?;
                }
            }
        }
    }

    document.save_to_file(path).map_err(pdf_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(page: &Page) -> usize {
        page.marks.iter().filter(|m| matches!(m, Mark::Rule { .. })).count()
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        assert_eq!(wrap("the quick brown fox", 9), vec!["the quick", "brown fox"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("a abcdefgh", 4), vec!["a", "abcd", "efgh"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn empty_input_still_has_one_page() {
        assert_eq!(layout_blocks(&[]).pages.len(), 1);
        assert_eq!(layout_slides(&[]).pages.len(), 1);
    }

    #[test]
    fn long_content_flows_onto_more_pages() {
        let blocks: Vec<Block> = (0..200).map(|i| Block::Paragraph(format!("Paragraph {i}"))).collect();
        let layout = layout_blocks(&blocks);
        assert!(layout.pages.len() > 1);
        let all: Vec<&str> = layout.pages.iter().flat_map(Page::texts).collect();
        assert_eq!(all.first(), Some(&"Paragraph 0"));
        assert_eq!(all.last(), Some(&"Paragraph 199"));
        for page in &layout.pages {
            for mark in &page.marks {
                if let Mark::Text { y, .. } = mark {
                    assert!(*y >= MARGIN - BODY_SIZE, "text below the margin: {y}");
                }
            }
        }
    }

    #[test]
    fn table_is_fully_ruled() {
        let rows = vec![
            vec!["Name".to_string(), "Qty".to_string(), "Price".to_string()],
            vec!["Bolt".to_string(), "4".to_string(), "0.10".to_string()],
        ];
        let layout = layout_blocks(&[Block::Table(rows)]);
        let page = &layout.pages[0];
        // 3 horizontal boundaries, 4 vertical boundaries.
        assert_eq!(rules(page), 7);
        assert_eq!(page.texts().collect::<Vec<_>>(), vec!["Name", "Qty", "Price", "Bolt", "4", "0.10"]);
    }

    #[test]
    fn list_items_are_dashed() {
        let layout = layout_blocks(&[Block::ListItem("first".into())]);
        assert_eq!(layout.pages[0].texts().next(), Some("- first"));
    }

    #[test]
    fn each_slide_starts_a_page_with_its_number() {
        let layout = layout_slides(&[vec!["Intro".into()], vec!["Agenda".into(), "Q&A".into()]]);
        assert_eq!(layout.pages.len(), 2);
        assert_eq!(layout.pages[0].texts().collect::<Vec<_>>(), vec!["Slide 1", "Intro"]);
        assert_eq!(layout.pages[1].texts().collect::<Vec<_>>(), vec!["Slide 2", "Agenda", "Q&A"]);
        match &layout.pages[1].marks[0] {
            Mark::Text { x, y, .. } => assert_eq!((*x, *y), (MARGIN, LETTER_HEIGHT - MARGIN)),
            other => panic!("unexpected mark {other:?}"),
        }
    }

    #[test]
    fn slide_overflow_continues_on_new_page_and_next_slide_starts_fresh() {
        let many: Vec<String> = (0..60).map(|i| format!("line {i}")).collect();
        let layout = layout_slides(&[many, vec!["next".into()]]);
        // 60 lines at 15pt from 722 down to 40 fit 46 on the first page.
        assert_eq!(layout.pages.len(), 3);
        assert_eq!(layout.pages[0].texts().count(), 1 + 46);
        assert_eq!(layout.pages[1].texts().next(), Some("line 46"));
        assert_eq!(layout.pages[2].texts().collect::<Vec<_>>(), vec!["Slide 2", "next"]);
    }

    #[test]
    fn slide_lines_are_truncated() {
        let layout = layout_slides(&[vec!["x".repeat(250)]]);
        let line = layout.pages[0].texts().nth(1).unwrap();
        assert_eq!(line.chars().count(), 100);
    }
}
