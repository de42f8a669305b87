//! Lattice table detection.
//!
//! Tables are recovered from ruling lines, not from text alignment:
//!
//! 1. thin path objects (and the four edges of rectangle paths) become
//!    horizontal or vertical [`Ruling`]s;
//! 2. rulings that touch are grouped with union-find; a group with at least
//!    two rulings in each direction is a [`Grid`];
//! 3. consecutive boundaries define cells, whose text is read from the page;
//! 4. the grid is cleaned and kept when it passes [`accepts`].
//!
//! Geometry is in PDF points with the origin at the bottom-left corner.

use crate::config::{PageSelection, TableThresholds};
use crate::context::IngestContext;
use crate::error::{Isolated, Unit};
use crate::output::{round2, TableRecord};
use crate::pipeline::engine::bind_pdfium;
use crate::pipeline::isolate::isolate;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Maximum thickness of a ruling, points.
pub const MAX_RULING_THICKNESS: f32 = 2.0;
/// Minimum length of a ruling, points.
pub const MIN_RULING_LENGTH: f32 = 4.0;
/// Coordinates closer than this are the same boundary.
pub const SNAP_TOLERANCE: f32 = 2.0;

/// Axis-aligned rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    fn center(&self) -> (f32, f32) {
        ((self.left + self.right) / 2.0, (self.bottom + self.top) / 2.0)
    }

    fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.bottom && y <= self.top
    }

    fn contains_rect(&self, other: &Rect, tolerance: f32) -> bool {
        other.left >= self.left - tolerance
            && other.right <= self.right + tolerance
            && other.bottom >= self.bottom - tolerance
            && other.top <= self.top + tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A ruling line: `pos` is y for horizontal rulings and x for vertical ones;
/// `start..=end` spans the other axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ruling {
    pub orientation: Orientation,
    pub pos: f32,
    pub start: f32,
    pub end: f32,
}

impl Ruling {
    fn touches(&self, other: &Ruling, tol: f32) -> bool {
        if self.orientation == other.orientation {
            // Collinear pieces of the same line belong together.
            (self.pos - other.pos).abs() <= tol
                && self.start <= other.end + tol
                && other.start <= self.end + tol
        } else {
            other.pos >= self.start - tol
                && other.pos <= self.end + tol
                && self.pos >= other.start - tol
                && self.pos <= other.end + tol
        }
    }
}

/// Turn path-object bounding boxes into rulings.
///
/// Thin boxes are lines; anything larger in both directions is treated as a
/// rectangle and contributes its four edges.
pub fn rulings_from_boxes(boxes: &[Rect]) -> Vec<Ruling> {
    let mut rulings = Vec::new();
    for b in boxes {
        let (w, h) = (b.width(), b.height());
        if h <= MAX_RULING_THICKNESS && w >= MIN_RULING_LENGTH {
            rulings.push(Ruling {
                orientation: Orientation::Horizontal,
                pos: (b.bottom + b.top) / 2.0,
                start: b.left,
                end: b.right,
            });
        } else if w <= MAX_RULING_THICKNESS && h >= MIN_RULING_LENGTH {
            rulings.push(Ruling {
                orientation: Orientation::Vertical,
                pos: (b.left + b.right) / 2.0,
                start: b.bottom,
                end: b.top,
            });
        } else if w >= MIN_RULING_LENGTH && h >= MIN_RULING_LENGTH {
            for pos in [b.bottom, b.top] {
                rulings.push(Ruling {
                    orientation: Orientation::Horizontal,
                    pos,
                    start: b.left,
                    end: b.right,
                });
            }
            for pos in [b.left, b.right] {
                rulings.push(Ruling {
                    orientation: Orientation::Vertical,
                    pos,
                    start: b.bottom,
                    end: b.top,
                });
            }
        }
    }
    rulings
}

/// A lattice: column boundaries left to right, row boundaries top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub xs: Vec<f32>,
    pub ys: Vec<f32>,
}

impl Grid {
    pub fn rows(&self) -> usize {
        self.ys.len().saturating_sub(1)
    }

    pub fn cols(&self) -> usize {
        self.xs.len().saturating_sub(1)
    }

    pub fn bounds(&self) -> Rect {
        let first = |v: &[f32]| v.first().copied().unwrap_or(0.0);
        let last = |v: &[f32]| v.last().copied().unwrap_or(0.0);
        Rect::new(first(&self.xs), last(&self.ys), last(&self.xs), first(&self.ys))
    }

    /// Cell at `(row, col)`, rows counted from the top.
    pub fn cell(&self, row: usize, col: usize) -> Rect {
        Rect::new(self.xs[col], self.ys[row + 1], self.xs[col + 1], self.ys[row])
    }

    fn cells(&self) -> impl Iterator<Item = Rect> + '_ {
        (0..self.rows()).flat_map(move |r| (0..self.cols()).map(move |c| self.cell(r, c)))
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Merge values closer than `tol` into one boundary (their mean).
fn snap(mut values: Vec<f32>, tol: f32) -> Vec<f32> {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for v in values {
        match clusters.last_mut() {
            Some(cluster) if cluster.last().is_some_and(|last| v - last <= tol) => cluster.push(v),
            _ => clusters.push(vec![v]),
        }
    }
    clusters
        .into_iter()
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

/// Group touching rulings and keep the groups that form a lattice.
///
/// Grids come back ordered top to bottom, then left to right.
pub fn find_grids(rulings: &[Ruling]) -> Vec<Grid> {
    let mut uf = UnionFind::new(rulings.len());
    for i in 0..rulings.len() {
        for j in (i + 1)..rulings.len() {
            if rulings[i].touches(&rulings[j], SNAP_TOLERANCE) {
                uf.union(i, j);
            }
        }
    }

    let mut groups: std::collections::BTreeMap<usize, Vec<&Ruling>> = Default::default();
    for (i, ruling) in rulings.iter().enumerate() {
        groups.entry(uf.find(i)).or_default().push(ruling);
    }

    let mut grids: Vec<Grid> = groups
        .into_values()
        .filter_map(|group| {
            let positions = |o: Orientation| -> Vec<f32> {
                group.iter().filter(|r| r.orientation == o).map(|r| r.pos).collect()
            };
            let xs = snap(positions(Orientation::Vertical), SNAP_TOLERANCE);
            let mut ys = snap(positions(Orientation::Horizontal), SNAP_TOLERANCE);
            ys.reverse();
            (xs.len() >= 2 && ys.len() >= 2).then_some(Grid { xs, ys })
        })
        .collect();

    grids.sort_by(|a, b| {
        let (ba, bb) = (a.bounds(), b.bounds());
        bb.top.total_cmp(&ba.top).then(ba.left.total_cmp(&bb.left))
    });
    grids
}

/// Read each cell's text; line breaks become spaces.
pub fn grid_cells(grid: &Grid, mut text_in: impl FnMut(Rect) -> String) -> Vec<Vec<String>> {
    (0..grid.rows())
        .map(|r| {
            (0..grid.cols())
                .map(|c| text_in(grid.cell(r, c)).replace(['\r', '\n'], " "))
                .collect()
        })
        .collect()
}

/// Share of text segments inside the grid that sit entirely in one cell,
/// as a percentage. A grid holding no text scores 0.
pub fn accuracy(grid: &Grid, segments: &[Rect]) -> f64 {
    let bounds = grid.bounds();
    let inside: Vec<&Rect> = segments
        .iter()
        .filter(|s| {
            let (x, y) = s.center();
            bounds.contains_point(x, y)
        })
        .collect();
    if inside.is_empty() {
        return 0.0;
    }
    let contained = inside
        .iter()
        .filter(|s| grid.cells().any(|cell| cell.contains_rect(s, 1.0)))
        .count();
    100.0 * contained as f64 / inside.len() as f64
}

/// Cleaned cell data and its fill ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedGrid {
    pub data: Vec<Vec<String>>,
    pub content_ratio: f64,
}

impl CleanedGrid {
    pub fn shape(&self) -> (usize, usize) {
        (self.data.len(), self.data.first().map_or(0, Vec::len))
    }
}

/// Trim cells, drop empty rows and columns, reject anything under 2×2.
pub fn clean_grid(cells: &[Vec<String>]) -> Option<CleanedGrid> {
    let mut rows: Vec<Vec<String>> = cells
        .iter()
        .map(|row| row.iter().map(|c| c.trim().to_string()).collect())
        .filter(|row: &Vec<String>| row.iter().any(|c| !c.is_empty()))
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in rows.iter_mut() {
        row.resize(width, String::new());
    }
    let keep: Vec<usize> = (0..width)
        .filter(|&c| rows.iter().any(|row| !row[c].is_empty()))
        .collect();
    let mut data: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| keep.iter().map(|&c| row[c].clone()).collect())
        .collect();
    data.retain(|row: &Vec<String>| row.iter().any(|c| !c.is_empty()));

    if data.len() < 2 || keep.len() < 2 {
        return None;
    }

    let total = data.len() * keep.len();
    let non_empty = data.iter().flatten().filter(|c| !c.is_empty()).count();
    Some(CleanedGrid {
        data,
        content_ratio: non_empty as f64 / total as f64,
    })
}

/// Keep a cleaned grid when it is at least 2×2 and either threshold is beaten.
pub fn accepts(accuracy: f64, content_ratio: f64, shape: (usize, usize), thresholds: &TableThresholds) -> bool {
    shape.0 >= 2
        && shape.1 >= 2
        && (content_ratio > thresholds.min_content_ratio || accuracy > thresholds.min_accuracy)
}

/// A grid as read from one page, before cleaning.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub id: usize,
    pub page: usize,
    pub cells: Vec<Vec<String>>,
    pub accuracy: f64,
}

/// Clean and filter raw grids into table records.
pub fn build_records(
    ctx: &IngestContext,
    raw: Vec<RawTable>,
    thresholds: &TableThresholds,
) -> (Vec<TableRecord>, Vec<Isolated>) {
    let mut records = Vec::new();
    let mut degraded = Vec::new();

    for table in raw {
        let outcome = isolate(ctx, Unit::Table { id: table.id }, || {
            Ok::<_, String>(clean_grid(&table.cells))
        });
        let cleaned = match outcome {
            Ok(Some(c)) => c,
            Ok(None) => {
                debug!(table_id = table.id, "grid too small after cleaning");
                continue;
            }
            Err(isolated) => {
                degraded.push(isolated);
                continue;
            }
        };

        let shape = cleaned.shape();
        if !accepts(table.accuracy, cleaned.content_ratio, shape, thresholds) {
            debug!(
                table_id = table.id,
                accuracy = table.accuracy,
                content_ratio = cleaned.content_ratio,
                "table rejected"
            );
            continue;
        }

        records.push(TableRecord {
            table_id: table.id,
            page_number: table.page,
            accuracy: round2(table.accuracy),
            content_ratio: round2(cleaned.content_ratio),
            shape,
            json: TableRecord::records_json(&cleaned.data),
            data: cleaned.data,
        });
    }

    (records, degraded)
}

/// Detect tables on the selected pages of the document.
pub async fn extract_tables(
    ctx: &IngestContext,
    pdf_path: &Path,
    pages: &PageSelection,
    thresholds: TableThresholds,
) -> (Vec<TableRecord>, Vec<Isolated>) {
    let path = pdf_path.to_path_buf();
    let selection = pages.clone();
    let task_ctx = ctx.clone();
    let result = tokio::task::spawn_blocking(move || {
        let (raw, mut degraded) = detect_blocking(&task_ctx, &path, &selection);
        let (records, clean_degraded) = build_records(&task_ctx, raw, &thresholds);
        degraded.extend(clean_degraded);
        (records, degraded)
    })
    .await;

    match result {
        Ok((records, degraded)) => {
            info!(request_id = %ctx.request_id(), "Extracted {} tables from PDF", records.len());
            (records, degraded)
        }
        Err(e) => {
            warn!(request_id = %ctx.request_id(), "table task failed: {e}");
            (Vec::new(), Vec::new())
        }
    }
}

/// Blocking grid detection over the selected pages.
pub fn detect_blocking(
    ctx: &IngestContext,
    pdf_path: &Path,
    selection: &PageSelection,
) -> (Vec<RawTable>, Vec<Isolated>) {
    let mut tables = Vec::new();
    let mut degraded = Vec::new();

    let pdfium = match bind_pdfium() {
        Ok(p) => p,
        Err(e) => {
            warn!(request_id = %ctx.request_id(), "Cannot detect tables: {e}");
            return (tables, degraded);
        }
    };
    let document = match pdfium.load_pdf_from_file(pdf_path, None) {
        Ok(d) => d,
        Err(e) => {
            warn!(request_id = %ctx.request_id(), "Cannot open PDF for table extraction: {e:?}");
            return (tables, degraded);
        }
    };

    let pages = document.pages();
    let wanted = selection.to_indices(pages.len() as usize);
    let mut next_id = 0usize;

    for (idx, page) in pages.iter().enumerate() {
        if wanted.binary_search(&idx).is_err() {
            continue;
        }
        let page_number = idx + 1;
        match isolate(ctx, Unit::TablePage { page: page_number }, || read_page_grids(&page)) {
            Ok(found) => {
                for (cells, accuracy) in found {
                    tables.push(RawTable {
                        id: next_id,
                        page: page_number,
                        cells,
                        accuracy,
                    });
                    next_id += 1;
                }
            }
            Err(isolated) => degraded.push(isolated),
        }
    }

    (tables, degraded)
}

fn to_rect(left: PdfPoints, bottom: PdfPoints, right: PdfPoints, top: PdfPoints) -> Rect {
    Rect::new(left.value, bottom.value, right.value, top.value)
}

fn read_page_grids(page: &PdfPage) -> Result<Vec<(Vec<Vec<String>>, f64)>, String> {
    let boxes: Vec<Rect> = page
        .objects()
        .iter()
        .filter(|object| object.as_path_object().is_some())
        .filter_map(|object| object.bounds().ok())
        .map(|b| to_rect(b.left(), b.bottom(), b.right(), b.top()))
        .collect();

    let grids = find_grids(&rulings_from_boxes(&boxes));
    if grids.is_empty() {
        return Ok(Vec::new());
    }

    let text = page.text().map_err(|e| format!("text layer unavailable: {e:?}"))?;
    let segments: Vec<Rect> = text
        .segments()
        .iter()
        .filter(|s| !s.text().trim().is_empty())
        .map(|s| {
            let b = s.bounds();
            to_rect(b.left(), b.bottom(), b.right(), b.top())
        })
        .collect();

    Ok(grids
        .iter()
        .map(|grid| {
            let cells = grid_cells(grid, |cell| {
                text.inside_rect(PdfRect::new_from_values(cell.bottom, cell.left, cell.top, cell.right))
            });
            (cells, accuracy(grid, &segments))
        })
        .collect())
}
