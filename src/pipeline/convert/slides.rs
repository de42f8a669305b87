//! Presentation (`.pptx`) → PDF.
//!
//! Only text is carried over. Slides are read in deck order from
//! `ppt/presentation.xml` (falling back to `slideN.xml` numbering when the
//! deck lists none). Every text body on a slide (shape or table cell) is
//! one block, and each of its `a:p` paragraphs is one line.

use super::layout::{layout_slides, write_pdf};
use super::{write_staged, Converter};
use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::{ConversionCause, ConversionError};
use crate::pipeline::input::file_base_name;
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

const PRESENTATION: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

pub struct SlidesConverter {
    path: PathBuf,
    output_dir: PathBuf,
}

impl SlidesConverter {
    pub fn new(path: &Path, config: &IngestConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            output_dir: config.output_dir.clone(),
        }
    }
}

#[async_trait]
impl Converter for SlidesConverter {
    async fn convert(&self, ctx: &IngestContext) -> Result<PathBuf, ConversionError> {
        debug!(request_id = %ctx.request_id(), "Converting presentation {}", self.path.display());
        let source = self.path.clone();
        write_staged(
            &self.path.display().to_string(),
            &self.output_dir,
            &file_base_name(&self.path),
            move |out| {
                let file = std::fs::File::open(&source)?;
                let slides = read_slides(file)?;
                debug!("Read {} slides from {}", slides.len(), source.display());
                write_pdf(&layout_slides(&slides), out)
            },
        )
        .await
    }
}

fn malformed(e: impl std::fmt::Display) -> ConversionCause {
    ConversionCause::Presentation(e.to_string())
}

/// Text lines of every slide, in deck order. Shapes without visible text
/// contribute nothing.
pub fn read_slides<R: Read + Seek>(reader: R) -> Result<Vec<Vec<String>>, ConversionCause> {
    let mut archive = ZipArchive::new(reader).map_err(malformed)?;
    let presentation = read_part(&mut archive, PRESENTATION)?;

    let mut parts = deck_order(&presentation, &mut archive)?;
    if parts.is_empty() {
        parts = numbered_slides(&archive);
    }

    parts
        .iter()
        .map(|part| {
            let xml = read_part(&mut archive, part)?;
            slide_lines(&xml)
        })
        .collect()
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, ConversionCause> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| malformed(format!("{name}: {e}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| malformed(format!("{name}: {e}")))?;
    Ok(xml)
}

/// Slide part names in the order `p:sldIdLst` lists them.
fn deck_order<R: Read + Seek>(
    presentation: &str,
    archive: &mut ZipArchive<R>,
) -> Result<Vec<String>, ConversionCause> {
    let ids = slide_rel_ids(presentation)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rels = relationships(&read_part(archive, PRESENTATION_RELS)?)?;
    ids.iter()
        .map(|id| {
            rels.get(id)
                .map(|target| resolve_target(target))
                .ok_or_else(|| malformed(format!("slide relationship {id} is missing")))
        })
        .collect()
}

/// `ppt/slides/slideN.xml` entries sorted by N.
fn numbered_slides<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    numbered.sort();
    numbered.into_iter().map(|(_, name)| name).collect()
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

fn attr(e: &BytesStart<'_>, prefixed: bool, local: &[u8]) -> Result<Option<String>, ConversionCause> {
    for a in e.attributes() {
        let a = a.map_err(malformed)?;
        if a.key.local_name().as_ref() == local && a.key.prefix().is_some() == prefixed {
            return Ok(Some(a.unescape_value().map_err(malformed)?.into_owned()));
        }
    }
    Ok(None)
}

/// `r:id` of each `p:sldId`, in order.
fn slide_rel_ids(presentation: &str) -> Result<Vec<String>, ConversionCause> {
    let mut reader = Reader::from_str(presentation);
    let mut ids = Vec::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                if let Some(id) = attr(&e, true, b"id")? {
                    ids.push(id);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(ids)
}

/// `Id → Target` of a relationships part.
fn relationships(rels: &str) -> Result<HashMap<String, String>, ConversionCause> {
    let mut reader = Reader::from_str(rels);
    let mut map = HashMap::new();
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, false, b"Id")?, attr(&e, false, b"Target")?) {
                    map.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(map)
}

/// Lines of one slide: each text body's paragraphs, skipping bodies whose
/// text is blank. `a:br` breaks a paragraph into separate lines.
pub fn slide_lines(xml: &str) -> Result<Vec<String>, ConversionCause> {
    let mut reader = Reader::from_str(xml);
    let mut lines = Vec::new();
    let mut shape: Option<Vec<String>> = None;
    let mut paragraph = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"txBody" => shape = Some(Vec::new()),
                b"p" => paragraph.clear(),
                b"t" => in_run_text = true,
                _ => {}
            },
            Event::Empty(e) => match (e.local_name().as_ref(), shape.as_mut()) {
                (b"p", Some(body)) => body.push(String::new()),
                (b"br", Some(body)) => body.push(std::mem::take(&mut paragraph)),
                _ => {}
            },
            Event::Text(t) if in_run_text && shape.is_some() => {
                paragraph.push_str(&t.unescape().map_err(malformed)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => {
                    if let Some(body) = shape.as_mut() {
                        body.push(std::mem::take(&mut paragraph));
                    }
                }
                b"txBody" => {
                    if let Some(body) = shape.take() {
                        if body.iter().any(|l| !l.trim().is_empty()) {
                            lines.extend(body);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines)
}
