//! Embedded raster image extraction.
//!
//! Two phases:
//!
//! 1. **Collect** (blocking, pdfium): walk every page's image objects,
//!    decode them, drop anything below the noise floor and PNG-encode the
//!    rest. `index` is the 1-based position among the page's image objects
//!    and is assigned before filtering, so file names stay stable when a
//!    neighbouring image is dropped.
//! 2. **Persist and describe** (async): write `image_p{page}_{index}.png`,
//!    then describe with bounded concurrency and restore `(page, index)`
//!    order.
//!
//! A failing image is isolated and skipped; a document that cannot be
//! opened yields no images.

use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::{Isolated, Unit};
use crate::output::{round2, ImageRecord};
use crate::pipeline::describe::DescriptionService;
use crate::pipeline::encode;
use crate::pipeline::engine::bind_pdfium;
use crate::pipeline::isolate::{isolate, isolate_async};
use futures::stream::{self, StreamExt};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A decoded image that passed the size filter, not yet persisted.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub page: usize,
    pub index: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Whether an image is large enough to keep.
pub fn retain(width: u32, height: u32, min_dimension: u32) -> bool {
    width >= min_dimension && height >= min_dimension
}

/// File name of a persisted image.
pub fn image_filename(page: usize, index: usize) -> String {
    format!("image_p{page}_{index}.png")
}

/// Extract, persist and describe every retained image of the document.
pub async fn extract_images(
    ctx: &IngestContext,
    pdf_path: &Path,
    config: &IngestConfig,
    service: &DescriptionService,
) -> (Vec<ImageRecord>, Vec<Isolated>) {
    let path = pdf_path.to_path_buf();
    let min_dimension = config.min_image_dimension;
    let task_ctx = ctx.clone();
    let (raw, mut degraded) =
        match tokio::task::spawn_blocking(move || collect_images_blocking(&task_ctx, &path, min_dimension)).await {
            Ok(collected) => collected,
            Err(e) => {
                warn!(request_id = %ctx.request_id(), "image task failed: {e}");
                return (Vec::new(), Vec::new());
            }
        };

    let (records, persist_degraded) = persist_and_describe(ctx, raw, config, service).await;
    degraded.extend(persist_degraded);
    info!(request_id = %ctx.request_id(), "Extracted {} images", records.len());
    (records, degraded)
}

/// Blocking collection of decoded, size-filtered, PNG-encoded images.
pub fn collect_images_blocking(
    ctx: &IngestContext,
    pdf_path: &Path,
    min_dimension: u32,
) -> (Vec<RawImage>, Vec<Isolated>) {
    let mut images = Vec::new();
    let mut degraded = Vec::new();

    let pdfium = match bind_pdfium() {
        Ok(p) => p,
        Err(e) => {
            warn!(request_id = %ctx.request_id(), "Cannot extract images: {e}");
            return (images, degraded);
        }
    };
    let document = match pdfium.load_pdf_from_file(pdf_path, None) {
        Ok(d) => d,
        Err(e) => {
            warn!(request_id = %ctx.request_id(), "Cannot open PDF for image extraction: {e:?}");
            return (images, degraded);
        }
    };

    for (page_idx, page) in document.pages().iter().enumerate() {
        let page_number = page_idx + 1;
        let image_objects = page
            .objects()
            .iter()
            .filter(|object| object.as_image_object().is_some());

        for (obj_idx, object) in image_objects.enumerate() {
            let index = obj_idx + 1;
            let unit = Unit::Image { page: page_number, index };
            let decoded = isolate(ctx, unit, || -> Result<Option<RawImage>, String> {
                let Some(image_object) = object.as_image_object() else {
                    return Ok(None);
                };
                let img = image_object
                    .get_raw_image()
                    .map_err(|e| format!("decode failed: {e:?}"))?;
                let (width, height) = (img.width(), img.height());
                if !retain(width, height, min_dimension) {
                    debug!(page = page_number, index, width, height, "image below size floor");
                    return Ok(None);
                }
                let png = encode::encode_png(&img).map_err(|e| format!("PNG encoding failed: {e}"))?;
                Ok(Some(RawImage {
                    page: page_number,
                    index,
                    png,
                    width,
                    height,
                }))
            });
            match decoded {
                Ok(Some(raw)) => images.push(raw),
                Ok(None) => {}
                Err(isolated) => degraded.push(isolated),
            }
        }
    }

    (images, degraded)
}

struct Persisted {
    raw: RawImage,
    filename: String,
    path: PathBuf,
}

/// Write each image to `extract_dir`, then describe the ones that landed.
pub async fn persist_and_describe(
    ctx: &IngestContext,
    raw: Vec<RawImage>,
    config: &IngestConfig,
    service: &DescriptionService,
) -> (Vec<ImageRecord>, Vec<Isolated>) {
    let mut degraded = Vec::new();
    if raw.is_empty() {
        return (Vec::new(), degraded);
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.extract_dir).await {
        warn!(
            request_id = %ctx.request_id(),
            dir = %config.extract_dir.display(),
            "cannot create extract directory: {e}"
        );
    }

    let mut persisted = Vec::with_capacity(raw.len());
    for image in raw {
        let filename = image_filename(image.page, image.index);
        let path = config.extract_dir.join(&filename);
        let unit = Unit::Image {
            page: image.page,
            index: image.index,
        };
        match isolate_async(ctx, unit, tokio::fs::write(&path, &image.png)).await {
            Ok(()) => persisted.push(Persisted {
                raw: image,
                filename,
                path,
            }),
            Err(isolated) => degraded.push(isolated),
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_images_found(persisted.len());
    }

    let mut records: Vec<ImageRecord> = stream::iter(persisted.into_iter().map(|p| async move {
        debug!(request_id = %ctx.request_id(), "Describing image: {}", p.filename);
        let description = service.describe(&p.path, &p.raw.png).await;
        if let Some(ref cb) = config.progress_callback {
            cb.on_image_described(p.raw.page, p.raw.index);
        }
        ImageRecord {
            page_number: p.raw.page,
            index: p.raw.index,
            base64: encode::to_base64(&p.raw.png),
            size_kb: round2(p.raw.png.len() as f64 / 1024.0),
            width: p.raw.width,
            height: p.raw.height,
            filename: p.filename,
            path: p.path,
            description,
        }
    }))
    .buffer_unordered(config.describe_concurrency.max(1))
    .collect()
    .await;

    records.sort_by_key(|r| (r.page_number, r.index));
    (records, degraded)
}
