//! Image → one-page PDF.

use super::{write_staged, Converter};
use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::error::{ConversionCause, ConversionError};
use crate::pipeline::engine::bind_pdfium;
use crate::pipeline::input::file_base_name;
use ::image::{DynamicImage, ImageReader};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ImageConverter {
    path: PathBuf,
    output_dir: PathBuf,
    dpi: f32,
}

impl ImageConverter {
    pub fn new(path: &Path, config: &IngestConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            output_dir: config.output_dir.clone(),
            dpi: config.image_dpi,
        }
    }
}

#[async_trait]
impl Converter for ImageConverter {
    async fn convert(&self, ctx: &IngestContext) -> Result<PathBuf, ConversionError> {
        debug!(request_id = %ctx.request_id(), "Converting image {}", self.path.display());
        let source = self.path.clone();
        let dpi = self.dpi;
        write_staged(
            &self.path.display().to_string(),
            &self.output_dir,
            &file_base_name(&self.path),
            move |out| image_to_pdf(&source, out, dpi),
        )
        .await
    }
}

/// Page size in points for an image printed at `dpi`.
pub fn page_size(width_px: u32, height_px: u32, dpi: f32) -> (f32, f32) {
    (width_px as f32 * 72.0 / dpi, height_px as f32 * 72.0 / dpi)
}

/// Decode with content sniffing so a mislabelled extension still works.
pub fn load_rgb(source: &Path) -> Result<DynamicImage, ConversionCause> {
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;
    Ok(match img {
        DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    })
}

fn image_to_pdf(source: &Path, out: &Path, dpi: f32) -> Result<(), ConversionCause> {
    let img = load_rgb(source)?;
    let (width, height) = page_size(img.width(), img.height(), dpi);

    let pdfium = bind_pdfium().map_err(|e| ConversionCause::Pdfium(e.to_string()))?;
    let pdf_err = |e: PdfiumError| ConversionCause::Pdfium(format!("{e:?}"));

    let mut document = pdfium.create_new_pdf().map_err(pdf_err)?;
    let mut page = document
        .pages_mut()
        .create_page_at_end(PdfPagePaperSize::Custom(PdfPoints::new(width), PdfPoints::new(height)))
        .map_err(pdf_err)?;
    page.objects_mut()
        .create_image_object(
            PdfPoints::ZERO,
            PdfPoints::ZERO,
            &img,
            Some(PdfPoints::new(width)),
            Some(PdfPoints::new(height)),
        )
        .map_err(pdf_err)?;
    document.save_to_file(out).map_err(pdf_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{GrayImage, Luma, RgbaImage, Rgba};

    #[test]
    fn page_size_follows_resolution() {
        assert_eq!(page_size(100, 200, 100.0), (72.0, 144.0));
        assert_eq!(page_size(300, 300, 300.0), (72.0, 72.0));
    }

    #[test]
    fn non_rgb_images_are_converted() {
        let dir = tempfile::tempdir().unwrap();
        let gray = dir.path().join("gray.png");
        GrayImage::from_pixel(8, 4, Luma([7])).save(&gray).unwrap();
        let rgba = dir.path().join("alpha.png");
        RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4])).save(&rgba).unwrap();

        for path in [gray, rgba] {
            let img = load_rgb(&path).unwrap();
            assert!(matches!(img, DynamicImage::ImageRgb8(_)));
        }
    }

    #[test]
    fn content_sniffing_ignores_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("scan.png");
        GrayImage::from_pixel(5, 6, Luma([0])).save(&png).unwrap();
        let renamed = dir.path().join("scan.dat");
        std::fs::rename(&png, &renamed).unwrap();
        let img = load_rgb(&renamed).unwrap();
        assert_eq!((img.width(), img.height()), (5, 6));
    }

    #[tokio::test]
    async fn undecodable_image_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"definitely not a png").unwrap();
        let out = dir.path().join("assets");
        let config = IngestConfig::builder().output_dir(&out).build().unwrap();

        let err = ImageConverter::new(&src, &config)
            .convert(&IngestContext::new(None))
            .await
            .unwrap_err();
        assert!(matches!(err.cause, ConversionCause::Image(_)), "got {err}");
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }
}
