//! Image encoding: `DynamicImage` → PNG bytes → base64 payloads.
//!
//! Extracted images are persisted and transported as PNG whatever their
//! original encoding inside the PDF: lossless, universally decodable, and
//! accepted by every vision provider. The same base64 string is embedded in
//! [`crate::output::ImageRecord`] and sent to the description service.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode an image.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} PNG bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Standard base64 of raw bytes.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Wrap image bytes for a vision request.
///
/// The MIME type is sniffed from the bytes; unknown payloads are sent as
/// PNG, which is what this crate writes.
pub fn image_data(bytes: &[u8]) -> ImageData {
    let mime = infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or("image/png");
    ImageData::new(to_base64(bytes), mime).with_detail("high")
}
