//! Decode and encode glue over the `image` crate

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};

use crate::error::{Result, RescaleError};
use crate::processing::resize::ResizedImage;

/// Source extensions picked up by the locator (matched case-sensitively)
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Extension of every produced file
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Check if a file extension is a supported input extension
pub fn is_supported_input_extension(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension)
}

/// Detect PNG or JPEG content from its magic bytes
pub fn detect_format_from_header(data: &[u8]) -> Option<ImageFormat> {
    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageFormat::Png);
    }

    None
}

/// Decode source bytes into a pixel buffer.
///
/// The format comes from the content, not the extension, so a PNG saved
/// as `.jpg` still decodes.
pub fn decode(path: &Path, data: &[u8]) -> Result<DynamicImage> {
    let format = detect_format_from_header(data)
        .ok_or_else(|| RescaleError::decode(path, "content is neither PNG nor JPEG"))?;

    image::load_from_memory_with_format(data, format)
        .map_err(|e| RescaleError::decode(path, e))
}

/// Encode a resized buffer as baseline JPEG
pub fn encode_jpeg(path: &Path, image: &ResizedImage, quality: u8) -> Result<Vec<u8>> {
    let pixels = image.as_rgb();
    let mut bytes = Vec::with_capacity(pixels.as_raw().len() / 8);

    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode(pixels.as_raw(), pixels.width(), pixels.height(), ColorType::Rgb8)
        .map_err(|e| RescaleError::encode(path, e))?;

    Ok(bytes)
}
