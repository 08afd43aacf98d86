use image::{ImageFormat, RgbaImage};

use crate::error::LoadError;
use crate::resources::extension;

/// Decodes image bytes into RGBA8.
///
/// The format is taken from `mime_type` when given, then from the reference's
/// extension, and finally guessed from the bytes.
pub fn decode_image(reference: &str, bytes: &[u8], mime_type: Option<&str>) -> Result<RgbaImage, LoadError> {
    let format = mime_type
        .and_then(ImageFormat::from_mime_type)
        .or_else(|| extension(reference).and_then(ImageFormat::from_extension));
    let decoded = match format {
        Some(format) => image::load_from_memory_with_format(bytes, format)
            .or_else(|_| image::load_from_memory(bytes)),
        None => image::load_from_memory(bytes),
    };
    decoded
        .map(|img| img.to_rgba8())
        .map_err(|e| LoadError::malformed(reference, e))
}
