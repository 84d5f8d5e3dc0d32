//! Pure raster encode/decode logic. Functional core.
//!
//! This module has zero infrastructure dependencies.
//! It takes pixel data in, returns pixel data out.

use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Encodes an RGBA raster as PNG bytes.
///
/// This is a pure function with no side effects. Used once per captured
/// frame and once per finished composite.
pub fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    if raster.width() == 0 || raster.height() == 0 {
        return Err(RasterError::ZeroDimension);
    }

    let mut png_bytes: Vec<u8> = Vec::new();
    raster
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| RasterError::EncodingFailed(e.to_string()))?;

    Ok(png_bytes)
}

/// Decodes an encoded frame payload into RGBA pixels.
///
/// The format is sniffed from the payload, so anything `image` understands
/// is accepted, not just PNG.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, RasterError> {
    let decoded: DynamicImage = image::load_from_memory(bytes)
        .map_err(|e| RasterError::DecodingFailed(e.to_string()))?;
    Ok(decoded.to_rgba8())
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("Raster has zero width or height")]
    ZeroDimension,

    #[error("PNG encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Image decoding failed: {0}")]
    DecodingFailed(String),
}
