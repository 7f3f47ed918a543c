//! Image file decoding and encoding

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::BlurError;
use crate::pixels::PixelBuffer;

/// Default JPEG quality, on the usual 1-100 scale
pub const DEFAULT_QUALITY: u8 = 100;

/// Decode an image file into RGBA8 pixels
pub fn decode(path: &Path) -> Result<PixelBuffer, BlurError> {
    let decoded = image::open(path).map_err(|source| BlurError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    log::debug!("Decoded {} ({}x{})", path.display(), width, height);
    PixelBuffer::new(width, height, rgba.into_raw())
}

/// Encode pixels to `path`, picking the format from the file extension.
///
/// JPEG output drops the alpha channel and uses `quality`; other formats
/// ignore it. The whole file is encoded in memory and written in one call.
pub fn encode(path: &Path, pixels: &PixelBuffer, quality: u8) -> Result<(), BlurError> {
    let encode_err = |reason: String| BlurError::Encode {
        path: path.to_path_buf(),
        reason,
    };

    let format = ImageFormat::from_path(path).map_err(|e| encode_err(e.to_string()))?;
    let rgba = RgbaImage::from_raw(pixels.width(), pixels.height(), pixels.as_bytes().to_vec())
        .ok_or_else(|| encode_err("pixel buffer does not match its dimensions".into()))?;

    let mut bytes = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)
                .map_err(|e| encode_err(e.to_string()))?;
        }
        other => {
            rgba.write_to(&mut Cursor::new(&mut bytes), other)
                .map_err(|e| encode_err(e.to_string()))?;
        }
    }

    std::fs::write(path, &bytes).map_err(|e| encode_err(e.to_string()))?;
    log::debug!("Encoded {} ({} bytes, {:?})", path.display(), bytes.len(), format);
    Ok(())
}
