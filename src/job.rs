//! One decode → blur → encode run over files

use std::path::Path;
use std::time::Instant;

use crate::codec;
use crate::error::BlurError;
use crate::pixels::PixelBuffer;

/// Decode `input`, run `blur` on it and encode the result to `output`.
///
/// `output` is only written after `blur` has returned a complete image.
pub fn blur_file(
    input: &Path,
    output: &Path,
    quality: u8,
    blur: impl FnOnce(&PixelBuffer) -> Result<PixelBuffer, BlurError>,
) -> Result<PixelBuffer, BlurError> {
    let image = codec::decode(input)?;
    log::info!("Decoded {} ({}x{})", input.display(), image.width(), image.height());

    let start = Instant::now();
    let blurred = blur(&image)?;
    log::info!("Blurred in {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);

    codec::encode(output, &blurred, quality)?;
    log::info!("Wrote {}", output.display());
    Ok(blurred)
}
