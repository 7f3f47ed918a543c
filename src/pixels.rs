//! Tightly packed RGBA8 pixel storage

use crate::error::BlurError;

/// Bytes per RGBA8 pixel
pub const BYTES_PER_PIXEL: u32 = 4;

/// An RGBA8 image with rows packed back to back (no row padding).
///
/// `pixels.len()` is always `width * height * 4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw bytes, checking the dimensions against the byte count
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BlurError> {
        let expected = Self::byte_len(width, height)?;
        if pixels.len() != expected {
            return Err(BlurError::InvalidDimensions {
                width,
                height,
                reason: format!("expected {} bytes, got {}", expected, pixels.len()),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Byte length of a `width` x `height` image, rejecting empty or overflowing sizes
    pub fn byte_len(width: u32, height: u32) -> Result<usize, BlurError> {
        if width == 0 || height == 0 {
            return Err(BlurError::InvalidDimensions {
                width,
                height,
                reason: "width and height must be positive".into(),
            });
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(BYTES_PER_PIXEL as usize))
            .ok_or_else(|| BlurError::InvalidDimensions {
                width,
                height,
                reason: "byte size overflows".into(),
            })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes
    pub fn stride(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable access to the bytes; the length cannot change through it
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Largest absolute per-channel difference between two equally sized images
    pub fn max_channel_diff(&self, other: &PixelBuffer) -> Option<u8> {
        if self.width != other.width || self.height != other.height {
            return None;
        }
        self.pixels
            .iter()
            .zip(&other.pixels)
            .map(|(a, b)| a.abs_diff(*b))
            .max()
    }
}

// Image builders and accessors used by the tests
#[cfg(test)]
impl PixelBuffer {
    /// An image where every pixel has the same color
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Result<Self, BlurError> {
        let len = Self::byte_len(width, height)?;
        let pixels = color.iter().copied().cycle().take(len).collect();
        Ok(Self { width, height, pixels })
    }

    /// Build an image by evaluating `f(x, y)` for every pixel
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, BlurError> {
        let len = Self::byte_len(width, height)?;
        let mut pixels = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Ok(Self { width, height, pixels })
    }

    /// Pixel at (x, y). Panics when out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * BYTES_PER_PIXEL) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}
