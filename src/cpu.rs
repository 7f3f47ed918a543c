//! Host-side reference blur
//!
//! Computes the same single-pass 2-D Gaussian as `shaders/blur.wgsl`
//! (point sampling, clamp-to-edge), one output row per rayon task.

use rayon::prelude::*;

use crate::kernel::{BlurParams, gaussian_weights};
use crate::pixels::{BYTES_PER_PIXEL, PixelBuffer};

/// Blur `input` on the CPU
pub fn blur(input: &PixelBuffer, params: BlurParams) -> PixelBuffer {
    let width = input.width() as i64;
    let height = input.height() as i64;
    let radius = params.radius as i64;
    let weights = gaussian_weights(params.radius, params.sigma);
    let src = input.as_bytes();
    let stride = input.stride() as usize;

    let mut out = input.clone();
    out.pixels_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..width {
            let mut acc = [0.0f32; 4];
            for dy in -radius..=radius {
                let sy = (y + dy).clamp(0, height - 1) as usize;
                let wy = weights[(dy + radius) as usize];
                for dx in -radius..=radius {
                    let sx = (x + dx).clamp(0, width - 1) as usize;
                    let w = wy * weights[(dx + radius) as usize];
                    let i = sy * stride + sx * BYTES_PER_PIXEL as usize;
                    for c in 0..4 {
                        acc[c] += src[i + c] as f32 * w;
                    }
                }
            }
            let o = x as usize * BYTES_PER_PIXEL as usize;
            for c in 0..4 {
                row[o + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    out
}

#[cfg(test)]
/// Population variance of one channel over the 3x3 window centered at (cx, cy)
pub fn window_variance(img: &PixelBuffer, cx: u32, cy: u32, channel: usize) -> f32 {
    let mut values = Vec::with_capacity(9);
    for y in cy - 1..=cy + 1 {
        for x in cx - 1..=cx + 1 {
            values.push(img.pixel(x, y)[channel] as f32);
        }
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / values.len() as f32
}

#[cfg(test)]
/// Alternating black and white pixels, white where `x + y` is even
pub fn checkerboard(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            [255, 255, 255, 255]
        } else {
            [0, 0, 0, 255]
        }
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(radius: u32, sigma: f32) -> BlurParams {
        BlurParams::new(radius, sigma).unwrap()
    }

    #[test]
    fn test_output_length() {
        for (w, h) in [(1, 1), (3, 7), (17, 5)] {
            let img = PixelBuffer::filled(w, h, [1, 2, 3, 4]).unwrap();
            let out = blur(&img, params(2, 1.0));
            assert_eq!(out.as_bytes().len(), (w * h * 4) as usize);
        }
    }

    #[test]
    fn test_uniform_image_stays_uniform() {
        let color = [37, 180, 99, 255];
        for (w, h, r, sigma) in [(4, 4, 1, 1.0), (9, 5, 3, 0.7), (6, 11, 8, 20.0)] {
            let img = PixelBuffer::filled(w, h, color).unwrap();
            let out = blur(&img, params(r, sigma));
            assert!(out.max_channel_diff(&img).unwrap() <= 1);
        }
    }

    #[test]
    fn test_radius_zero_is_identity() {
        let img = checkerboard(6, 6);
        assert_eq!(blur(&img, params(0, 5.0)), img);
        // All weight at offset 0
        assert!(blur(&img, params(4, 0.01)).max_channel_diff(&img).unwrap() <= 1);
    }

    #[test]
    fn test_single_pixel_unchanged() {
        let img = PixelBuffer::filled(1, 1, [255, 0, 0, 255]).unwrap();
        for (r, sigma) in [(1, 1.0), (50, 25.0)] {
            assert_eq!(blur(&img, params(r, sigma)).pixel(0, 0), [255, 0, 0, 255]);
        }
    }

    #[test]
    fn test_checkerboard_center_vs_corner() {
        let img = checkerboard(4, 4);
        let out = blur(&img, params(1, 1.0));

        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
            for c in 0..3 {
                let v = out.pixel(x, y)[c];
                assert!(v > 0 && v < 255, "center ({},{}) channel {} = {}", x, y, c, v);
            }
        }

        // Corners keep more of their original value than the center does
        let moved = |x, y| out.pixel(x, y)[0].abs_diff(img.pixel(x, y)[0]);
        for (cx, cy) in [(0, 0), (3, 0), (0, 3), (3, 3)] {
            assert!(moved(cx, cy) < moved(1, 1), "corner ({},{})", cx, cy);
        }
    }

    #[test]
    fn test_checkerboard_smooths_local_variance() {
        let img = checkerboard(8, 8);
        for (r, sigma) in [(1, 1.0), (2, 1.5), (3, 4.0)] {
            let out = blur(&img, params(r, sigma));
            for y in 1..7 {
                for x in 1..7 {
                    let before = window_variance(&img, x, y, 0);
                    let after = window_variance(&out, x, y, 0);
                    assert!(after <= before, "({},{}) {} > {}", x, y, after, before);
                }
            }
        }
    }
}
