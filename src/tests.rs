//! End-to-end tests for the GPU blur
//!
//! Every test that needs a device skips itself when no adapter is available.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::cpu;
use crate::error::{BlurError, ErrorKind};
use crate::gpu::fence::Fence;
use crate::gpu::readback;
use crate::gpu::{DeviceOptions, GpuContext, OffscreenBlur};
use crate::kernel::BlurParams;
use crate::pixels::PixelBuffer;

fn gpu_with(options: DeviceOptions) -> Option<GpuContext> {
    match GpuContext::new(&options) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

fn gpu() -> Option<GpuContext> {
    gpu_with(DeviceOptions::default())
}

fn params(radius: u32, sigma: f32) -> BlurParams {
    BlurParams::new(radius, sigma).unwrap()
}

fn gradient(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_fn(width, height, |x, y| {
        [
            (x * 255 / width.max(2)) as u8,
            (y * 255 / height.max(2)) as u8,
            ((x + y) * 17 % 256) as u8,
            255,
        ]
    })
    .unwrap()
}

#[test]
fn test_output_has_input_dimensions() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    for (w, h) in [(1, 1), (5, 3), (64, 2), (65, 7)] {
        let out = blur.apply(&ctx, &gradient(w, h), params(2, 1.0)).unwrap();
        assert_eq!((out.width(), out.height()), (w, h));
        assert_eq!(out.as_bytes().len(), (w * h * 4) as usize);
    }
}

#[test]
fn test_uniform_image_is_unchanged() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    let color = [200, 100, 50, 255];
    let img = PixelBuffer::filled(17, 9, color).unwrap();
    let out = blur.apply(&ctx, &img, params(4, 2.0)).unwrap();

    for y in 0..9 {
        for x in 0..17 {
            let p = out.pixel(x, y);
            for c in 0..4 {
                assert!(p[c].abs_diff(color[c]) <= 1, "pixel ({}, {}) = {:?}", x, y, p);
            }
        }
    }
}

#[test]
fn test_radius_zero_is_identity() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    let img = gradient(13, 6);
    let out = blur.apply(&ctx, &img, params(0, 1.0)).unwrap();
    assert!(out.max_channel_diff(&img).unwrap() <= 1);
}

#[test]
fn test_single_red_pixel() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    let img = PixelBuffer::filled(1, 1, [255, 0, 0, 255]).unwrap();
    let out = blur.apply(&ctx, &img, BlurParams::default()).unwrap();
    assert_eq!(out.pixel(0, 0), [255, 0, 0, 255]);
}

#[test]
fn test_checkerboard_is_smoothed() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    let img = cpu::checkerboard(4, 4);
    let out = blur.apply(&ctx, &img, params(1, 1.0)).unwrap();

    for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
        for c in 0..3 {
            let v = out.pixel(x, y)[c];
            assert!(v > 0 && v < 255, "center ({}, {}) channel {} = {}", x, y, c, v);
        }
    }

    // Clamp-to-edge repeats the corner texel, so corners move less than the center
    let moved = |x, y| out.pixel(x, y)[0].abs_diff(img.pixel(x, y)[0]);
    for (cx, cy) in [(0, 0), (3, 0), (0, 3), (3, 3)] {
        assert!(moved(cx, cy) < moved(1, 1), "corner ({}, {})", cx, cy);
    }

    for y in 1..3 {
        for x in 1..3 {
            for c in 0..3 {
                let before = cpu::window_variance(&img, x, y, c);
                let after = cpu::window_variance(&out, x, y, c);
                assert!(after < before, "({}, {}) channel {}: {} >= {}", x, y, c, after, before);
            }
        }
    }
}

#[test]
fn test_matches_cpu_reference() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    // 5 and 65 pixel rows need the row-compaction path, 64 does not
    for (w, h) in [(5, 4), (64, 8), (65, 9)] {
        let img = gradient(w, h);
        for p in [params(1, 0.8), params(3, 2.0)] {
            let gpu_out = blur.apply(&ctx, &img, p).unwrap();
            let cpu_out = cpu::blur(&img, p);
            let diff = gpu_out.max_channel_diff(&cpu_out).unwrap();
            assert!(diff <= 1, "{}x{} radius {}: max diff {}", w, h, p.radius, diff);
        }
    }
}

#[test]
fn test_pipeline_is_reused_across_images() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    let first = blur.apply(&ctx, &gradient(8, 8), params(2, 1.0)).unwrap();
    let second = blur.apply(&ctx, &gradient(3, 11), params(2, 1.0)).unwrap();
    let again = blur.apply(&ctx, &gradient(8, 8), params(2, 1.0)).unwrap();

    assert_eq!((second.width(), second.height()), (3, 11));
    assert_eq!(first, again);
}

#[test]
fn test_invalid_params_rejected_before_gpu_work() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();
    let img = gradient(4, 4);

    let bad = BlurParams {
        radius: 2,
        sigma: 0.0,
    };
    assert_eq!(blur.apply(&ctx, &img, bad).unwrap_err().kind(), ErrorKind::InvalidInput);

    let bad = BlurParams {
        radius: 1000,
        sigma: 1.0,
    };
    assert_eq!(blur.apply(&ctx, &img, bad).unwrap_err().kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_oversized_image_rejected() {
    let Some(ctx) = gpu() else { return };
    let blur = OffscreenBlur::new(&ctx).unwrap();

    let too_wide = ctx.max_texture_dimension() + 1;
    let img = PixelBuffer::filled(too_wide, 1, [0, 0, 0, 255]).unwrap();
    let err = blur.apply(&ctx, &img, params(1, 1.0)).unwrap_err();
    assert!(matches!(err, BlurError::InvalidDimensions { .. }));
}

#[test]
fn test_shader_missing_binding_fails_before_draw() {
    let dir = tempfile::tempdir().unwrap();
    let source = include_str!("gpu/shaders/blur.wgsl")
        .replace("@group(1) @binding(1)", "@group(1) @binding(2)");
    std::fs::write(dir.path().join("broken.wgsl"), source).unwrap();

    let Some(ctx) = gpu_with(DeviceOptions {
        shader_dir: Some(dir.path().to_path_buf()),
        ..DeviceOptions::default()
    }) else {
        return;
    };

    let err = OffscreenBlur::with_shader(&ctx, "broken.wgsl").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::BindingResolution);
}

#[test]
fn test_fence_times_out_when_never_signaled() {
    let Some(ctx) = gpu() else { return };

    let fence = Fence::new();
    let err = fence.wait(&ctx.device, 1, Duration::from_millis(20)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SynchronizationTimeout);
    assert_eq!(fence.completed_value(), 0);
}

#[test]
fn test_fence_reaches_signaled_value() {
    let Some(ctx) = gpu() else { return };

    let fence = Fence::new();
    ctx.queue.submit(std::iter::empty::<wgpu::CommandBuffer>());
    fence.enqueue_signal(&ctx.queue, 3);
    fence.wait(&ctx.device, 3, Duration::from_secs(5)).unwrap();
    assert!(fence.completed_value() >= 3);
}

#[test]
fn test_timeouts_surface_before_context_drop_returns() {
    let Some(ctx) = gpu() else { return };
    let start = Instant::now();
    let timeout = Duration::from_millis(20);

    // Same order as the CLI: the wait fails, then the context is dropped
    let fence_err = Fence::new().wait(&ctx.device, 1, timeout).unwrap_err();

    // A map callback that never reports
    let (_tx, rx) = mpsc::channel();
    let map_err = readback::wait_for_map(&ctx.device, &rx, timeout).unwrap_err();

    drop(ctx);

    assert_eq!(fence_err.kind(), ErrorKind::SynchronizationTimeout);
    assert_eq!(map_err.kind(), ErrorKind::SynchronizationTimeout);
    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
}
