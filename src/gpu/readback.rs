//! Readback synchronizer: copy the render target to staging, fence, map, copy out
//!
//! Ordering is strict: the render pass has ended (target unbound), the copy is
//! submitted, the fence is signaled behind it, the host waits on the fence,
//! and only then is the staging buffer mapped.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use super::context::GpuContext;
use super::fence::{Fence, POLL_INTERVAL};
use super::resources::{GpuTexture, StagingTexture};
use crate::error::BlurError;
use crate::pixels::{BYTES_PER_PIXEL, PixelBuffer};

/// Default bound on the fence wait
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fence value signaled behind the readback copy
const COPY_DONE: u64 = 1;

pub type MapResult = Result<(), wgpu::BufferAsyncError>;

/// Read the rendered `target` back into host memory through `staging`.
///
/// `timeout` bounds the fence wait and the map together.
pub fn readback(
    ctx: &GpuContext,
    target: &GpuTexture,
    staging: &StagingTexture,
    timeout: Duration,
) -> Result<PixelBuffer, BlurError> {
    let (width, height) = target.size();
    if staging.size() != target.size() {
        let (w, h) = staging.size();
        return Err(BlurError::InvalidDimensions {
            width: w,
            height: h,
            reason: format!("staging does not match the {}x{} render target", width, height),
        });
    }

    let start = Instant::now();
    let fence = Fence::new();

    let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    record_copy(&mut encoder, target, staging);

    ctx.capture(|_| ctx.queue.submit(std::iter::once(encoder.finish())))
        .map_err(|e| BlurError::Submission {
            step: "readback copy",
            reason: e.to_string(),
        })?;
    fence.enqueue_signal(&ctx.queue, COPY_DONE);

    fence.wait(&ctx.device, COPY_DONE, timeout)?;

    map_staging(ctx, staging, timeout.saturating_sub(start.elapsed()))
}

/// Record the device-side copy of `target` into the tightly packed staging buffer
fn record_copy(encoder: &mut wgpu::CommandEncoder, target: &GpuTexture, staging: &StagingTexture) {
    let (width, height) = target.size();
    let tight = staging.bytes_per_row();

    let (destination, bytes_per_row) = match staging.aligned() {
        Some(aligned) => (aligned, staging.copy_bytes_per_row()),
        None => (staging.buffer(), tight),
    };

    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: target.texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: destination,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    // Drop the row padding on the device so the mapped rows are contiguous
    if let Some(aligned) = staging.aligned() {
        for row in 0..height as u64 {
            encoder.copy_buffer_to_buffer(
                aligned,
                row * bytes_per_row as u64,
                staging.buffer(),
                row * tight as u64,
                tight as u64,
            );
        }
    }
}

/// Map the staging buffer for reading, copy the pixels out, unmap
fn map_staging(
    ctx: &GpuContext,
    staging: &StagingTexture,
    timeout: Duration,
) -> Result<PixelBuffer, BlurError> {
    let (width, height) = staging.size();
    let slice = staging.buffer().slice(..);

    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    wait_for_map(&ctx.device, &rx, timeout)?;

    let result = {
        let mapped = slice.get_mapped_range();
        // wgpu exposes no pitch for a mapped buffer. The staging buffer is
        // tightly packed by construction, so this guards the row compaction.
        copy_mapped(&mapped, staging.bytes_per_row(), width, height)
    };
    staging.buffer().unmap();
    result
}

/// Poll `device` until the map callback reports through `rx` or `timeout` passes
pub fn wait_for_map(
    device: &wgpu::Device,
    rx: &mpsc::Receiver<MapResult>,
    timeout: Duration,
) -> Result<(), BlurError> {
    let start = Instant::now();
    loop {
        device.poll(wgpu::Maintain::Poll);
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => return Err(BlurError::Mapping(e.to_string())),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BlurError::Mapping("map callback dropped".into()));
            }
            Err(RecvTimeoutError::Timeout) if start.elapsed() >= timeout => {
                return Err(BlurError::SynchronizationTimeout {
                    value: COPY_DONE,
                    timeout,
                });
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

/// Copy `width * height` tightly packed pixels out of a mapped staging region.
///
/// Fails instead of copying when the reported row stride is not `width * 4`.
pub fn copy_mapped(
    mapped: &[u8],
    stride: u32,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, BlurError> {
    let expected = width * BYTES_PER_PIXEL;
    if stride != expected {
        return Err(BlurError::StrideMismatch {
            expected,
            actual: stride,
        });
    }

    let len = PixelBuffer::byte_len(width, height)?;
    if mapped.len() < len {
        return Err(BlurError::StagingTooSmall {
            expected: len,
            actual: mapped.len(),
        });
    }

    PixelBuffer::new(width, height, mapped[..len].to_vec())
}
