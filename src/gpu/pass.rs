//! Render pass executor: constants upload, quad geometry, the indexed draw

use super::context::GpuContext;
use super::pipeline::{BlurConstants, BlurPipeline, ResourceBinding, Vertex};
use super::resources::{self, BufferKind, GpuTexture, TextureUsage};
use crate::error::BlurError;
use crate::kernel::BlurParams;

/// Full-screen quad; v runs top to bottom
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    Vertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
];

/// Two triangles covering the viewport
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Vertex and index buffers for the full-screen quad
pub struct QuadGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

impl QuadGeometry {
    pub fn new(ctx: &GpuContext) -> Result<Self, BlurError> {
        let vertex_buffer = resources::create_buffer_init(
            ctx,
            BufferKind::Vertex,
            "Quad Vertex Buffer",
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let index_buffer = resources::create_buffer_init(
            ctx,
            BufferKind::Index,
            "Quad Index Buffer",
            bytemuck::cast_slice(&QUAD_INDICES),
        )?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
        })
    }

    /// Rewrite the static geometry. Idempotent.
    pub fn upload(&self, ctx: &GpuContext) {
        ctx.queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&QUAD_VERTICES));
        ctx.queue.write_buffer(&self.index_buffer, 0, bytemuck::cast_slice(&QUAD_INDICES));
    }
}

/// Record and submit the blur draw of `input` into `target`.
///
/// Returns once the commands are submitted; the target's contents are only
/// defined after the device has executed them.
pub fn render(
    ctx: &GpuContext,
    pipeline: &BlurPipeline,
    binding: &mut ResourceBinding<'_>,
    quad: &QuadGeometry,
    input: &GpuTexture,
    target: &GpuTexture,
    params: BlurParams,
) -> Result<wgpu::SubmissionIndex, BlurError> {
    let (width, height) = target.size();
    if input.size() != target.size() {
        let (w, h) = input.size();
        return Err(BlurError::InvalidDimensions {
            width: w,
            height: h,
            reason: format!("input does not match the {}x{} render target", width, height),
        });
    }
    if input.usage() != TextureUsage::Immutable || target.usage() != TextureUsage::RenderTarget {
        return Err(BlurError::resource(
            "Blur Render Pass",
            format!(
                "expected Immutable -> RenderTarget, got {:?} -> {:?}",
                input.usage(),
                target.usage()
            ),
        ));
    }
    if target.texture().format() != pipeline.target_format() {
        return Err(BlurError::resource(
            "Blur Render Pass",
            format!(
                "target format {:?} does not match pipeline format {:?}",
                target.texture().format(),
                pipeline.target_format()
            ),
        ));
    }

    // Every draw overwrites the whole block, so there is nothing to read back
    let constants = BlurConstants::new(width, height, params);
    ctx.queue
        .write_buffer(pipeline.constants_buffer(), 0, bytemuck::cast_slice(&[constants]));
    quad.upload(ctx);

    binding.bind_texture(ctx, input.view())?;
    let texture_bind_group = binding.bind_group().ok_or(BlurError::BindingResolution {
        shader: "blur".into(),
        binding: "input_texture".into(),
    })?;

    let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Blur Encoder"),
    });

    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blur Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(pipeline.render_pipeline());
        render_pass.set_vertex_buffer(0, quad.vertex_buffer.slice(..));
        render_pass.set_index_buffer(quad.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.set_bind_group(0, pipeline.constants_bind_group(), &[]);
        render_pass.set_bind_group(1, texture_bind_group, &[]);
        render_pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
    }
    // The pass has ended here, so `target` is no longer bound as an attachment

    let index = ctx
        .capture(|_| ctx.queue.submit(std::iter::once(encoder.finish())))
        .map_err(|e| BlurError::Submission {
            step: "blur draw",
            reason: e.to_string(),
        })?;

    log::debug!(
        "Submitted blur draw {}x{} (radius {}, sigma {})",
        width,
        height,
        params.radius,
        params.sigma
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_from_size() {
        let params = BlurParams {
            radius: 3,
            sigma: 1.5,
        };
        let c = BlurConstants::new(4, 8, params);
        assert_eq!(c.reversed_size, [0.25, 0.125]);
        assert_eq!(c.blur_radius, 3);
        assert_eq!(c.sigma, 1.5);
    }

    #[test]
    fn test_quad_covers_viewport() {
        // Every corner of NDC appears, and both triangles reference valid vertices
        for corner in [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]] {
            assert!(QUAD_VERTICES.iter().any(|v| v.position == corner));
        }
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        // Top of the screen samples the first texture row
        for v in QUAD_VERTICES {
            assert_eq!(v.uv[1], if v.position[1] > 0.0 { 0.0 } else { 1.0 });
        }
    }
}
