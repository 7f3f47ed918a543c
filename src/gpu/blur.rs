//! Offscreen Gaussian blur: upload, draw once, read back
//!
//! The pipeline, its constants block and the quad are built once and reused;
//! textures and the staging buffer are created per image.

use std::time::Duration;

use super::context::GpuContext;
use super::pass::{self, QuadGeometry};
use super::pipeline::{BLUR_SHADER, BlurPipeline};
use super::readback::{self, DEFAULT_FENCE_TIMEOUT};
use super::resources::{BlurTargets, TEXTURE_FORMAT};
use crate::error::BlurError;
use crate::kernel::BlurParams;
use crate::pixels::PixelBuffer;

pub struct OffscreenBlur {
    pipeline: BlurPipeline,
    quad: QuadGeometry,
    fence_timeout: Duration,
}

impl OffscreenBlur {
    /// Build with the default blur shader
    pub fn new(ctx: &GpuContext) -> Result<Self, BlurError> {
        Self::with_shader(ctx, BLUR_SHADER)
    }

    /// Build with the shader called `shader_name`, resolved through the context
    pub fn with_shader(ctx: &GpuContext, shader_name: &str) -> Result<Self, BlurError> {
        let pipeline = BlurPipeline::build(ctx, shader_name, TEXTURE_FORMAT)?;
        let quad = QuadGeometry::new(ctx)?;
        log::info!("Blur pipeline ready ({})", shader_name);
        Ok(Self {
            pipeline,
            quad,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
        })
    }

    /// Bound on how long `apply` waits for the device
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    /// Blur `image` on the device and return the result in host memory
    pub fn apply(
        &self,
        ctx: &GpuContext,
        image: &PixelBuffer,
        params: BlurParams,
    ) -> Result<PixelBuffer, BlurError> {
        params.validate()?;

        let targets = BlurTargets::new(ctx, image)?;
        let mut binding = self.pipeline.create_binding();

        pass::render(
            ctx,
            &self.pipeline,
            &mut binding,
            &self.quad,
            &targets.input,
            &targets.target,
            params,
        )?;

        let output =
            readback::readback(ctx, &targets.target, &targets.staging, self.fence_timeout)?;
        log::debug!("Read back {}x{} blurred image", output.width(), output.height());
        Ok(output)
    }
}
