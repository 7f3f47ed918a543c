//! GPU resource creation: textures by usage class, dynamic buffers
//!
//! Every creation call runs inside the context's error scopes so a rejected
//! descriptor comes back as `BlurError::ResourceCreation` instead of a panic.

use wgpu::util::DeviceExt;

use super::context::GpuContext;
use crate::error::BlurError;
use crate::pixels::{BYTES_PER_PIXEL, PixelBuffer};

/// Pixel format shared by every texture in a blur operation
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Access class of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// Written once at creation, shader-readable
    Immutable,
    /// Render attachment, shader-readable, copy source
    RenderTarget,
}

impl TextureUsage {
    fn wgpu_usages(self) -> wgpu::TextureUsages {
        match self {
            TextureUsage::Immutable => {
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
            }
            TextureUsage::RenderTarget => {
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            TextureUsage::Immutable => "Input Texture",
            TextureUsage::RenderTarget => "Render Target",
        }
    }
}

/// A device-resident 2D RGBA8 texture with its default view
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    usage: TextureUsage,
    size: (u32, u32),
}

impl GpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Borrowed view for binding as a sampled texture or render attachment
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// Host-readable copy destination for a texture's contents.
///
/// The mapped buffer is always tightly packed (`width * 4` bytes per row).
/// When that stride breaks wgpu's 256-byte row alignment for texture copies,
/// the texture is copied into `aligned` first and compacted row by row.
pub struct StagingTexture {
    buffer: wgpu::Buffer,
    aligned: Option<wgpu::Buffer>,
    size: (u32, u32),
}

impl StagingTexture {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Row-aligned intermediate buffer, present only when compaction is needed
    pub fn aligned(&self) -> Option<&wgpu::Buffer> {
        self.aligned.as_ref()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Row stride of the mapped buffer
    pub fn bytes_per_row(&self) -> u32 {
        self.size.0 * BYTES_PER_PIXEL
    }

    /// Row stride used for the texture-to-buffer copy
    pub fn copy_bytes_per_row(&self) -> u32 {
        padded_bytes_per_row(self.size.0)
    }
}

/// What a dynamic buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Uniform,
    Vertex,
    Index,
}

impl BufferKind {
    fn wgpu_usages(self) -> wgpu::BufferUsages {
        let bind = match self {
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        // Host-written through the queue, so it can be refilled without reallocation
        bind | wgpu::BufferUsages::COPY_DST
    }
}

/// Round `width * 4` up to wgpu's texture copy row alignment
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Reject sizes the device cannot hold before asking it to allocate
pub fn check_dimensions(ctx: &GpuContext, width: u32, height: u32) -> Result<(), BlurError> {
    let max = ctx.max_texture_dimension();
    if width == 0 || height == 0 || width > max || height > max {
        return Err(BlurError::InvalidDimensions {
            width,
            height,
            reason: format!("each side must be between 1 and {}", max),
        });
    }
    Ok(())
}

/// Create a 2D RGBA8 texture.
///
/// `initial` is required for `Immutable` textures and ignored otherwise.
pub fn create_texture(
    ctx: &GpuContext,
    usage: TextureUsage,
    width: u32,
    height: u32,
    initial: Option<&PixelBuffer>,
) -> Result<GpuTexture, BlurError> {
    check_dimensions(ctx, width, height)?;

    let descriptor = wgpu::TextureDescriptor {
        label: Some(usage.label()),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: usage.wgpu_usages(),
        view_formats: &[],
    };

    let texture = match (usage, initial) {
        (TextureUsage::Immutable, Some(pixels)) => {
            if pixels.width() != width || pixels.height() != height {
                return Err(BlurError::InvalidDimensions {
                    width: pixels.width(),
                    height: pixels.height(),
                    reason: format!("initial data does not match a {}x{} texture", width, height),
                });
            }
            ctx.capture(|device| {
                device.create_texture_with_data(
                    &ctx.queue,
                    &descriptor,
                    wgpu::util::TextureDataOrder::LayerMajor,
                    pixels.as_bytes(),
                )
            })
        }
        (TextureUsage::Immutable, None) => {
            return Err(BlurError::resource(
                usage.label(),
                "immutable textures need initial data",
            ));
        }
        (TextureUsage::RenderTarget, _) => ctx.capture(|device| device.create_texture(&descriptor)),
    }
    .map_err(|e| BlurError::resource(usage.label(), e))?;

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    log::debug!("Created {} ({}x{})", usage.label(), width, height);

    Ok(GpuTexture {
        texture,
        view,
        usage,
        size: (width, height),
    })
}

/// Create the host-readable staging destination for a `width` x `height` texture
pub fn create_staging(
    ctx: &GpuContext,
    width: u32,
    height: u32,
) -> Result<StagingTexture, BlurError> {
    check_dimensions(ctx, width, height)?;

    let tight = width as u64 * BYTES_PER_PIXEL as u64;
    let padded = padded_bytes_per_row(width) as u64;

    let buffer = ctx
        .capture(|device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Staging Buffer"),
                size: tight * height as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })
        .map_err(|e| BlurError::resource("Staging Buffer", e))?;

    let aligned = if padded != tight {
        let aligned = ctx
            .capture(|device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Row-Aligned Copy Buffer"),
                    size: padded * height as u64,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                })
            })
            .map_err(|e| BlurError::resource("Row-Aligned Copy Buffer", e))?;
        Some(aligned)
    } else {
        None
    };

    Ok(StagingTexture {
        buffer,
        aligned,
        size: (width, height),
    })
}

/// Create a host-writable buffer of `size` bytes
pub fn create_buffer(
    ctx: &GpuContext,
    kind: BufferKind,
    label: &str,
    size: u64,
) -> Result<wgpu::Buffer, BlurError> {
    ctx.capture(|device| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: kind.wgpu_usages(),
            mapped_at_creation: false,
        })
    })
    .map_err(|e| BlurError::resource(label, e))
}

/// Create a host-writable buffer holding `contents`
pub fn create_buffer_init(
    ctx: &GpuContext,
    kind: BufferKind,
    label: &str,
    contents: &[u8],
) -> Result<wgpu::Buffer, BlurError> {
    ctx.capture(|device| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: kind.wgpu_usages(),
        })
    })
    .map_err(|e| BlurError::resource(label, e))
}

/// The per-image resource set of one blur operation, all the same size
pub struct BlurTargets {
    pub input: GpuTexture,
    pub target: GpuTexture,
    pub staging: StagingTexture,
}

impl BlurTargets {
    /// Upload `image` and allocate a matching render target and staging buffer
    pub fn new(ctx: &GpuContext, image: &PixelBuffer) -> Result<Self, BlurError> {
        let (width, height) = (image.width(), image.height());
        let input = create_texture(ctx, TextureUsage::Immutable, width, height, Some(image))?;
        let target = create_texture(ctx, TextureUsage::RenderTarget, width, height, None)?;
        let staging = create_staging(ctx, width, height)?;
        Ok(Self {
            input,
            target,
            staging,
        })
    }
}
