//! Blur render pipeline: shader reflection, layouts, fixed-function state

use super::context::GpuContext;
use super::resources::{self, BufferKind};
use crate::error::BlurError;
use crate::kernel::BlurParams;

/// Shader file the pipeline is built from by default
pub const BLUR_SHADER: &str = "blur.wgsl";

const VERTEX_ENTRY: &str = "vs_main";
const FRAGMENT_ENTRY: &str = "fs_main";

/// Per-draw uniform block, laid out to match `Constants` in blur.wgsl
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurConstants {
    pub reversed_size: [f32; 2],
    pub blur_radius: i32,
    pub sigma: f32,
}

impl BlurConstants {
    pub fn new(width: u32, height: u32, params: BlurParams) -> Self {
        Self {
            reversed_size: [1.0 / width as f32, 1.0 / height as f32],
            blur_radius: params.radius as i32,
            sigma: params.sigma,
        }
    }
}

/// Quad vertex: NDC position + texture UV
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// A resource the shader must declare at a fixed group/binding
struct ExpectedBinding {
    name: &'static str,
    group: u32,
    binding: u32,
}

const EXPECTED_BINDINGS: [ExpectedBinding; 3] = [
    ExpectedBinding {
        name: "constants",
        group: 0,
        binding: 0,
    },
    ExpectedBinding {
        name: "input_texture",
        group: 1,
        binding: 0,
    },
    ExpectedBinding {
        name: "input_sampler",
        group: 1,
        binding: 1,
    },
];

/// Parse and validate WGSL, then check it declares everything the host binds
pub fn reflect_shader(name: &str, source: &str) -> Result<naga::Module, BlurError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| BlurError::ShaderCompilation {
        shader: name.to_string(),
        message: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| BlurError::ShaderCompilation {
        shader: name.to_string(),
        message: e.emit_to_string(source),
    })?;

    for expected in &EXPECTED_BINDINGS {
        let found = module.global_variables.iter().any(|(_, var)| {
            var.name.as_deref() == Some(expected.name)
                && var.binding.as_ref().is_some_and(|b| {
                    b.group == expected.group && b.binding == expected.binding
                })
        });
        if !found {
            return Err(BlurError::BindingResolution {
                shader: name.to_string(),
                binding: format!(
                    "`{}` at @group({}) @binding({})",
                    expected.name, expected.group, expected.binding
                ),
            });
        }
    }

    for (entry, stage) in [
        (VERTEX_ENTRY, naga::ShaderStage::Vertex),
        (FRAGMENT_ENTRY, naga::ShaderStage::Fragment),
    ] {
        if !module.entry_points.iter().any(|ep| ep.name == entry && ep.stage == stage) {
            return Err(BlurError::BindingResolution {
                shader: name.to_string(),
                binding: format!("{:?} entry point `{}`", stage, entry),
            });
        }
    }

    Ok(module)
}

/// Compiled blur pipeline plus its statically bound constants block
pub struct BlurPipeline {
    render_pipeline: wgpu::RenderPipeline,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    constants_buffer: wgpu::Buffer,
    constants_bind_group: wgpu::BindGroup,
    target_format: wgpu::TextureFormat,
}

impl BlurPipeline {
    /// Build the pipeline from the shader called `shader_name`
    pub fn build(
        ctx: &GpuContext,
        shader_name: &str,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, BlurError> {
        let source = ctx.shaders.resolve(shader_name)?;
        reflect_shader(shader_name, &source)?;

        let shader = ctx
            .capture(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Blur Shader"),
                    source: wgpu::ShaderSource::Wgsl(source.clone()),
                })
            })
            .map_err(|e| BlurError::ShaderCompilation {
                shader: shader_name.to_string(),
                message: e.to_string(),
            })?;

        let device = &ctx.device;

        // Group 0: constants, bound once for the pipeline's lifetime
        let constants_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Blur Constants Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<BlurConstants>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        // Group 1: input texture + its point sampler, rebound per image
        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Blur Texture Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blur Pipeline Layout"),
            bind_group_layouts: &[&constants_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = ctx
            .capture(|device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Blur Render Pipeline"),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some(VERTEX_ENTRY),
                        buffers: &[Vertex::layout()],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some(FRAGMENT_ENTRY),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: target_format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: None,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            })
            .map_err(|e| BlurError::resource("Blur Render Pipeline", e))?;

        // Point sampling so every tap reads exactly one texel
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blur Sampler (Nearest)"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let constants_buffer = resources::create_buffer(
            ctx,
            BufferKind::Uniform,
            "Blur Constants Buffer",
            std::mem::size_of::<BlurConstants>() as u64,
        )?;

        let constants_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blur Constants Bind Group"),
            layout: &constants_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: constants_buffer.as_entire_binding(),
            }],
        });

        log::info!("Built blur pipeline from {} for {:?}", shader_name, target_format);

        Ok(Self {
            render_pipeline,
            texture_bind_group_layout,
            sampler,
            constants_buffer,
            constants_bind_group,
            target_format,
        })
    }

    /// A fresh, empty texture binding for this pipeline
    pub fn create_binding(&self) -> ResourceBinding<'_> {
        ResourceBinding {
            pipeline: self,
            bind_group: None,
        }
    }

    pub fn render_pipeline(&self) -> &wgpu::RenderPipeline {
        &self.render_pipeline
    }

    pub fn constants_buffer(&self) -> &wgpu::Buffer {
        &self.constants_buffer
    }

    pub fn constants_bind_group(&self) -> &wgpu::BindGroup {
        &self.constants_bind_group
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }
}

/// The per-image association of the pipeline's texture slot with a concrete view
pub struct ResourceBinding<'p> {
    pipeline: &'p BlurPipeline,
    bind_group: Option<wgpu::BindGroup>,
}

impl ResourceBinding<'_> {
    /// Point the texture slot at `view`; replaces any earlier binding
    pub fn bind_texture(
        &mut self,
        ctx: &GpuContext,
        view: &wgpu::TextureView,
    ) -> Result<(), BlurError> {
        let layout = &self.pipeline.texture_bind_group_layout;
        let sampler = &self.pipeline.sampler;
        let bind_group = ctx
            .capture(|device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Blur Texture Bind Group"),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                })
            })
            .map_err(|e| BlurError::resource("Blur Texture Bind Group", e))?;
        self.bind_group = Some(bind_group);
        Ok(())
    }

    /// The committed bind group, if a texture has been bound
    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.bind_group.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gpu::context::ShaderResolver;

    fn embedded_blur() -> String {
        ShaderResolver::default().resolve(BLUR_SHADER).unwrap().into_owned()
    }

    #[test]
    fn test_blur_shader_validates() {
        let module = reflect_shader(BLUR_SHADER, &embedded_blur()).unwrap();
        assert_eq!(module.entry_points.len(), 2);
    }

    #[test]
    fn test_constants_layout_matches_wgsl() {
        // vec2<f32> + i32 + f32, no padding
        assert_eq!(std::mem::size_of::<BlurConstants>(), 16);
        assert_eq!(std::mem::size_of::<Vertex>(), 16);
    }

    #[test]
    fn test_missing_binding_is_reported() {
        let source = embedded_blur().replace("input_sampler", "other_sampler");
        let err = reflect_shader("renamed.wgsl", &source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindingResolution);
        assert!(err.to_string().contains("input_sampler"));
    }

    #[test]
    fn test_moved_binding_is_reported() {
        let source = embedded_blur().replace(
            "@group(0) @binding(0) var<uniform> constants",
            "@group(0) @binding(3) var<uniform> constants",
        );
        let err = reflect_shader("moved.wgsl", &source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindingResolution);
    }

    #[test]
    fn test_missing_entry_point_is_reported() {
        let source = embedded_blur().replace("fn fs_main", "fn fragment_main");
        let err = reflect_shader("entry.wgsl", &source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindingResolution);
        assert!(err.to_string().contains("fs_main"));
    }

    #[test]
    fn test_syntax_error_is_compile_error() {
        let err = reflect_shader("broken.wgsl", "fn vs_main( {").unwrap_err();
        assert!(matches!(err, BlurError::ShaderCompilation { .. }));
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
    }
}
