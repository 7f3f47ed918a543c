//! GPU context management - headless device, queue and shader sources

use std::borrow::Cow;
use std::path::PathBuf;

use crate::error::BlurError;

/// Shaders compiled into the binary, looked up by file name
const EMBEDDED_SHADERS: &[(&str, &str)] = &[("blur.wgsl", include_str!("shaders/blur.wgsl"))];

/// Which backends to try and how to pick an adapter
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    /// Directory searched for shader files before the embedded copies
    pub shader_dir: Option<PathBuf>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            shader_dir: None,
        }
    }
}

/// Resolves shader file names to WGSL source
#[derive(Debug, Clone, Default)]
pub struct ShaderResolver {
    search_dir: Option<PathBuf>,
}

impl ShaderResolver {
    pub fn new(search_dir: Option<PathBuf>) -> Self {
        Self { search_dir }
    }

    /// Source for `name`, preferring a file in the search directory
    pub fn resolve(&self, name: &str) -> Result<Cow<'static, str>, BlurError> {
        if let Some(dir) = &self.search_dir {
            let path = dir.join(name);
            if path.is_file() {
                log::info!("Loading shader {} from {}", name, path.display());
                return std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|e| BlurError::ShaderSource {
                        name: name.to_string(),
                        reason: format!("{}: {}", path.display(), e),
                    });
            }
        }

        EMBEDDED_SHADERS
            .iter()
            .find(|(embedded, _)| *embedded == name)
            .map(|(_, source)| Cow::Borrowed(*source))
            .ok_or_else(|| BlurError::ShaderSource {
                name: name.to_string(),
                reason: "no such shader file or embedded source".into(),
            })
    }
}

/// Holds all wgpu state needed for offscreen rendering
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub shaders: ShaderResolver,
}

impl GpuContext {
    /// Create a headless GPU context (no surface)
    pub fn new(options: &DeviceOptions) -> Result<Self, BlurError> {
        pollster::block_on(Self::new_async(options))
    }

    async fn new_async(options: &DeviceOptions) -> Result<Self, BlurError> {
        // Validation layers in debug builds only
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            flags: wgpu::InstanceFlags::from_build_config(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                BlurError::DeviceInit(format!(
                    "no suitable GPU adapter for backends {:?}",
                    options.backends
                ))
            })?;

        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Blur Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|e| BlurError::DeviceInit(format!("failed to create device: {}", e)))?;

        // Errors outside an error scope are logged instead of panicking
        device.on_uncaptured_error(Box::new(|e| {
            log::error!("Uncaptured GPU error: {}", e);
        }));

        Ok(Self {
            device,
            queue,
            shaders: ShaderResolver::new(options.shader_dir.clone()),
        })
    }

    /// Largest width or height a 2D texture may have on this device
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    ///
    /// Returns the first error the device reported while `f` ran.
    pub fn capture<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // Fire whatever callbacks are already due; never block on a hung device
        self.device.poll(wgpu::Maintain::Poll);
    }
}
