//! Runtime configuration and command line parsing

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::codec::DEFAULT_QUALITY;
use crate::error::BlurError;
use crate::gpu::DeviceOptions;
use crate::gpu::readback::DEFAULT_FENCE_TIMEOUT;
use crate::kernel::BlurParams;

/// Everything one blur run needs
#[derive(Debug, Clone)]
pub struct BlurConfig {
    /// Image to read
    pub input: PathBuf,
    /// Image to write; format follows the extension
    pub output: PathBuf,
    pub params: BlurParams,
    /// JPEG quality, 0-100
    pub quality: u8,
    /// Bound on the readback fence wait
    pub fence_timeout: Duration,
    pub device: DeviceOptions,
    /// Also run the CPU reference and report the largest channel difference
    pub verify: bool,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("fox.jpg"),
            output: PathBuf::from("output.jpg"),
            params: BlurParams::default(),
            quality: DEFAULT_QUALITY,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
            device: DeviceOptions::default(),
            verify: false,
        }
    }
}

/// Graphics API to request an adapter from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    All,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl From<Backend> for wgpu::Backends {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::All => wgpu::Backends::all(),
            Backend::Vulkan => wgpu::Backends::VULKAN,
            Backend::Metal => wgpu::Backends::METAL,
            Backend::Dx12 => wgpu::Backends::DX12,
            Backend::Gl => wgpu::Backends::GL,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "gpu_blur")]
#[command(version, about = "Gaussian-blur an image on the GPU and write the result")]
pub struct Cli {
    /// Input image
    #[arg(short, long, default_value = "fox.jpg")]
    pub input: PathBuf,

    /// Output image (format from the extension)
    #[arg(short, long, default_value = "output.jpg")]
    pub output: PathBuf,

    /// Blur radius in pixels
    #[arg(short, long, default_value_t = 50)]
    pub radius: u32,

    /// Gaussian sigma in pixels
    #[arg(short, long, default_value_t = 25.0)]
    pub sigma: f32,

    /// JPEG quality
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_QUALITY,
        value_parser = clap::value_parser!(u8).range(0..=100)
    )]
    pub quality: u8,

    /// Give up waiting for the GPU after this many milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub fence_timeout_ms: u64,

    /// Graphics backend
    #[arg(long, value_enum, default_value_t = Backend::All)]
    pub backend: Backend,

    /// Directory searched for shader files before the built-in ones
    #[arg(long)]
    pub shader_dir: Option<PathBuf>,

    /// Compare the GPU result against the CPU reference blur
    #[arg(long)]
    pub verify: bool,
}

impl TryFrom<Cli> for BlurConfig {
    type Error = BlurError;

    /// Rejects blur parameters before any device is created
    fn try_from(cli: Cli) -> Result<Self, BlurError> {
        Ok(Self {
            input: cli.input,
            output: cli.output,
            params: BlurParams::new(cli.radius, cli.sigma)?,
            quality: cli.quality,
            fence_timeout: Duration::from_millis(cli.fence_timeout_ms),
            device: DeviceOptions {
                backends: cli.backend.into(),
                shader_dir: cli.shader_dir,
                ..DeviceOptions::default()
            },
            verify: cli.verify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let from_cli = BlurConfig::try_from(Cli::parse_from(["gpu_blur"])).unwrap();
        let default = BlurConfig::default();

        assert_eq!(from_cli.input, default.input);
        assert_eq!(from_cli.output, default.output);
        assert_eq!(from_cli.params, default.params);
        assert_eq!(from_cli.quality, default.quality);
        assert_eq!(from_cli.fence_timeout, default.fence_timeout);
        assert_eq!(from_cli.device.backends, wgpu::Backends::all());
        assert!(!from_cli.verify);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "gpu_blur",
            "--input",
            "in.png",
            "--radius",
            "3",
            "--sigma",
            "1.5",
            "--quality",
            "80",
            "--fence-timeout-ms",
            "250",
            "--backend",
            "vulkan",
            "--verify",
        ]);
        let config = BlurConfig::try_from(cli).unwrap();

        assert_eq!(config.input, PathBuf::from("in.png"));
        assert_eq!(
            config.params,
            BlurParams {
                radius: 3,
                sigma: 1.5
            }
        );
        assert_eq!(config.quality, 80);
        assert_eq!(config.fence_timeout, Duration::from_millis(250));
        assert_eq!(config.device.backends, wgpu::Backends::VULKAN);
        assert!(config.verify);
    }

    #[test]
    fn test_cli_params_validated() {
        for args in [
            vec!["gpu_blur", "--sigma", "0"],
            vec!["gpu_blur", "--sigma=-2.5"],
            vec!["gpu_blur", "--radius", "129"],
        ] {
            let err = BlurConfig::try_from(Cli::parse_from(args)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn test_cli_quality_range() {
        assert!(Cli::try_parse_from(["gpu_blur", "--quality", "0"]).is_ok());
        assert!(Cli::try_parse_from(["gpu_blur", "--quality", "101"]).is_err());
    }
}
