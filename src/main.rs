mod codec;
mod config;
mod cpu;
mod error;
mod gpu;
mod job;
mod kernel;
mod pixels;

#[cfg(test)]
mod tests;

use std::time::Instant;

use clap::Parser;

use config::{BlurConfig, Cli};
use error::BlurError;
use gpu::{GpuContext, OffscreenBlur};

/// Log filter used when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER))
        .init();

    let result = BlurConfig::try_from(Cli::parse()).and_then(|config| run(&config));
    if let Err(e) = result {
        log::error!("{:?} error: {}", e.kind(), e);
        std::process::exit(1);
    }
}

fn run(config: &BlurConfig) -> Result<(), BlurError> {
    let ctx = GpuContext::new(&config.device)?;
    let blur = OffscreenBlur::new(&ctx)?.with_fence_timeout(config.fence_timeout);

    job::blur_file(&config.input, &config.output, config.quality, |image| {
        let blurred = blur.apply(&ctx, image, config.params)?;
        if config.verify {
            verify(image, &blurred, config);
        }
        Ok(blurred)
    })?;

    Ok(())
}

/// Compare the GPU output against the CPU reference blur and log the result
fn verify(image: &pixels::PixelBuffer, blurred: &pixels::PixelBuffer, config: &BlurConfig) {
    let start = Instant::now();
    let reference = cpu::blur(image, config.params);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match blurred.max_channel_diff(&reference) {
        Some(diff) if diff <= 1 => log::info!(
            "Verify: max channel difference {} (CPU reference took {:.2} ms)",
            diff,
            elapsed_ms
        ),
        Some(diff) => log::warn!("Verify: max channel difference {} exceeds 1", diff),
        None => log::warn!("Verify: CPU reference has different dimensions"),
    }
}
