//! GPU blur module using wgpu
//!
//! Headless device setup, resource creation, the single-pass blur draw and
//! the fenced readback into host memory.

pub mod blur;
pub mod context;
pub mod fence;
pub mod pass;
pub mod pipeline;
pub mod readback;
pub mod resources;

pub use blur::OffscreenBlur;
pub use context::{DeviceOptions, GpuContext};
