//! Error type shared by every stage of the blur job

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a failure, one per stage that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Encode,
    InvalidInput,
    DeviceInit,
    ResourceCreation,
    BindingResolution,
    Synchronization,
    SynchronizationTimeout,
}

#[derive(Debug, Error)]
pub enum BlurError {
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("invalid image dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("invalid blur parameters: {0}")]
    InvalidParameters(String),

    #[error("GPU device initialization failed: {0}")]
    DeviceInit(String),

    #[error("failed to resolve shader `{name}`: {reason}")]
    ShaderSource { name: String, reason: String },

    #[error("failed to create {resource}: {reason}")]
    ResourceCreation { resource: String, reason: String },

    #[error("shader `{shader}` failed to compile:\n{message}")]
    ShaderCompilation { shader: String, message: String },

    #[error("shader `{shader}` does not declare {binding}")]
    BindingResolution { shader: String, binding: String },

    #[error("GPU rejected {step}: {reason}")]
    Submission { step: &'static str, reason: String },

    #[error("staging row stride is {actual} bytes, expected tightly packed {expected} bytes")]
    StrideMismatch { expected: u32, actual: u32 },

    #[error("staging buffer holds {actual} bytes, expected at least {expected}")]
    StagingTooSmall { expected: usize, actual: usize },

    #[error("failed to map staging buffer: {0}")]
    Mapping(String),

    #[error("fence did not reach value {value} within {timeout:?}")]
    SynchronizationTimeout { value: u64, timeout: Duration },
}

impl BlurError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlurError::Decode { .. } => ErrorKind::Decode,
            BlurError::Encode { .. } => ErrorKind::Encode,
            BlurError::InvalidDimensions { .. } | BlurError::InvalidParameters(_) => {
                ErrorKind::InvalidInput
            }
            BlurError::DeviceInit(_) | BlurError::ShaderSource { .. } => ErrorKind::DeviceInit,
            BlurError::ResourceCreation { .. }
            | BlurError::ShaderCompilation { .. }
            | BlurError::Submission { .. } => ErrorKind::ResourceCreation,
            BlurError::BindingResolution { .. } => ErrorKind::BindingResolution,
            BlurError::StrideMismatch { .. }
            | BlurError::StagingTooSmall { .. }
            | BlurError::Mapping(_) => ErrorKind::Synchronization,
            BlurError::SynchronizationTimeout { .. } => ErrorKind::SynchronizationTimeout,
        }
    }

    pub(crate) fn resource(resource: impl Into<String>, reason: impl ToString) -> Self {
        BlurError::ResourceCreation {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}
