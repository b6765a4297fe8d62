//! Graphics error types.

use thiserror::Error;

/// Errors that can occur in the texture lifecycle system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics backend.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a hardware object.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested format or feature is not supported by the device.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// Device memory is exhausted.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;
