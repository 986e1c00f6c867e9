//! GPU error types

use thiserror::Error;

/// Errors reported by a [`RenderDevice`](crate::RenderDevice)
#[derive(Error, Debug)]
pub enum GpuError {
    /// Shader source failed to parse
    #[error("shader parse error in {stage} stage: {message}")]
    ShaderParse { stage: &'static str, message: String },

    /// Shader parsed but failed validation
    #[error("shader validation error in {stage} stage: {message}")]
    ShaderValidation { stage: &'static str, message: String },

    /// Shader module has no entry point for the stage it was linked as
    #[error("no {0} entry point found")]
    MissingEntryPoint(&'static str),

    /// Handle does not belong to this device or was already deleted
    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    /// The device can no longer render
    #[error("GPU context lost")]
    ContextLost,
}

/// Result alias for device operations
pub type GpuResult<T> = std::result::Result<T, GpuError>;
