//! Engine error types

use prism_gpu::GpuError;
use std::io;
use thiserror::Error;

use crate::shader::ShaderDataGroup;

/// Errors raised by scene, shader and engine operations
///
/// Shader compile and link failures are deliberately absent: a program that
/// fails to build is reported through [`ShaderProgram::is_valid`](crate::shader::ShaderProgram::is_valid)
/// so the render loop can skip it and keep running.
#[derive(Error, Debug)]
pub enum Error {
    /// A shader with this name is already registered
    #[error("shader named `{0}` already exists")]
    DuplicateShader(String),

    /// A shader property was written through ShaderData of a different group
    #[error("shader property `{property}` belongs to the {assigned:?} group and cannot be written from {attempted:?} data")]
    GroupConflict {
        property: String,
        assigned: ShaderDataGroup,
        attempted: ShaderDataGroup,
    },

    /// Mesh CPU data was released by `upload_data(true)`
    #[error("mesh data is no longer accessible after being uploaded with release")]
    MeshNotAccessible,

    /// The render device cannot be used
    #[error("GPU context unavailable: {0}")]
    ContextUnavailable(String),

    /// The entity does not exist in the scene
    #[error("entity not found")]
    EntityNotFound,

    /// Reparenting would make an entity its own ancestor
    #[error("cannot parent an entity to itself or one of its descendants")]
    HierarchyCycle,

    /// Device error
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Configuration file could not be parsed
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error when reading a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;
