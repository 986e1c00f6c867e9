//! Prism GPU
//!
//! The immediate-mode device interface consumed by the engine, plus a headless
//! implementation.
//!
//! # Features
//!
//! - **RenderDevice**: GL-style program, uniform, texture, buffer and draw calls
//! - **HeadlessDevice**: records every call into a [`GpuCall`] log, useful for tests
//!   and for running the engine without a window
//! - **Reflection**: WGSL programs are parsed and validated with naga, and their
//!   uniforms and vertex attributes are reported the way a GL driver reports
//!   active uniforms

pub mod device;
pub mod error;
pub mod headless;
pub mod reflect;

pub use device::{
    ActiveAttribute, ActiveUniform, AttributeType, BlendFactor, BlendState, BufferHandle,
    BufferKind, CullMode, IndexFormat, PrimitiveTopology, ProgramHandle, RenderDevice,
    RenderState, TextureDesc, TextureFormat, TextureHandle, UniformLocation, UniformType,
    VertexFormat,
};
pub use error::{GpuError, GpuResult};
pub use headless::{CallStats, GpuCall, HeadlessDevice};
pub use reflect::{reflect_program, ProgramReflection};
