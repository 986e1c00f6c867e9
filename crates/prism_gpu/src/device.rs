//! Render device interface

use prism_core::Color;
use slotmap::new_key_type;

use crate::error::GpuResult;

new_key_type! {
    /// Linked shader program
    pub struct ProgramHandle;
    /// Texture object
    pub struct TextureHandle;
    /// Vertex or index buffer
    pub struct BufferHandle;
}

/// Location of a uniform inside a linked program
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Type of an active uniform as reported by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    Bool,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    Sampler2DArray,
    Sampler2DShadow,
    Sampler3D,
    SamplerCube,
}

impl UniformType {
    /// True for texture/sampler uniforms that occupy texture units
    pub fn is_sampler(&self) -> bool {
        matches!(
            self,
            UniformType::Sampler2D
                | UniformType::Sampler2DArray
                | UniformType::Sampler2DShadow
                | UniformType::Sampler3D
                | UniformType::SamplerCube
        )
    }
}

/// Active uniform of a linked program
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveUniform {
    pub name: String,
    pub location: UniformLocation,
    pub ty: UniformType,
    /// Array length, 1 for non-arrays
    pub size: u32,
}

/// Type of a vertex shader input
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
}

/// Active vertex attribute of a linked program
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveAttribute {
    pub name: String,
    pub location: u32,
    pub ty: AttributeType,
}

/// Layout of one vertex attribute in a buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn components(&self) -> u32 {
        match self {
            VertexFormat::Float32 => 1,
            VertexFormat::Float32x2 => 2,
            VertexFormat::Float32x3 => 3,
            VertexFormat::Float32x4 => 4,
        }
    }

    /// Size of one element in bytes
    pub fn size(&self) -> u32 {
        self.components() * 4
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(&self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    Depth24Plus,
}

/// Texture creation parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Array layers, 1 for a plain 2D texture
    pub layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            layers: 1,
            mip_levels: 1,
            format,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend equation factors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendState {
    /// Standard alpha blending (premultiplied alpha not assumed)
    pub const ALPHA_BLENDING: BlendState = BlendState {
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::OneMinusSrcAlpha,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
    };

    /// Additive blending
    pub const ADDITIVE: BlendState = BlendState {
        src_color: BlendFactor::SrcAlpha,
        dst_color: BlendFactor::One,
        src_alpha: BlendFactor::One,
        dst_alpha: BlendFactor::One,
    };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Fixed-function state applied before a draw
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// `None` disables blending
    pub blend: Option<BlendState>,
    pub cull_mode: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self::opaque()
    }
}

impl RenderState {
    pub fn opaque() -> Self {
        Self {
            blend: None,
            cull_mode: CullMode::Back,
            depth_test: true,
            depth_write: true,
        }
    }

    pub fn transparent() -> Self {
        Self {
            blend: Some(BlendState::ALPHA_BLENDING),
            cull_mode: CullMode::Back,
            depth_test: true,
            depth_write: false,
        }
    }
}

/// Immediate-mode GPU API
///
/// Mirrors the shape of a GL context: state is bound and then consumed by later
/// calls, uniform uploads target the currently bound program, and texture binds
/// target the active texture unit.
pub trait RenderDevice {
    /// True once the device can no longer render
    fn is_context_lost(&self) -> bool;

    // Programs

    fn create_program(&mut self, vertex_source: &str, fragment_source: &str)
        -> GpuResult<ProgramHandle>;
    fn delete_program(&mut self, program: ProgramHandle);
    fn active_uniforms(&self, program: ProgramHandle) -> GpuResult<Vec<ActiveUniform>>;
    fn active_attributes(&self, program: ProgramHandle) -> GpuResult<Vec<ActiveAttribute>>;
    fn use_program(&mut self, program: ProgramHandle);
    fn current_program(&self) -> Option<ProgramHandle>;

    // Uniforms (target the current program)

    fn uniform1f(&mut self, location: UniformLocation, x: f32);
    fn uniform1fv(&mut self, location: UniformLocation, values: &[f32]);
    fn uniform1i(&mut self, location: UniformLocation, x: i32);
    fn uniform1iv(&mut self, location: UniformLocation, values: &[i32]);
    fn uniform2f(&mut self, location: UniformLocation, x: f32, y: f32);
    fn uniform2fv(&mut self, location: UniformLocation, values: &[f32]);
    fn uniform2i(&mut self, location: UniformLocation, x: i32, y: i32);
    fn uniform2iv(&mut self, location: UniformLocation, values: &[i32]);
    fn uniform3f(&mut self, location: UniformLocation, x: f32, y: f32, z: f32);
    fn uniform3fv(&mut self, location: UniformLocation, values: &[f32]);
    fn uniform3i(&mut self, location: UniformLocation, x: i32, y: i32, z: i32);
    fn uniform3iv(&mut self, location: UniformLocation, values: &[i32]);
    fn uniform4f(&mut self, location: UniformLocation, x: f32, y: f32, z: f32, w: f32);
    fn uniform4fv(&mut self, location: UniformLocation, values: &[f32]);
    fn uniform4i(&mut self, location: UniformLocation, x: i32, y: i32, z: i32, w: i32);
    fn uniform4iv(&mut self, location: UniformLocation, values: &[i32]);
    fn uniform_matrix4fv(&mut self, location: UniformLocation, transpose: bool, values: &[f32]);

    // Textures

    fn create_texture(&mut self, desc: &TextureDesc) -> GpuResult<TextureHandle>;
    fn delete_texture(&mut self, texture: TextureHandle);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, texture: TextureHandle);

    // Buffers

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> GpuResult<BufferHandle>;
    fn update_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GpuResult<()>;
    fn delete_buffer(&mut self, buffer: BufferHandle);
    fn bind_vertex_buffer(&mut self, location: u32, buffer: BufferHandle, format: VertexFormat);
    fn bind_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    // Drawing

    /// Draw indexed primitives; `offset` is in bytes into the index buffer
    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        offset: u32,
        format: IndexFormat,
    );
    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32);
    fn apply_render_state(&mut self, state: &RenderState);
    fn clear(&mut self, color: Color);
    fn viewport(&mut self, x: u32, y: u32, width: u32, height: u32);
    fn viewport_size(&self) -> (u32, u32);
}
