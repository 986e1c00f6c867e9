//! Typed shader values

use prism_core::{Color, Mat4, Vec2, Vec3, Vec4};
use prism_gpu::TextureHandle;

/// Value stored in [`ShaderData`](super::ShaderData)
#[derive(Clone, Debug, PartialEq)]
pub enum ShaderValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Color(Color),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Texture(TextureHandle),
    TextureArray(Vec<TextureHandle>),
}

impl ShaderValue {
    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            ShaderValue::Float(_) => "float",
            ShaderValue::Int(_) => "int",
            ShaderValue::Vec2(_) => "vec2",
            ShaderValue::Vec3(_) => "vec3",
            ShaderValue::Vec4(_) => "vec4",
            ShaderValue::Color(_) => "color",
            ShaderValue::Mat4(_) => "mat4",
            ShaderValue::FloatArray(_) => "float[]",
            ShaderValue::IntArray(_) => "int[]",
            ShaderValue::Texture(_) => "texture",
            ShaderValue::TextureArray(_) => "texture[]",
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, ShaderValue::Texture(_) | ShaderValue::TextureArray(_))
    }
}

impl From<f32> for ShaderValue {
    fn from(v: f32) -> Self {
        ShaderValue::Float(v)
    }
}

impl From<i32> for ShaderValue {
    fn from(v: i32) -> Self {
        ShaderValue::Int(v)
    }
}

impl From<Vec2> for ShaderValue {
    fn from(v: Vec2) -> Self {
        ShaderValue::Vec2(v)
    }
}

impl From<Vec3> for ShaderValue {
    fn from(v: Vec3) -> Self {
        ShaderValue::Vec3(v)
    }
}

impl From<Vec4> for ShaderValue {
    fn from(v: Vec4) -> Self {
        ShaderValue::Vec4(v)
    }
}

impl From<Color> for ShaderValue {
    fn from(v: Color) -> Self {
        ShaderValue::Color(v)
    }
}

impl From<Mat4> for ShaderValue {
    fn from(v: Mat4) -> Self {
        ShaderValue::Mat4(v)
    }
}

impl From<TextureHandle> for ShaderValue {
    fn from(v: TextureHandle) -> Self {
        ShaderValue::Texture(v)
    }
}
