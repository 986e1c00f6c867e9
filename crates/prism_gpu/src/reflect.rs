//! WGSL program reflection
//!
//! Reports a program's uniforms and vertex attributes the way a GL driver reports
//! active uniforms: every `var<uniform>` global becomes one uniform (struct
//! uniforms are flattened into one uniform per member), every texture binding
//! becomes a sampler uniform, and every `@location` input of the vertex entry
//! point becomes an attribute. Sampler objects themselves are not reported.

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{
    AddressSpace, ArraySize, Binding, Handle, ImageClass, ImageDimension, Module, ScalarKind,
    ShaderStage, Type, TypeInner, VectorSize,
};
use rustc_hash::FxHashSet;
use tracing::warn;

use crate::device::{ActiveAttribute, ActiveUniform, AttributeType, UniformLocation, UniformType};
use crate::error::{GpuError, GpuResult};

/// Interface of a linked vertex + fragment program
#[derive(Clone, Debug, Default)]
pub struct ProgramReflection {
    pub uniforms: Vec<ActiveUniform>,
    pub attributes: Vec<ActiveAttribute>,
}

/// Parse, validate and reflect a vertex/fragment WGSL pair
pub fn reflect_program(vertex_source: &str, fragment_source: &str) -> GpuResult<ProgramReflection> {
    let vertex = parse_stage("vertex", vertex_source)?;
    let fragment = parse_stage("fragment", fragment_source)?;

    let vertex_entry = vertex
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Vertex)
        .ok_or(GpuError::MissingEntryPoint("vertex"))?;
    if !fragment
        .entry_points
        .iter()
        .any(|ep| ep.stage == ShaderStage::Fragment)
    {
        return Err(GpuError::MissingEntryPoint("fragment"));
    }

    let mut uniforms = Vec::new();
    let mut seen = FxHashSet::default();
    for module in [&vertex, &fragment] {
        for (name, ty, size) in module_uniforms(module) {
            // Uniforms shared by both stages are one uniform after linking
            if seen.insert(name.clone()) {
                uniforms.push(ActiveUniform {
                    name,
                    location: UniformLocation(uniforms.len() as u32),
                    ty,
                    size,
                });
            }
        }
    }

    let mut attributes = Vec::new();
    for argument in &vertex_entry.function.arguments {
        match &vertex.types[argument.ty].inner {
            TypeInner::Struct { members, .. } => {
                for member in members {
                    push_attribute(&vertex, member.name.as_deref(), member.ty, &member.binding, &mut attributes);
                }
            }
            _ => push_attribute(
                &vertex,
                argument.name.as_deref(),
                argument.ty,
                &argument.binding,
                &mut attributes,
            ),
        }
    }
    attributes.sort_by_key(|a| a.location);

    Ok(ProgramReflection {
        uniforms,
        attributes,
    })
}

fn parse_stage(stage: &'static str, source: &str) -> GpuResult<Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| GpuError::ShaderParse {
        stage,
        message: e.emit_to_string(source),
    })?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| GpuError::ShaderValidation {
            stage,
            message: e.emit_to_string(source),
        })?;

    Ok(module)
}

fn module_uniforms(module: &Module) -> Vec<(String, UniformType, u32)> {
    let mut out = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(name) = var.name.as_deref() else {
            continue;
        };
        match var.space {
            AddressSpace::Uniform => match &module.types[var.ty].inner {
                TypeInner::Struct { members, .. } => {
                    for member in members {
                        if let Some(member_name) = member.name.as_deref() {
                            push_value_uniform(module, member_name, member.ty, &mut out);
                        }
                    }
                }
                _ => push_value_uniform(module, name, var.ty, &mut out),
            },
            AddressSpace::Handle => push_texture_uniform(module, name, var.ty, &mut out),
            _ => {}
        }
    }
    out
}

fn push_value_uniform(
    module: &Module,
    name: &str,
    ty: Handle<Type>,
    out: &mut Vec<(String, UniformType, u32)>,
) {
    let (base, size) = match &module.types[ty].inner {
        TypeInner::Array {
            base,
            size: ArraySize::Constant(len),
            ..
        } => (*base, len.get()),
        _ => (ty, 1),
    };

    match value_type(&module.types[base].inner) {
        Some(uniform_type) => out.push((name.to_string(), uniform_type, size)),
        None => warn!(uniform = name, "skipping uniform of unsupported type"),
    }
}

fn push_texture_uniform(
    module: &Module,
    name: &str,
    ty: Handle<Type>,
    out: &mut Vec<(String, UniformType, u32)>,
) {
    let (base, size) = match &module.types[ty].inner {
        TypeInner::BindingArray {
            base,
            size: ArraySize::Constant(len),
        } => (*base, len.get()),
        _ => (ty, 1),
    };

    match &module.types[base].inner {
        TypeInner::Image {
            dim,
            arrayed,
            class,
        } => match image_type(*dim, *arrayed, class) {
            Some(uniform_type) => out.push((name.to_string(), uniform_type, size)),
            None => warn!(uniform = name, "skipping unsupported texture binding"),
        },
        // Sampler objects pair with a texture and do not take a unit of their own
        TypeInner::Sampler { .. } => {}
        _ => warn!(uniform = name, "skipping unsupported handle binding"),
    }
}

fn value_type(inner: &TypeInner) -> Option<UniformType> {
    match inner {
        TypeInner::Scalar(scalar) => scalar_uniform(scalar.kind, 1),
        TypeInner::Vector { size, scalar } => scalar_uniform(scalar.kind, vector_len(*size)),
        TypeInner::Matrix { columns, rows, .. } => match (columns, rows) {
            (VectorSize::Bi, VectorSize::Bi) => Some(UniformType::Mat2),
            (VectorSize::Tri, VectorSize::Tri) => Some(UniformType::Mat3),
            (VectorSize::Quad, VectorSize::Quad) => Some(UniformType::Mat4),
            _ => None,
        },
        _ => None,
    }
}

fn scalar_uniform(kind: ScalarKind, len: u32) -> Option<UniformType> {
    match (kind, len) {
        (ScalarKind::Float, 1) => Some(UniformType::Float),
        (ScalarKind::Float, 2) => Some(UniformType::Vec2),
        (ScalarKind::Float, 3) => Some(UniformType::Vec3),
        (ScalarKind::Float, 4) => Some(UniformType::Vec4),
        (ScalarKind::Sint, 1) => Some(UniformType::Int),
        (ScalarKind::Uint, 1) => Some(UniformType::UInt),
        (ScalarKind::Sint | ScalarKind::Uint, 2) => Some(UniformType::IVec2),
        (ScalarKind::Sint | ScalarKind::Uint, 3) => Some(UniformType::IVec3),
        (ScalarKind::Sint | ScalarKind::Uint, 4) => Some(UniformType::IVec4),
        (ScalarKind::Bool, 1) => Some(UniformType::Bool),
        _ => None,
    }
}

fn image_type(dim: ImageDimension, arrayed: bool, class: &ImageClass) -> Option<UniformType> {
    match class {
        ImageClass::Depth { .. } => Some(UniformType::Sampler2DShadow),
        ImageClass::Sampled { .. } => match (dim, arrayed) {
            (ImageDimension::D2, false) => Some(UniformType::Sampler2D),
            (ImageDimension::D2, true) => Some(UniformType::Sampler2DArray),
            (ImageDimension::D3, _) => Some(UniformType::Sampler3D),
            (ImageDimension::Cube, _) => Some(UniformType::SamplerCube),
            _ => None,
        },
        _ => None,
    }
}

fn attribute_type(inner: &TypeInner) -> Option<AttributeType> {
    let (kind, len) = match inner {
        TypeInner::Scalar(scalar) => (scalar.kind, 1),
        TypeInner::Vector { size, scalar } => (scalar.kind, vector_len(*size)),
        _ => return None,
    };
    match (kind, len) {
        (ScalarKind::Float, 1) => Some(AttributeType::Float),
        (ScalarKind::Float, 2) => Some(AttributeType::Vec2),
        (ScalarKind::Float, 3) => Some(AttributeType::Vec3),
        (ScalarKind::Float, 4) => Some(AttributeType::Vec4),
        (ScalarKind::Sint | ScalarKind::Uint, 1) => Some(AttributeType::Int),
        (ScalarKind::Sint | ScalarKind::Uint, 2) => Some(AttributeType::IVec2),
        (ScalarKind::Sint | ScalarKind::Uint, 3) => Some(AttributeType::IVec3),
        (ScalarKind::Sint | ScalarKind::Uint, 4) => Some(AttributeType::IVec4),
        _ => None,
    }
}

fn push_attribute(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: &Option<Binding>,
    out: &mut Vec<ActiveAttribute>,
) {
    let (Some(name), Some(Binding::Location { location, .. })) = (name, binding) else {
        return;
    };
    match attribute_type(&module.types[ty].inner) {
        Some(attribute_type) => out.push(ActiveAttribute {
            name: name.to_string(),
            location: *location,
            ty: attribute_type,
        }),
        None => warn!(attribute = name, "skipping vertex input of unsupported type"),
    }
}

fn vector_len(size: VectorSize) -> u32 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
@group(0) @binding(0) var<uniform> u_MVPMat: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_time: f32;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) POSITION: vec3<f32>, @location(1) TEXCOORD_0: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = u_MVPMat * vec4<f32>(POSITION, 1.0);
    out.uv = TEXCOORD_0 + vec2<f32>(u_time, 0.0);
    return out;
}
"#;

    const FRAGMENT: &str = r#"
struct Material {
    u_baseColor: vec4<f32>,
    u_tiling: vec2<f32>,
}

@group(0) @binding(1) var<uniform> u_time: f32;
@group(1) @binding(0) var<uniform> material: Material;
@group(1) @binding(1) var u_baseTexture: texture_2d<f32>;
@group(1) @binding(2) var u_baseSampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(u_baseTexture, u_baseSampler, uv * material.u_tiling);
    return color * material.u_baseColor * u_time;
}
"#;

    #[test]
    fn test_reflect_uniforms() {
        let reflection = reflect_program(VERTEX, FRAGMENT).unwrap();
        let names: Vec<_> = reflection.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            ["u_MVPMat", "u_time", "u_baseColor", "u_tiling", "u_baseTexture"]
        );

        let texture = &reflection.uniforms[4];
        assert_eq!(texture.ty, UniformType::Sampler2D);
        assert_eq!(texture.location, UniformLocation(4));
        assert_eq!(reflection.uniforms[0].ty, UniformType::Mat4);
        assert_eq!(reflection.uniforms[3].ty, UniformType::Vec2);
    }

    #[test]
    fn test_reflect_attributes() {
        let reflection = reflect_program(VERTEX, FRAGMENT).unwrap();
        assert_eq!(reflection.attributes.len(), 2);
        assert_eq!(reflection.attributes[0].name, "POSITION");
        assert_eq!(reflection.attributes[0].ty, AttributeType::Vec3);
        assert_eq!(reflection.attributes[1].name, "TEXCOORD_0");
        assert_eq!(reflection.attributes[1].location, 1);
    }

    #[test]
    fn test_parse_error() {
        let err = reflect_program("fn broken( {", FRAGMENT).unwrap_err();
        assert!(matches!(err, GpuError::ShaderParse { stage: "vertex", .. }));
    }

    #[test]
    fn test_missing_entry_point() {
        let err = reflect_program(FRAGMENT, FRAGMENT).unwrap_err();
        assert!(matches!(err, GpuError::MissingEntryPoint("vertex")));
    }
}
