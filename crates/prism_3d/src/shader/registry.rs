//! Shader sources, the shader registry and compiled program variants

use prism_gpu::RenderDevice;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::debug;

use super::macros::ShaderMacroCollection;
use super::preprocess::preprocess;
use super::program::ShaderProgram;
use crate::error::{Error, Result};

static SHADERS: LazyLock<Mutex<FxHashMap<String, Arc<Shader>>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

static NEXT_SHADER_ID: AtomicU32 = AtomicU32::new(0);

/// Name of the built-in unlit shader
pub const UNLIT_SHADER: &str = "unlit";

const UNLIT_VERTEX: &str = r#"
struct VertexInput {
    @location(0) POSITION: vec3<f32>,
    @location(1) TEXCOORD_0: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0) var<uniform> u_MVPMat: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_tilingOffset: vec4<f32>;

@vertex
fn vs_main(v: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u_MVPMat * vec4<f32>(v.POSITION, 1.0);
    out.uv = v.TEXCOORD_0 * u_tilingOffset.xy + u_tilingOffset.zw;
    return out;
}
"#;

const UNLIT_FRAGMENT: &str = r#"
@group(1) @binding(0) var<uniform> u_baseColor: vec4<f32>;
#ifdef HAS_BASE_TEXTURE
@group(1) @binding(1) var u_baseTexture: texture_2d<f32>;
@group(1) @binding(2) var u_baseSampler: sampler;
#endif

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    var color = u_baseColor;
#ifdef HAS_BASE_TEXTURE
    color = color * textureSample(u_baseTexture, u_baseSampler, uv);
#endif
    return color;
}
"#;

/// Named vertex/fragment source pair
///
/// Sources may contain `#ifdef` blocks; each distinct set of enabled macros
/// compiles to its own [`ShaderProgram`].
#[derive(Debug)]
pub struct Shader {
    id: u32,
    name: String,
    vertex_source: String,
    fragment_source: String,
}

impl Shader {
    /// Register a new shader
    pub fn create(
        name: &str,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Result<Arc<Shader>> {
        let mut shaders = SHADERS.lock().unwrap_or_else(PoisonError::into_inner);
        if shaders.contains_key(name) {
            return Err(Error::DuplicateShader(name.to_string()));
        }
        let shader = Arc::new(Shader {
            id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
        });
        shaders.insert(name.to_string(), shader.clone());
        debug!(shader = name, id = shader.id, "registered shader");
        Ok(shader)
    }

    /// Look up a registered shader
    pub fn find(name: &str) -> Option<Arc<Shader>> {
        SHADERS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The built-in unlit shader, registered on first use
    pub fn create_default() -> Arc<Shader> {
        let mut shaders = SHADERS.lock().unwrap_or_else(PoisonError::into_inner);
        shaders
            .entry(UNLIT_SHADER.to_string())
            .or_insert_with(|| {
                Arc::new(Shader {
                    id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
                    name: UNLIT_SHADER.to_string(),
                    vertex_source: UNLIT_VERTEX.to_string(),
                    fragment_source: UNLIT_FRAGMENT.to_string(),
                })
            })
            .clone()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    /// Compile the variant selected by `macros`, uncached
    pub fn compile(&self, device: &mut dyn RenderDevice, macros: &ShaderMacroCollection) -> ShaderProgram {
        let defines = macros.defines();
        let vertex = preprocess(&self.vertex_source, &defines);
        let fragment = preprocess(&self.fragment_source, &defines);
        debug!(shader = %self.name, macros = defines.len(), "compiling shader variant");
        ShaderProgram::new(device, &vertex, &fragment)
    }
}

/// Compiled program variants, keyed by shader and enabled macros
#[derive(Debug, Default)]
pub struct ShaderProgramPool {
    programs: FxHashMap<(u32, ShaderMacroCollection), ShaderProgram>,
}

impl ShaderProgramPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the program for a shader variant, compiling it on first use
    ///
    /// Failed builds are cached too, so a broken shader is reported once.
    pub fn get_program(
        &mut self,
        device: &mut dyn RenderDevice,
        shader: &Shader,
        macros: &ShaderMacroCollection,
    ) -> &mut ShaderProgram {
        self.programs
            .entry((shader.id(), macros.clone()))
            .or_insert_with(|| shader.compile(device, macros))
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Delete every program
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for program in self.programs.values_mut() {
            program.destroy(device);
        }
        self.programs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderMacro;
    use prism_gpu::HeadlessDevice;

    #[test]
    fn test_duplicate_name_errors() {
        Shader::create("test_shader_duplicate", UNLIT_VERTEX, UNLIT_FRAGMENT).unwrap();
        let err = Shader::create("test_shader_duplicate", UNLIT_VERTEX, UNLIT_FRAGMENT).unwrap_err();
        assert!(matches!(err, Error::DuplicateShader(name) if name == "test_shader_duplicate"));
        assert!(Shader::find("test_shader_duplicate").is_some());
    }

    #[test]
    fn test_create_default_is_idempotent() {
        let a = Shader::create_default();
        let b = Shader::create_default();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), UNLIT_SHADER);
    }

    #[test]
    fn test_macros_select_variant() {
        let shader = Shader::create_default();
        let mut device = HeadlessDevice::default();
        let mut pool = ShaderProgramPool::new();

        let plain = ShaderMacroCollection::new();
        let mut textured = ShaderMacroCollection::new();
        textured.enable(&ShaderMacro::get_by_name("HAS_BASE_TEXTURE"));

        let program = pool.get_program(&mut device, &shader, &plain);
        assert!(program.is_valid());
        assert!(program.uniform("u_baseTexture").is_none());

        let program = pool.get_program(&mut device, &shader, &textured);
        assert!(program.is_valid());
        assert!(program.uniform("u_baseTexture").is_some());

        // Cached
        pool.get_program(&mut device, &shader, &plain);
        assert_eq!(pool.len(), 2);
        assert_eq!(device.program_count(), 2);

        pool.destroy(&mut device);
        assert_eq!(device.program_count(), 0);
    }
}
