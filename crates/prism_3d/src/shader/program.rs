//! Linked shader programs

use prism_gpu::{ActiveAttribute, ProgramHandle, RenderDevice};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error};

use super::data::ShaderData;
use super::uniform::{ShaderUniform, ShaderUniformBlock, UniformBlockKind};
use crate::materials::MaterialId;
use crate::scene::Entity;

static NEXT_PROGRAM_ID: AtomicU32 = AtomicU32::new(0);

/// Build state of a program
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramState {
    Uncompiled,
    Linking,
    Valid,
    Invalid,
}

/// What was last uploaded to a program, used to skip redundant block uploads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ProgramMarkers {
    pub frame: Option<u64>,
    pub camera: Option<Entity>,
    pub renderer: Option<Entity>,
    pub material: Option<MaterialId>,
}

/// A compiled vertex/fragment pair and its uniforms, filed by update frequency
#[derive(Debug)]
pub struct ShaderProgram {
    id: u32,
    handle: Option<ProgramHandle>,
    state: ProgramState,
    scene_block: ShaderUniformBlock,
    camera_block: ShaderUniformBlock,
    renderer_block: ShaderUniformBlock,
    material_block: ShaderUniformBlock,
    other_block: ShaderUniformBlock,
    attributes: Vec<ActiveAttribute>,
    texture_unit_count: u32,
    pub(crate) markers: ProgramMarkers,
}

impl ShaderProgram {
    /// Compile and link a program
    ///
    /// Never fails: a program that does not build is logged and left invalid.
    pub fn new(device: &mut dyn RenderDevice, vertex_source: &str, fragment_source: &str) -> Self {
        let mut program = Self {
            id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
            handle: None,
            state: ProgramState::Uncompiled,
            scene_block: ShaderUniformBlock::default(),
            camera_block: ShaderUniformBlock::default(),
            renderer_block: ShaderUniformBlock::default(),
            material_block: ShaderUniformBlock::default(),
            other_block: ShaderUniformBlock::default(),
            attributes: Vec::new(),
            texture_unit_count: 0,
            markers: ProgramMarkers::default(),
        };
        program.link(device, vertex_source, fragment_source);
        program
    }

    fn link(&mut self, device: &mut dyn RenderDevice, vertex_source: &str, fragment_source: &str) {
        self.state = ProgramState::Linking;

        let handle = match device.create_program(vertex_source, fragment_source) {
            Ok(handle) => handle,
            Err(e) => {
                error!(program = self.id, "shader program failed to build:\n{e}");
                self.state = ProgramState::Invalid;
                return;
            }
        };

        let interface = device
            .active_uniforms(handle)
            .and_then(|u| device.active_attributes(handle).map(|a| (u, a)));
        let (uniforms, attributes) = match interface {
            Ok(interface) => interface,
            Err(e) => {
                error!(program = self.id, "failed to query program interface: {e}");
                device.delete_program(handle);
                self.state = ProgramState::Invalid;
                return;
            }
        };

        self.handle = Some(handle);
        self.attributes = attributes;

        // Sampler uniforms get fixed texture units for the program's lifetime
        device.use_program(handle);
        for active in &uniforms {
            let mut uniform = ShaderUniform::new(active);
            if uniform.kind().is_texture() {
                let first = self.texture_unit_count;
                let units: Vec<u32> = (first..first + active.size).collect();
                self.texture_unit_count += active.size;
                if units.len() == 1 {
                    device.uniform1i(uniform.location(), first as i32);
                } else {
                    let values: Vec<i32> = units.iter().map(|&u| u as i32).collect();
                    device.uniform1iv(uniform.location(), &values);
                }
                uniform.set_texture_units(units);
            }
            let kind = UniformBlockKind::of(uniform.property());
            self.block_mut(kind).push(uniform);
        }

        self.state = ProgramState::Valid;
        debug!(
            program = self.id,
            uniforms = uniforms.len(),
            attributes = self.attributes.len(),
            texture_units = self.texture_unit_count,
            "linked shader program"
        );
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.handle
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == ProgramState::Valid
    }

    /// Make this the current program; false if the program is not usable
    ///
    /// `use_program` is only issued when another program is current.
    pub fn bind(&self, device: &mut dyn RenderDevice) -> bool {
        let Some(handle) = self.handle.filter(|_| self.is_valid()) else {
            return false;
        };
        if device.current_program() != Some(handle) {
            device.use_program(handle);
        }
        true
    }

    /// Delete the device program; safe to call repeatedly
    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        if let Some(handle) = self.handle.take() {
            device.delete_program(handle);
        }
        self.state = ProgramState::Invalid;
        self.markers = ProgramMarkers::default();
    }

    pub fn block(&self, kind: UniformBlockKind) -> &ShaderUniformBlock {
        match kind {
            UniformBlockKind::Scene => &self.scene_block,
            UniformBlockKind::Camera => &self.camera_block,
            UniformBlockKind::Renderer => &self.renderer_block,
            UniformBlockKind::Material => &self.material_block,
            UniformBlockKind::Other => &self.other_block,
        }
    }

    fn block_mut(&mut self, kind: UniformBlockKind) -> &mut ShaderUniformBlock {
        match kind {
            UniformBlockKind::Scene => &mut self.scene_block,
            UniformBlockKind::Camera => &mut self.camera_block,
            UniformBlockKind::Renderer => &mut self.renderer_block,
            UniformBlockKind::Material => &mut self.material_block,
            UniformBlockKind::Other => &mut self.other_block,
        }
    }

    /// Find a uniform in any block
    pub fn uniform(&self, name: &str) -> Option<&ShaderUniform> {
        [
            UniformBlockKind::Scene,
            UniformBlockKind::Camera,
            UniformBlockKind::Renderer,
            UniformBlockKind::Material,
            UniformBlockKind::Other,
        ]
        .into_iter()
        .find_map(|kind| self.block(kind).get(name))
    }

    pub fn attributes(&self) -> &[ActiveAttribute] {
        &self.attributes
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    pub fn texture_unit_count(&self) -> u32 {
        self.texture_unit_count
    }

    /// Move uniforms out of the Other block once their properties have a group
    ///
    /// A program can link before any data names its properties, so this runs
    /// before uploads.
    pub fn group_other_uniforms(&mut self) {
        if self.other_block.is_empty() {
            return;
        }
        let pending: Vec<ShaderUniform> = self.other_block.drain().collect();
        for uniform in pending {
            let kind = UniformBlockKind::of(uniform.property());
            self.block_mut(kind).push(uniform);
        }
    }

    /// Upload constants and textures of one block
    pub fn upload_all(
        &mut self,
        device: &mut dyn RenderDevice,
        kind: UniformBlockKind,
        data: &ShaderData,
    ) {
        self.block_mut(kind).upload_all(device, data);
    }

    pub fn upload_uniforms(
        &mut self,
        device: &mut dyn RenderDevice,
        kind: UniformBlockKind,
        data: &ShaderData,
    ) {
        self.block_mut(kind).upload_uniforms(device, data);
    }

    /// Rebind textures of one block, e.g. after switching programs
    pub fn upload_textures(
        &mut self,
        device: &mut dyn RenderDevice,
        kind: UniformBlockKind,
        data: &ShaderData,
    ) {
        self.block_mut(kind).upload_textures(device, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderDataGroup;
    use prism_core::Mat4;
    use prism_gpu::{GpuCall, HeadlessDevice};

    const VS: &str = r#"
struct VertexInput {
    @location(0) POSITION: vec3<f32>,
    @location(1) TEXCOORD_0: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@group(0) @binding(0) var<uniform> test_program_viewMat: mat4x4<f32>;
@group(0) @binding(1) var<uniform> test_program_late: f32;

@vertex
fn vs_main(v: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip = test_program_viewMat * vec4<f32>(v.POSITION * test_program_late, 1.0);
    out.uv = v.TEXCOORD_0;
    return out;
}
"#;

    const FS: &str = r#"
@group(1) @binding(0) var test_program_texture: texture_2d<f32>;
@group(1) @binding(1) var test_program_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(test_program_texture, test_program_sampler, uv);
}
"#;

    /// Program sources with uniform names unique to one test
    fn sources(prefix: &str) -> (String, String) {
        (VS.replace("test_program", prefix), FS.replace("test_program", prefix))
    }

    #[test]
    fn test_link_files_uniforms_by_group() {
        let (vs, fs) = sources("test_link_groups");
        let mut camera_data = ShaderData::new(ShaderDataGroup::Camera);
        camera_data
            .set_matrix("test_link_groups_viewMat", Mat4::IDENTITY)
            .unwrap();

        let mut device = HeadlessDevice::default();
        let mut program = ShaderProgram::new(&mut device, &vs, &fs);
        assert!(program.is_valid());
        assert_eq!(program.attribute_location("TEXCOORD_0"), Some(1));

        let camera = program.block(UniformBlockKind::Camera);
        assert_eq!(camera.const_uniforms().len(), 1);
        // Never written yet, so it has no group
        assert!(program
            .block(UniformBlockKind::Other)
            .get("test_link_groups_late")
            .is_some());

        device.clear_calls();
        program.upload_all(&mut device, UniformBlockKind::Camera, &camera_data);
        assert_eq!(
            device.count_calls(|c| matches!(c, GpuCall::UniformMatrix4fv { .. })),
            1
        );
        assert_eq!(device.stats().total, 1);
    }

    #[test]
    fn test_group_other_uniforms() {
        let (vs, fs) = sources("test_regroup");
        let mut device = HeadlessDevice::default();
        let mut program = ShaderProgram::new(&mut device, &vs, &fs);
        assert!(program.block(UniformBlockKind::Other).get("test_regroup_late").is_some());

        let mut renderer_data = ShaderData::new(ShaderDataGroup::Renderer);
        renderer_data.set_float("test_regroup_late", 1.0).unwrap();
        program.group_other_uniforms();

        assert!(program.block(UniformBlockKind::Other).get("test_regroup_late").is_none());
        assert!(program
            .block(UniformBlockKind::Renderer)
            .get("test_regroup_late")
            .is_some());
    }

    #[test]
    fn test_texture_units_assigned_at_link() {
        let (vs, fs) = sources("test_units");
        let mut device = HeadlessDevice::default();
        let program = ShaderProgram::new(&mut device, &vs, &fs);
        let texture = program.uniform("test_units_texture").unwrap();
        assert_eq!(texture.texture_unit(), Some(0));
        assert_eq!(program.texture_unit_count(), 1);
        assert!(device
            .calls()
            .contains(&GpuCall::Uniform1i(texture.location(), 0)));
    }

    #[test]
    fn test_link_failure_leaves_program_invalid() {
        let mut device = HeadlessDevice::default();
        let mut program = ShaderProgram::new(&mut device, "fn broken(", FS);
        assert!(!program.is_valid());
        assert_eq!(program.state(), ProgramState::Invalid);
        assert!(!program.bind(&mut device));

        // Destroying an invalid program is harmless
        program.destroy(&mut device);
        program.destroy(&mut device);
        assert_eq!(device.program_count(), 0);
    }

    #[test]
    fn test_bind_skips_redundant_use() {
        let (vs, fs) = sources("test_bind");
        let mut device = HeadlessDevice::default();
        let program = ShaderProgram::new(&mut device, &vs, &fs);
        device.clear_calls();

        assert!(program.bind(&mut device));
        assert!(device.calls().is_empty());

        let other = ShaderProgram::new(&mut device, &vs, &fs);
        assert!(other.bind(&mut device));
        device.clear_calls();
        assert!(program.bind(&mut device));
        assert_eq!(device.calls(), &[GpuCall::UseProgram(program.handle().unwrap())]);
    }
}
