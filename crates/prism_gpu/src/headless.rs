//! Headless recording device
//!
//! Implements [`RenderDevice`] without touching a GPU. Programs are really parsed
//! and validated (see [`reflect`](crate::reflect)), resources are tracked in slot
//! maps, and every state-changing call is appended to a [`GpuCall`] log that tests
//! and tools can inspect.

use prism_core::Color;
use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::device::{
    ActiveAttribute, ActiveUniform, BufferHandle, BufferKind, IndexFormat, PrimitiveTopology,
    ProgramHandle, RenderDevice, RenderState, TextureDesc, TextureHandle, UniformLocation,
    VertexFormat,
};
use crate::error::{GpuError, GpuResult};
use crate::reflect::{reflect_program, ProgramReflection};

/// One recorded device call
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCall {
    CreateProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),

    Uniform1f(UniformLocation, f32),
    Uniform1fv(UniformLocation, Vec<f32>),
    Uniform1i(UniformLocation, i32),
    Uniform1iv(UniformLocation, Vec<i32>),
    Uniform2f(UniformLocation, [f32; 2]),
    Uniform2fv(UniformLocation, Vec<f32>),
    Uniform2i(UniformLocation, [i32; 2]),
    Uniform2iv(UniformLocation, Vec<i32>),
    Uniform3f(UniformLocation, [f32; 3]),
    Uniform3fv(UniformLocation, Vec<f32>),
    Uniform3i(UniformLocation, [i32; 3]),
    Uniform3iv(UniformLocation, Vec<i32>),
    Uniform4f(UniformLocation, [f32; 4]),
    Uniform4fv(UniformLocation, Vec<f32>),
    Uniform4i(UniformLocation, [i32; 4]),
    Uniform4iv(UniformLocation, Vec<i32>),
    UniformMatrix4fv {
        location: UniformLocation,
        transpose: bool,
        values: Vec<f32>,
    },

    CreateTexture(TextureHandle),
    DeleteTexture(TextureHandle),
    ActiveTexture(u32),
    BindTexture(TextureHandle),

    CreateBuffer(BufferHandle, BufferKind, usize),
    UpdateBuffer(BufferHandle, usize, usize),
    DeleteBuffer(BufferHandle),
    BindVertexBuffer {
        location: u32,
        buffer: BufferHandle,
        format: VertexFormat,
    },
    BindIndexBuffer(BufferHandle, IndexFormat),

    DrawElements {
        topology: PrimitiveTopology,
        count: u32,
        offset: u32,
        format: IndexFormat,
    },
    DrawArrays {
        topology: PrimitiveTopology,
        first: u32,
        count: u32,
    },
    ApplyRenderState(RenderState),
    Clear(Color),
    Viewport(u32, u32, u32, u32),
}

impl GpuCall {
    /// True for any `uniform*` call
    pub fn is_uniform(&self) -> bool {
        matches!(
            self,
            GpuCall::Uniform1f(..)
                | GpuCall::Uniform1fv(..)
                | GpuCall::Uniform1i(..)
                | GpuCall::Uniform1iv(..)
                | GpuCall::Uniform2f(..)
                | GpuCall::Uniform2fv(..)
                | GpuCall::Uniform2i(..)
                | GpuCall::Uniform2iv(..)
                | GpuCall::Uniform3f(..)
                | GpuCall::Uniform3fv(..)
                | GpuCall::Uniform3i(..)
                | GpuCall::Uniform3iv(..)
                | GpuCall::Uniform4f(..)
                | GpuCall::Uniform4fv(..)
                | GpuCall::Uniform4i(..)
                | GpuCall::Uniform4iv(..)
                | GpuCall::UniformMatrix4fv { .. }
        )
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCall::DrawElements { .. } | GpuCall::DrawArrays { .. })
    }
}

/// Aggregate counts over a call log
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallStats {
    pub total: usize,
    pub uniform_uploads: usize,
    pub texture_binds: usize,
    pub program_switches: usize,
    pub draw_calls: usize,
}

impl CallStats {
    pub fn from_calls(calls: &[GpuCall]) -> Self {
        let mut stats = CallStats {
            total: calls.len(),
            ..Default::default()
        };
        for call in calls {
            if call.is_uniform() {
                stats.uniform_uploads += 1;
            } else if call.is_draw() {
                stats.draw_calls += 1;
            } else {
                match call {
                    GpuCall::BindTexture(_) => stats.texture_binds += 1,
                    GpuCall::UseProgram(_) => stats.program_switches += 1,
                    _ => {}
                }
            }
        }
        stats
    }
}

struct BufferInfo {
    kind: BufferKind,
    data: Vec<u8>,
}

/// Device that records calls instead of rendering
pub struct HeadlessDevice {
    programs: SlotMap<ProgramHandle, ProgramReflection>,
    textures: SlotMap<TextureHandle, TextureDesc>,
    buffers: SlotMap<BufferHandle, BufferInfo>,
    current_program: Option<ProgramHandle>,
    viewport: (u32, u32, u32, u32),
    context_lost: bool,
    calls: Vec<GpuCall>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl HeadlessDevice {
    /// Create a device with the given viewport size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            current_program: None,
            viewport: (0, 0, width, height),
            context_lost: false,
            calls: Vec::new(),
        }
    }

    /// Simulate losing (or restoring) the GPU context
    pub fn set_context_lost(&mut self, lost: bool) {
        self.context_lost = lost;
    }

    /// Get the recorded calls
    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    /// Take the recorded calls
    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    /// Clear the call log without touching device state
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Count the recorded calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn stats(&self) -> CallStats {
        CallStats::from_calls(&self.calls)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Contents of a buffer, if it exists
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.data.as_slice())
    }

    pub fn buffer_kind(&self, buffer: BufferHandle) -> Option<BufferKind> {
        self.buffers.get(buffer).map(|b| b.kind)
    }

    fn record(&mut self, call: GpuCall) {
        trace!(?call, "gpu call");
        self.calls.push(call);
    }
}

impl RenderDevice for HeadlessDevice {
    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> GpuResult<ProgramHandle> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        let reflection = reflect_program(vertex_source, fragment_source)?;
        debug!(
            uniforms = reflection.uniforms.len(),
            attributes = reflection.attributes.len(),
            "linked program"
        );
        let handle = self.programs.insert(reflection);
        self.record(GpuCall::CreateProgram(handle));
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(program).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.record(GpuCall::DeleteProgram(program));
        }
    }

    fn active_uniforms(&self, program: ProgramHandle) -> GpuResult<Vec<ActiveUniform>> {
        self.programs
            .get(program)
            .map(|p| p.uniforms.clone())
            .ok_or(GpuError::InvalidHandle("program"))
    }

    fn active_attributes(&self, program: ProgramHandle) -> GpuResult<Vec<ActiveAttribute>> {
        self.programs
            .get(program)
            .map(|p| p.attributes.clone())
            .ok_or(GpuError::InvalidHandle("program"))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.record(GpuCall::UseProgram(program));
    }

    fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    fn uniform1f(&mut self, location: UniformLocation, x: f32) {
        self.record(GpuCall::Uniform1f(location, x));
    }

    fn uniform1fv(&mut self, location: UniformLocation, values: &[f32]) {
        self.record(GpuCall::Uniform1fv(location, values.to_vec()));
    }

    fn uniform1i(&mut self, location: UniformLocation, x: i32) {
        self.record(GpuCall::Uniform1i(location, x));
    }

    fn uniform1iv(&mut self, location: UniformLocation, values: &[i32]) {
        self.record(GpuCall::Uniform1iv(location, values.to_vec()));
    }

    fn uniform2f(&mut self, location: UniformLocation, x: f32, y: f32) {
        self.record(GpuCall::Uniform2f(location, [x, y]));
    }

    fn uniform2fv(&mut self, location: UniformLocation, values: &[f32]) {
        self.record(GpuCall::Uniform2fv(location, values.to_vec()));
    }

    fn uniform2i(&mut self, location: UniformLocation, x: i32, y: i32) {
        self.record(GpuCall::Uniform2i(location, [x, y]));
    }

    fn uniform2iv(&mut self, location: UniformLocation, values: &[i32]) {
        self.record(GpuCall::Uniform2iv(location, values.to_vec()));
    }

    fn uniform3f(&mut self, location: UniformLocation, x: f32, y: f32, z: f32) {
        self.record(GpuCall::Uniform3f(location, [x, y, z]));
    }

    fn uniform3fv(&mut self, location: UniformLocation, values: &[f32]) {
        self.record(GpuCall::Uniform3fv(location, values.to_vec()));
    }

    fn uniform3i(&mut self, location: UniformLocation, x: i32, y: i32, z: i32) {
        self.record(GpuCall::Uniform3i(location, [x, y, z]));
    }

    fn uniform3iv(&mut self, location: UniformLocation, values: &[i32]) {
        self.record(GpuCall::Uniform3iv(location, values.to_vec()));
    }

    fn uniform4f(&mut self, location: UniformLocation, x: f32, y: f32, z: f32, w: f32) {
        self.record(GpuCall::Uniform4f(location, [x, y, z, w]));
    }

    fn uniform4fv(&mut self, location: UniformLocation, values: &[f32]) {
        self.record(GpuCall::Uniform4fv(location, values.to_vec()));
    }

    fn uniform4i(&mut self, location: UniformLocation, x: i32, y: i32, z: i32, w: i32) {
        self.record(GpuCall::Uniform4i(location, [x, y, z, w]));
    }

    fn uniform4iv(&mut self, location: UniformLocation, values: &[i32]) {
        self.record(GpuCall::Uniform4iv(location, values.to_vec()));
    }

    fn uniform_matrix4fv(&mut self, location: UniformLocation, transpose: bool, values: &[f32]) {
        self.record(GpuCall::UniformMatrix4fv {
            location,
            transpose,
            values: values.to_vec(),
        });
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GpuResult<TextureHandle> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        let handle = self.textures.insert(*desc);
        self.record(GpuCall::CreateTexture(handle));
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture).is_some() {
            self.record(GpuCall::DeleteTexture(texture));
        }
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(GpuCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: TextureHandle) {
        self.record(GpuCall::BindTexture(texture));
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> GpuResult<BufferHandle> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        let handle = self.buffers.insert(BufferInfo {
            kind,
            data: data.to_vec(),
        });
        self.record(GpuCall::CreateBuffer(handle, kind, data.len()));
        Ok(handle)
    }

    fn update_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GpuResult<()> {
        let info = self
            .buffers
            .get_mut(buffer)
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        let end = offset + data.len();
        if info.data.len() < end {
            info.data.resize(end, 0);
        }
        info.data[offset..end].copy_from_slice(data);
        self.record(GpuCall::UpdateBuffer(buffer, offset, data.len()));
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(buffer).is_some() {
            self.record(GpuCall::DeleteBuffer(buffer));
        }
    }

    fn bind_vertex_buffer(&mut self, location: u32, buffer: BufferHandle, format: VertexFormat) {
        self.record(GpuCall::BindVertexBuffer {
            location,
            buffer,
            format,
        });
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.record(GpuCall::BindIndexBuffer(buffer, format));
    }

    fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        count: u32,
        offset: u32,
        format: IndexFormat,
    ) {
        self.record(GpuCall::DrawElements {
            topology,
            count,
            offset,
            format,
        });
    }

    fn draw_arrays(&mut self, topology: PrimitiveTopology, first: u32, count: u32) {
        self.record(GpuCall::DrawArrays {
            topology,
            first,
            count,
        });
    }

    fn apply_render_state(&mut self, state: &RenderState) {
        self.record(GpuCall::ApplyRenderState(*state));
    }

    fn clear(&mut self, color: Color) {
        self.record(GpuCall::Clear(color));
    }

    fn viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = (x, y, width, height);
        self.record(GpuCall::Viewport(x, y, width, height));
    }

    fn viewport_size(&self) -> (u32, u32) {
        (self.viewport.2, self.viewport.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureFormat;

    const VS: &str = r#"
@group(0) @binding(0) var<uniform> u_MVPMat: mat4x4<f32>;

@vertex
fn vs_main(@location(0) POSITION: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u_MVPMat * vec4<f32>(POSITION, 1.0);
}
"#;

    const FS: &str = r#"
@group(1) @binding(0) var<uniform> u_baseColor: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u_baseColor;
}
"#;

    #[test]
    fn test_program_lifecycle() {
        let mut device = HeadlessDevice::default();
        let program = device.create_program(VS, FS).unwrap();
        assert_eq!(device.program_count(), 1);

        let uniforms = device.active_uniforms(program).unwrap();
        assert_eq!(uniforms.len(), 2);
        assert_eq!(device.active_attributes(program).unwrap()[0].name, "POSITION");

        device.use_program(program);
        assert_eq!(device.current_program(), Some(program));

        device.delete_program(program);
        assert_eq!(device.current_program(), None);
        assert!(device.active_uniforms(program).is_err());
    }

    #[test]
    fn test_records_uniform_calls() {
        let mut device = HeadlessDevice::default();
        device.uniform1f(UniformLocation(0), 2.0);
        device.uniform_matrix4fv(UniformLocation(1), false, &[0.0; 16]);
        device.draw_arrays(PrimitiveTopology::Triangles, 0, 3);

        let stats = device.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.uniform_uploads, 2);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(device.calls()[0], GpuCall::Uniform1f(UniformLocation(0), 2.0));
    }

    #[test]
    fn test_buffer_update() {
        let mut device = HeadlessDevice::default();
        let buffer = device.create_buffer(BufferKind::Vertex, &[1, 2, 3, 4]).unwrap();
        device.update_buffer(buffer, 2, &[9, 9, 9]).unwrap();
        assert_eq!(device.buffer_data(buffer), Some(&[1, 2, 9, 9, 9][..]));
    }

    #[test]
    fn test_context_lost() {
        let mut device = HeadlessDevice::default();
        device.set_context_lost(true);
        assert!(device.is_context_lost());
        assert!(matches!(device.create_program(VS, FS), Err(GpuError::ContextLost)));
        assert!(device
            .create_texture(&TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm))
            .is_err());
    }
}
