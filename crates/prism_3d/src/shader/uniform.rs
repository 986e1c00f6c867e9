//! Program uniforms and per-frequency uniform blocks

use prism_gpu::{ActiveUniform, RenderDevice, TextureHandle, UniformLocation, UniformType};
use smallvec::SmallVec;
use tracing::warn;

use super::data::ShaderData;
use super::property::{ShaderDataGroup, ShaderProperty};
use super::value::ShaderValue;

/// Device call used to upload a uniform, chosen once at link time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadKind {
    Float,
    FloatArray,
    Vec2,
    Vec2Array,
    Vec3,
    Vec3Array,
    Vec4,
    Vec4Array,
    Int,
    IntArray,
    IVec2,
    IVec2Array,
    IVec3,
    IVec3Array,
    IVec4,
    IVec4Array,
    Mat4,
    Texture,
    TextureArray,
    /// Reported by the device but not uploadable
    Unsupported,
}

impl UploadKind {
    pub fn from_uniform(ty: UniformType, size: u32) -> Self {
        let array = size > 1;
        match ty {
            UniformType::Float if array => UploadKind::FloatArray,
            UniformType::Float => UploadKind::Float,
            UniformType::Vec2 if array => UploadKind::Vec2Array,
            UniformType::Vec2 => UploadKind::Vec2,
            UniformType::Vec3 if array => UploadKind::Vec3Array,
            UniformType::Vec3 => UploadKind::Vec3,
            UniformType::Vec4 if array => UploadKind::Vec4Array,
            UniformType::Vec4 => UploadKind::Vec4,
            UniformType::Int | UniformType::UInt | UniformType::Bool if array => {
                UploadKind::IntArray
            }
            UniformType::Int | UniformType::UInt | UniformType::Bool => UploadKind::Int,
            UniformType::IVec2 if array => UploadKind::IVec2Array,
            UniformType::IVec2 => UploadKind::IVec2,
            UniformType::IVec3 if array => UploadKind::IVec3Array,
            UniformType::IVec3 => UploadKind::IVec3,
            UniformType::IVec4 if array => UploadKind::IVec4Array,
            UniformType::IVec4 => UploadKind::IVec4,
            // Matrix arrays go through the same call with a longer slice
            UniformType::Mat4 => UploadKind::Mat4,
            UniformType::Mat2 | UniformType::Mat3 => UploadKind::Unsupported,
            _ if ty.is_sampler() && array => UploadKind::TextureArray,
            _ if ty.is_sampler() => UploadKind::Texture,
            _ => UploadKind::Unsupported,
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, UploadKind::Texture | UploadKind::TextureArray)
    }
}

/// Last value sent for a scalar or vector uniform
#[derive(Clone, Copy, Debug, PartialEq)]
enum CachedValue {
    None,
    Float([f32; 4]),
    Int([i32; 4]),
}

/// One active uniform of a linked program
#[derive(Debug)]
pub struct ShaderUniform {
    name: String,
    property: ShaderProperty,
    location: UniformLocation,
    kind: UploadKind,
    size: u32,
    cache: CachedValue,
    texture_units: SmallVec<[u32; 1]>,
}

impl ShaderUniform {
    pub(crate) fn new(active: &ActiveUniform) -> Self {
        Self {
            name: active.name.clone(),
            property: ShaderProperty::get_by_name(&active.name),
            location: active.location,
            kind: UploadKind::from_uniform(active.ty, active.size),
            size: active.size,
            cache: CachedValue::None,
            texture_units: SmallVec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self) -> &ShaderProperty {
        &self.property
    }

    pub fn location(&self) -> UniformLocation {
        self.location
    }

    pub fn kind(&self) -> UploadKind {
        self.kind
    }

    /// Array length, 1 for non-arrays
    pub fn size(&self) -> u32 {
        self.size
    }

    /// First texture unit of a sampler uniform
    pub fn texture_unit(&self) -> Option<u32> {
        self.texture_units.first().copied()
    }

    pub fn texture_units(&self) -> &[u32] {
        &self.texture_units
    }

    pub(crate) fn set_texture_units(&mut self, units: impl IntoIterator<Item = u32>) {
        self.texture_units = units.into_iter().collect();
    }

    /// Upload a stored value with the call selected at link time
    ///
    /// A value whose type does not fit the uniform is logged and skipped.
    pub fn upload(&mut self, device: &mut dyn RenderDevice, value: &ShaderValue) {
        match (self.kind, value) {
            (UploadKind::Float, ShaderValue::Float(v)) => self.upload_1f(device, *v),
            (UploadKind::FloatArray, ShaderValue::FloatArray(v)) => self.upload_1fv(device, v),
            (UploadKind::Vec2, ShaderValue::Vec2(v)) => self.upload_2f(device, v.x, v.y),
            (UploadKind::Vec2Array, ShaderValue::FloatArray(v)) => self.upload_2fv(device, v),
            (UploadKind::Vec3, ShaderValue::Vec3(v)) => self.upload_3f(device, v.x, v.y, v.z),
            (UploadKind::Vec3Array, ShaderValue::FloatArray(v)) => self.upload_3fv(device, v),
            (UploadKind::Vec4, ShaderValue::Vec4(v)) => self.upload_4f(device, v.x, v.y, v.z, v.w),
            (UploadKind::Vec4, ShaderValue::Color(c)) => self.upload_4f(device, c.r, c.g, c.b, c.a),
            (UploadKind::Vec4Array, ShaderValue::FloatArray(v)) => self.upload_4fv(device, v),
            (UploadKind::Int, ShaderValue::Int(v)) => self.upload_1i(device, *v),
            (UploadKind::IntArray, ShaderValue::IntArray(v)) => self.upload_1iv(device, v),
            (UploadKind::IVec2, ShaderValue::IntArray(v)) if v.len() >= 2 => {
                self.upload_2i(device, v[0], v[1])
            }
            (UploadKind::IVec2Array, ShaderValue::IntArray(v)) => self.upload_2iv(device, v),
            (UploadKind::IVec3, ShaderValue::IntArray(v)) if v.len() >= 3 => {
                self.upload_3i(device, v[0], v[1], v[2])
            }
            (UploadKind::IVec3Array, ShaderValue::IntArray(v)) => self.upload_3iv(device, v),
            (UploadKind::IVec4, ShaderValue::IntArray(v)) if v.len() >= 4 => {
                self.upload_4i(device, v[0], v[1], v[2], v[3])
            }
            (UploadKind::IVec4Array, ShaderValue::IntArray(v)) => self.upload_4iv(device, v),
            (UploadKind::Mat4, ShaderValue::Mat4(m)) => {
                device.uniform_matrix4fv(self.location, false, &m.to_cols_array())
            }
            (UploadKind::Mat4, ShaderValue::FloatArray(v)) => {
                device.uniform_matrix4fv(self.location, false, v)
            }
            (UploadKind::Texture, ShaderValue::Texture(t)) => self.upload_texture(device, *t),
            (UploadKind::TextureArray, ShaderValue::TextureArray(t)) => {
                self.upload_texture_array(device, t)
            }
            (kind, value) => warn!(
                uniform = %self.name,
                expected = ?kind,
                found = value.type_name(),
                "shader value does not match uniform type, skipping"
            ),
        }
    }

    fn cache_float(&mut self, value: [f32; 4]) -> bool {
        let next = CachedValue::Float(value);
        if self.cache == next {
            return false;
        }
        self.cache = next;
        true
    }

    fn cache_int(&mut self, value: [i32; 4]) -> bool {
        let next = CachedValue::Int(value);
        if self.cache == next {
            return false;
        }
        self.cache = next;
        true
    }

    pub fn upload_1f(&mut self, device: &mut dyn RenderDevice, x: f32) {
        if self.cache_float([x, 0.0, 0.0, 0.0]) {
            device.uniform1f(self.location, x);
        }
    }

    pub fn upload_1fv(&mut self, device: &mut dyn RenderDevice, values: &[f32]) {
        device.uniform1fv(self.location, values);
    }

    pub fn upload_2f(&mut self, device: &mut dyn RenderDevice, x: f32, y: f32) {
        if self.cache_float([x, y, 0.0, 0.0]) {
            device.uniform2f(self.location, x, y);
        }
    }

    pub fn upload_2fv(&mut self, device: &mut dyn RenderDevice, values: &[f32]) {
        device.uniform2fv(self.location, values);
    }

    pub fn upload_3f(&mut self, device: &mut dyn RenderDevice, x: f32, y: f32, z: f32) {
        if self.cache_float([x, y, z, 0.0]) {
            device.uniform3f(self.location, x, y, z);
        }
    }

    pub fn upload_3fv(&mut self, device: &mut dyn RenderDevice, values: &[f32]) {
        device.uniform3fv(self.location, values);
    }

    pub fn upload_4f(&mut self, device: &mut dyn RenderDevice, x: f32, y: f32, z: f32, w: f32) {
        if self.cache_float([x, y, z, w]) {
            device.uniform4f(self.location, x, y, z, w);
        }
    }

    pub fn upload_4fv(&mut self, device: &mut dyn RenderDevice, values: &[f32]) {
        device.uniform4fv(self.location, values);
    }

    pub fn upload_1i(&mut self, device: &mut dyn RenderDevice, x: i32) {
        if self.cache_int([x, 0, 0, 0]) {
            device.uniform1i(self.location, x);
        }
    }

    pub fn upload_1iv(&mut self, device: &mut dyn RenderDevice, values: &[i32]) {
        device.uniform1iv(self.location, values);
    }

    pub fn upload_2i(&mut self, device: &mut dyn RenderDevice, x: i32, y: i32) {
        if self.cache_int([x, y, 0, 0]) {
            device.uniform2i(self.location, x, y);
        }
    }

    pub fn upload_2iv(&mut self, device: &mut dyn RenderDevice, values: &[i32]) {
        device.uniform2iv(self.location, values);
    }

    pub fn upload_3i(&mut self, device: &mut dyn RenderDevice, x: i32, y: i32, z: i32) {
        if self.cache_int([x, y, z, 0]) {
            device.uniform3i(self.location, x, y, z);
        }
    }

    pub fn upload_3iv(&mut self, device: &mut dyn RenderDevice, values: &[i32]) {
        device.uniform3iv(self.location, values);
    }

    pub fn upload_4i(&mut self, device: &mut dyn RenderDevice, x: i32, y: i32, z: i32, w: i32) {
        if self.cache_int([x, y, z, w]) {
            device.uniform4i(self.location, x, y, z, w);
        }
    }

    pub fn upload_4iv(&mut self, device: &mut dyn RenderDevice, values: &[i32]) {
        device.uniform4iv(self.location, values);
    }

    /// Bind a texture to this uniform's unit
    pub fn upload_texture(&self, device: &mut dyn RenderDevice, texture: TextureHandle) {
        if let Some(unit) = self.texture_unit() {
            device.active_texture(unit);
            device.bind_texture(texture);
        }
    }

    /// Bind textures to consecutive units; extra textures are ignored
    pub fn upload_texture_array(&self, device: &mut dyn RenderDevice, textures: &[TextureHandle]) {
        for (unit, texture) in self.texture_units.iter().zip(textures) {
            device.active_texture(*unit);
            device.bind_texture(*texture);
        }
    }
}

/// Which block of a program a uniform is filed under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformBlockKind {
    Scene,
    Camera,
    Renderer,
    Material,
    /// Uniforms whose property had no group when the program linked
    Other,
}

impl From<ShaderDataGroup> for UniformBlockKind {
    fn from(group: ShaderDataGroup) -> Self {
        match group {
            ShaderDataGroup::Scene => UniformBlockKind::Scene,
            ShaderDataGroup::Camera => UniformBlockKind::Camera,
            ShaderDataGroup::Renderer => UniformBlockKind::Renderer,
            ShaderDataGroup::Material => UniformBlockKind::Material,
        }
    }
}

impl UniformBlockKind {
    pub(crate) fn of(property: &ShaderProperty) -> Self {
        property
            .group()
            .map(UniformBlockKind::from)
            .unwrap_or(UniformBlockKind::Other)
    }
}

/// Uniforms of one update frequency
#[derive(Debug, Default)]
pub struct ShaderUniformBlock {
    const_uniforms: Vec<ShaderUniform>,
    texture_uniforms: Vec<ShaderUniform>,
}

impl ShaderUniformBlock {
    pub(crate) fn push(&mut self, uniform: ShaderUniform) {
        if uniform.kind().is_texture() {
            self.texture_uniforms.push(uniform);
        } else {
            self.const_uniforms.push(uniform);
        }
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = ShaderUniform> + '_ {
        self.const_uniforms
            .drain(..)
            .chain(self.texture_uniforms.drain(..))
    }

    pub fn const_uniforms(&self) -> &[ShaderUniform] {
        &self.const_uniforms
    }

    pub fn texture_uniforms(&self) -> &[ShaderUniform] {
        &self.texture_uniforms
    }

    pub fn len(&self) -> usize {
        self.const_uniforms.len() + self.texture_uniforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.const_uniforms.is_empty() && self.texture_uniforms.is_empty()
    }

    /// Find a uniform by name
    pub fn get(&self, name: &str) -> Option<&ShaderUniform> {
        self.const_uniforms
            .iter()
            .chain(&self.texture_uniforms)
            .find(|u| u.name() == name)
    }

    /// Upload every non-texture uniform that has a value in `data`
    pub fn upload_uniforms(&mut self, device: &mut dyn RenderDevice, data: &ShaderData) {
        for uniform in &mut self.const_uniforms {
            if let Some(value) = data.value_by_id(uniform.property().id()) {
                uniform.upload(device, value);
            }
        }
    }

    /// Bind every texture uniform that has a value in `data`
    pub fn upload_textures(&mut self, device: &mut dyn RenderDevice, data: &ShaderData) {
        for uniform in &mut self.texture_uniforms {
            if let Some(value) = data.value_by_id(uniform.property().id()) {
                uniform.upload(device, value);
            }
        }
    }

    pub fn upload_all(&mut self, device: &mut dyn RenderDevice, data: &ShaderData) {
        self.upload_uniforms(device, data);
        self.upload_textures(device, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{Color, Mat4};
    use prism_gpu::{GpuCall, HeadlessDevice, TextureDesc, TextureFormat};

    fn uniform(name: &str, ty: UniformType, size: u32) -> ShaderUniform {
        ShaderUniform::new(&ActiveUniform {
            name: name.to_string(),
            location: UniformLocation(3),
            ty,
            size,
        })
    }

    #[test]
    fn test_upload_kind_selection() {
        assert_eq!(UploadKind::from_uniform(UniformType::Float, 1), UploadKind::Float);
        assert_eq!(UploadKind::from_uniform(UniformType::Float, 4), UploadKind::FloatArray);
        assert_eq!(UploadKind::from_uniform(UniformType::Bool, 1), UploadKind::Int);
        assert_eq!(UploadKind::from_uniform(UniformType::Mat4, 2), UploadKind::Mat4);
        assert_eq!(UploadKind::from_uniform(UniformType::Mat3, 1), UploadKind::Unsupported);
        assert_eq!(UploadKind::from_uniform(UniformType::Sampler2D, 1), UploadKind::Texture);
        assert_eq!(
            UploadKind::from_uniform(UniformType::SamplerCube, 3),
            UploadKind::TextureArray
        );
    }

    #[test]
    fn test_scalar_upload_is_cached() {
        let mut device = HeadlessDevice::default();
        let mut u = uniform("test_uniform_cached", UniformType::Float, 1);

        u.upload_1f(&mut device, 0.5);
        u.upload_1f(&mut device, 0.5);
        assert_eq!(device.calls(), &[GpuCall::Uniform1f(UniformLocation(3), 0.5)]);

        u.upload_1f(&mut device, 0.75);
        assert_eq!(device.stats().uniform_uploads, 2);
    }

    #[test]
    fn test_vector_upload_is_cached() {
        let mut device = HeadlessDevice::default();
        let mut u = uniform("test_uniform_vec4_cached", UniformType::Vec4, 1);

        u.upload(&mut device, &ShaderValue::Color(Color::RED));
        u.upload(&mut device, &ShaderValue::Color(Color::RED));
        assert_eq!(
            device.calls(),
            &[GpuCall::Uniform4f(UniformLocation(3), [1.0, 0.0, 0.0, 1.0])]
        );
    }

    #[test]
    fn test_matrix_upload_is_never_cached() {
        let mut device = HeadlessDevice::default();
        let mut u = uniform("test_uniform_matrix", UniformType::Mat4, 1);

        u.upload(&mut device, &ShaderValue::Mat4(Mat4::IDENTITY));
        u.upload(&mut device, &ShaderValue::Mat4(Mat4::IDENTITY));
        assert_eq!(
            device.count_calls(|c| matches!(c, GpuCall::UniformMatrix4fv { .. })),
            2
        );
    }

    #[test]
    fn test_type_mismatch_is_skipped() {
        let mut device = HeadlessDevice::default();
        let mut u = uniform("test_uniform_mismatch", UniformType::Mat4, 1);
        u.upload(&mut device, &ShaderValue::Float(1.0));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_texture_upload_binds_unit() {
        let mut device = HeadlessDevice::default();
        let texture = device
            .create_texture(&TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm))
            .unwrap();
        device.clear_calls();

        let mut u = uniform("test_uniform_texture", UniformType::Sampler2D, 1);
        u.set_texture_units([2]);
        u.upload(&mut device, &ShaderValue::Texture(texture));
        assert_eq!(
            device.calls(),
            &[GpuCall::ActiveTexture(2), GpuCall::BindTexture(texture)]
        );
    }

    #[test]
    fn test_block_skips_absent_values() {
        let mut device = HeadlessDevice::default();
        let mut block = ShaderUniformBlock::default();
        block.push(uniform("test_block_present", UniformType::Float, 1));
        block.push(uniform("test_block_absent", UniformType::Float, 1));
        block.push(uniform("test_block_texture", UniformType::Sampler2D, 1));
        assert_eq!(block.const_uniforms().len(), 2);
        assert_eq!(block.texture_uniforms().len(), 1);

        let mut data = ShaderData::new(ShaderDataGroup::Material);
        data.set_float("test_block_present", 2.0).unwrap();
        block.upload_all(&mut device, &data);
        assert_eq!(device.calls(), &[GpuCall::Uniform1f(UniformLocation(3), 2.0)]);
    }
}
