//! Per-owner shader data

use prism_core::{Color, Mat4, Vec2, Vec3, Vec4};
use prism_gpu::TextureHandle;
use rustc_hash::FxHashMap;

use super::macros::{ShaderMacro, ShaderMacroCollection};
use super::property::{IntoShaderProperty, ShaderDataGroup, ShaderProperty};
use super::value::ShaderValue;
use crate::error::Result;

/// Typed store of shader values owned by one scene, camera, renderer or material
///
/// Values are keyed by [`ShaderProperty`] id. Writing a property binds it to this
/// data's group; writing it later from data of another group fails with
/// [`Error::GroupConflict`](crate::Error::GroupConflict).
#[derive(Clone, Debug)]
pub struct ShaderData {
    group: ShaderDataGroup,
    values: FxHashMap<u32, ShaderValue>,
    macros: ShaderMacroCollection,
}

impl ShaderData {
    pub fn new(group: ShaderDataGroup) -> Self {
        Self {
            group,
            values: FxHashMap::default(),
            macros: ShaderMacroCollection::new(),
        }
    }

    pub fn group(&self) -> ShaderDataGroup {
        self.group
    }

    /// Store any value
    pub fn set_value(
        &mut self,
        property: impl IntoShaderProperty,
        value: impl Into<ShaderValue>,
    ) -> Result<()> {
        let property = property.into_property();
        property.bind_group(self.group)?;
        self.values.insert(property.id(), value.into());
        Ok(())
    }

    pub fn get_value(&self, property: impl IntoShaderProperty) -> Option<&ShaderValue> {
        self.values.get(&property.into_property().id())
    }

    /// Value lookup by id, used on the upload path
    pub(crate) fn value_by_id(&self, id: u32) -> Option<&ShaderValue> {
        self.values.get(&id)
    }

    pub fn remove(&mut self, property: impl IntoShaderProperty) -> Option<ShaderValue> {
        self.values.remove(&property.into_property().id())
    }

    pub fn contains(&self, property: impl IntoShaderProperty) -> bool {
        self.values.contains_key(&property.into_property().id())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_float(&mut self, property: impl IntoShaderProperty, value: f32) -> Result<()> {
        self.set_value(property, ShaderValue::Float(value))
    }

    pub fn get_float(&self, property: impl IntoShaderProperty) -> Option<f32> {
        match self.get_value(property)? {
            ShaderValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_int(&mut self, property: impl IntoShaderProperty, value: i32) -> Result<()> {
        self.set_value(property, ShaderValue::Int(value))
    }

    pub fn get_int(&self, property: impl IntoShaderProperty) -> Option<i32> {
        match self.get_value(property)? {
            ShaderValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_vector2(&mut self, property: impl IntoShaderProperty, value: Vec2) -> Result<()> {
        self.set_value(property, ShaderValue::Vec2(value))
    }

    pub fn get_vector2(&self, property: impl IntoShaderProperty) -> Option<Vec2> {
        match self.get_value(property)? {
            ShaderValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_vector3(&mut self, property: impl IntoShaderProperty, value: Vec3) -> Result<()> {
        self.set_value(property, ShaderValue::Vec3(value))
    }

    pub fn get_vector3(&self, property: impl IntoShaderProperty) -> Option<Vec3> {
        match self.get_value(property)? {
            ShaderValue::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_vector4(&mut self, property: impl IntoShaderProperty, value: Vec4) -> Result<()> {
        self.set_value(property, ShaderValue::Vec4(value))
    }

    pub fn get_vector4(&self, property: impl IntoShaderProperty) -> Option<Vec4> {
        match self.get_value(property)? {
            ShaderValue::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_color(&mut self, property: impl IntoShaderProperty, value: Color) -> Result<()> {
        self.set_value(property, ShaderValue::Color(value))
    }

    pub fn get_color(&self, property: impl IntoShaderProperty) -> Option<Color> {
        match self.get_value(property)? {
            ShaderValue::Color(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_matrix(&mut self, property: impl IntoShaderProperty, value: Mat4) -> Result<()> {
        self.set_value(property, ShaderValue::Mat4(value))
    }

    pub fn get_matrix(&self, property: impl IntoShaderProperty) -> Option<Mat4> {
        match self.get_value(property)? {
            ShaderValue::Mat4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_float_array(
        &mut self,
        property: impl IntoShaderProperty,
        value: Vec<f32>,
    ) -> Result<()> {
        self.set_value(property, ShaderValue::FloatArray(value))
    }

    pub fn get_float_array(&self, property: impl IntoShaderProperty) -> Option<&[f32]> {
        match self.get_value(property)? {
            ShaderValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_int_array(&mut self, property: impl IntoShaderProperty, value: Vec<i32>) -> Result<()> {
        self.set_value(property, ShaderValue::IntArray(value))
    }

    pub fn get_int_array(&self, property: impl IntoShaderProperty) -> Option<&[i32]> {
        match self.get_value(property)? {
            ShaderValue::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn set_texture(
        &mut self,
        property: impl IntoShaderProperty,
        value: TextureHandle,
    ) -> Result<()> {
        self.set_value(property, ShaderValue::Texture(value))
    }

    pub fn get_texture(&self, property: impl IntoShaderProperty) -> Option<TextureHandle> {
        match self.get_value(property)? {
            ShaderValue::Texture(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_texture_array(
        &mut self,
        property: impl IntoShaderProperty,
        value: Vec<TextureHandle>,
    ) -> Result<()> {
        self.set_value(property, ShaderValue::TextureArray(value))
    }

    pub fn get_texture_array(&self, property: impl IntoShaderProperty) -> Option<&[TextureHandle]> {
        match self.get_value(property)? {
            ShaderValue::TextureArray(v) => Some(v),
            _ => None,
        }
    }

    // Macros

    pub fn enable_macro(&mut self, name: &str) {
        self.macros.enable(&ShaderMacro::get_by_name(name));
    }

    /// Enable a valued define, replacing any other value of the same name
    pub fn enable_macro_value(&mut self, name: &str, value: &str) {
        self.macros.disable_name(name);
        self.macros
            .enable(&ShaderMacro::get_by_name_value(name, value));
    }

    /// Disable a define with any value
    pub fn disable_macro(&mut self, name: &str) {
        self.macros.disable_name(name);
    }

    pub fn macro_collection(&self) -> &ShaderMacroCollection {
        &self.macros
    }

    /// Iterate stored values with their properties
    pub fn iter(&self) -> impl Iterator<Item = (ShaderProperty, &ShaderValue)> {
        self.values
            .iter()
            .filter_map(|(id, value)| ShaderProperty::get_by_id(*id).map(|p| (p, value)))
    }
}
