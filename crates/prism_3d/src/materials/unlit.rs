//! Unlit material

use prism_core::{Color, Vec4};
use prism_gpu::TextureHandle;
use std::ops::{Deref, DerefMut};

use super::Material;
use crate::error::Result;
use crate::shader::Shader;

const BASE_COLOR: &str = "u_baseColor";
const BASE_TEXTURE: &str = "u_baseTexture";
const TILING_OFFSET: &str = "u_tilingOffset";
const HAS_BASE_TEXTURE: &str = "HAS_BASE_TEXTURE";

/// Flat color, optionally modulated by a texture
///
/// Built on the built-in `unlit` shader.
#[derive(Debug)]
pub struct UnlitMaterial {
    material: Material,
}

impl UnlitMaterial {
    pub fn new() -> Result<Self> {
        let mut material = Material::new(Shader::create_default()).with_name("unlit");
        let data = material.shader_data_mut();
        data.set_color(BASE_COLOR, Color::WHITE)?;
        data.set_vector4(TILING_OFFSET, Vec4::new(1.0, 1.0, 0.0, 0.0))?;
        Ok(Self { material })
    }

    pub fn base_color(&self) -> Color {
        self.shader_data()
            .get_color(BASE_COLOR)
            .unwrap_or(Color::WHITE)
    }

    pub fn set_base_color(&mut self, color: Color) -> Result<()> {
        self.shader_data_mut().set_color(BASE_COLOR, color)
    }

    pub fn base_texture(&self) -> Option<TextureHandle> {
        self.shader_data().get_texture(BASE_TEXTURE)
    }

    /// Set or clear the base texture; toggles the `HAS_BASE_TEXTURE` variant
    pub fn set_base_texture(&mut self, texture: Option<TextureHandle>) -> Result<()> {
        let data = self.shader_data_mut();
        match texture {
            Some(texture) => {
                data.set_texture(BASE_TEXTURE, texture)?;
                data.enable_macro(HAS_BASE_TEXTURE);
            }
            None => {
                data.remove(BASE_TEXTURE);
                data.disable_macro(HAS_BASE_TEXTURE);
            }
        }
        Ok(())
    }

    /// Texture scale in `xy`, offset in `zw`
    pub fn set_tiling_offset(&mut self, tiling_offset: Vec4) -> Result<()> {
        self.shader_data_mut().set_vector4(TILING_OFFSET, tiling_offset)
    }

    pub fn into_material(self) -> Material {
        self.material
    }
}

impl Deref for UnlitMaterial {
    type Target = Material;

    fn deref(&self) -> &Material {
        &self.material
    }
}

impl DerefMut for UnlitMaterial {
    fn deref_mut(&mut self) -> &mut Material {
        &mut self.material
    }
}

impl From<UnlitMaterial> for Material {
    fn from(unlit: UnlitMaterial) -> Self {
        unlit.material
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderMacro;
    use prism_gpu::{HeadlessDevice, RenderDevice, TextureDesc, TextureFormat};

    #[test]
    fn test_defaults() {
        let material = UnlitMaterial::new().unwrap();
        assert_eq!(material.base_color(), Color::WHITE);
        assert_eq!(material.shader().name(), crate::shader::UNLIT_SHADER);
        assert!(material.base_texture().is_none());
    }

    #[test]
    fn test_base_texture_toggles_macro() {
        let mut device = HeadlessDevice::default();
        let texture = device
            .create_texture(&TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm))
            .unwrap();
        let has_texture = ShaderMacro::get_by_name(HAS_BASE_TEXTURE);

        let mut material = UnlitMaterial::new().unwrap();
        material.set_base_texture(Some(texture)).unwrap();
        assert_eq!(material.base_texture(), Some(texture));
        assert!(material.shader_data().macro_collection().is_enabled(&has_texture));

        material.set_base_texture(None).unwrap();
        assert!(material.base_texture().is_none());
        assert!(!material.shader_data().macro_collection().is_enabled(&has_texture));
    }

    #[test]
    fn test_textured_variant_compiles() {
        let mut device = HeadlessDevice::default();
        let texture = device
            .create_texture(&TextureDesc::new_2d(4, 4, TextureFormat::Rgba8Unorm))
            .unwrap();
        let mut material = UnlitMaterial::new().unwrap();
        material.set_base_texture(Some(texture)).unwrap();

        let macros = material.shader_data().macro_collection().clone();
        let program = material.shader().compile(&mut device, &macros);
        assert!(program.is_valid());
        assert_eq!(program.texture_unit_count(), 1);
        assert!(program.uniform("u_baseTexture").is_some());
    }
}
