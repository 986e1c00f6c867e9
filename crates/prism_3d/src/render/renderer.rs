//! Mesh renderer component

use prism_core::{BoolUpdateFlag, Mat4, UpdateFlagHandle};

use crate::error::Result;
use crate::materials::MaterialId;
use crate::mesh::MeshId;
use crate::scene::{CameraMatrices, TransformRef};
use crate::shader::{ShaderData, ShaderDataGroup};

/// Draws a mesh with a material at its entity's transform
#[derive(Debug)]
pub struct MeshRenderer {
    mesh: MeshId,
    material: MaterialId,
    pub enabled: bool,
    shader_data: ShaderData,
    world_change_flag: UpdateFlagHandle<BoolUpdateFlag>,
}

impl MeshRenderer {
    /// Create a renderer observing `transform`
    pub fn new(transform: &TransformRef<'_>, mesh: MeshId, material: MaterialId) -> Self {
        Self {
            mesh,
            material,
            enabled: true,
            shader_data: ShaderData::new(ShaderDataGroup::Renderer),
            world_change_flag: transform
                .update_flag_manager()
                .create_flag(BoolUpdateFlag::set_initially()),
        }
    }

    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    pub fn set_mesh(&mut self, mesh: MeshId) {
        self.mesh = mesh;
    }

    pub fn material(&self) -> MaterialId {
        self.material
    }

    pub fn set_material(&mut self, material: MaterialId) {
        self.material = material;
    }

    pub fn shader_data(&self) -> &ShaderData {
        &self.shader_data
    }

    pub fn shader_data_mut(&mut self) -> &mut ShaderData {
        &mut self.shader_data
    }

    /// Write the per-draw matrices for the current camera
    ///
    /// The normal matrix depends only on the world matrix, so it is rewritten
    /// only after the transform reported a world-space change.
    pub fn update_shader_data(
        &mut self,
        transform: &TransformRef<'_>,
        camera: &CameraMatrices,
    ) -> Result<()> {
        let model = transform.world_matrix();
        let model_view = camera.view * model;
        let data = &mut self.shader_data;
        data.set_matrix("u_modelMat", model)?;
        data.set_matrix("u_MVMat", model_view)?;
        data.set_matrix("u_MVPMat", camera.view_projection * model)?;
        data.set_matrix(
            "u_MVInvMat",
            model_view.try_inverse().unwrap_or(Mat4::IDENTITY),
        )?;

        if self.world_change_flag.take() {
            data.set_matrix("u_normalMat", model.normal_matrix())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::Material;
    use crate::mesh::Mesh;
    use crate::scene::Scene;
    use crate::shader::Shader;
    use prism_core::Vec3;

    fn renderer_scene() -> (Scene, crate::scene::Entity) {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Mesh::cuboid(1.0, 1.0, 1.0));
        let material = scene.add_material(Material::new(Shader::create_default()));
        let e = scene.create_entity("cube");
        scene.add_mesh_renderer(e, mesh, material).unwrap();
        (scene, e)
    }

    #[test]
    fn test_writes_matrices() {
        let (mut scene, e) = renderer_scene();
        scene.transform_mut(e).unwrap().set_position_xyz(1.0, 2.0, 3.0);

        let camera = CameraMatrices::default();
        let (transform, renderer) = scene.transform_and_renderer_mut(e).unwrap();
        renderer.update_shader_data(&transform, &camera).unwrap();

        let data = renderer.shader_data();
        let model = data.get_matrix("u_modelMat").unwrap();
        assert_eq!(model.get_translation(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(data.get_matrix("u_MVPMat"), Some(model));
        assert!(data.contains("u_MVMat"));
        assert!(data.contains("u_MVInvMat"));
        assert!(data.contains("u_normalMat"));
    }

    #[test]
    fn test_normal_matrix_only_on_world_change() {
        let (mut scene, e) = renderer_scene();
        let camera = CameraMatrices::default();
        {
            let (transform, renderer) = scene.transform_and_renderer_mut(e).unwrap();
            renderer.update_shader_data(&transform, &camera).unwrap();
            renderer.shader_data_mut().remove("u_normalMat");

            // Nothing moved, so the normal matrix is not rewritten
            renderer.update_shader_data(&transform, &camera).unwrap();
            assert!(!renderer.shader_data().contains("u_normalMat"));
        }

        scene.transform_mut(e).unwrap().set_scale_xyz(2.0, 1.0, 1.0);
        let (transform, renderer) = scene.transform_and_renderer_mut(e).unwrap();
        renderer.update_shader_data(&transform, &camera).unwrap();
        assert!(renderer.shader_data().contains("u_normalMat"));
    }
}
