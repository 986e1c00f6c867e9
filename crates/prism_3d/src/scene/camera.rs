//! Camera component

use prism_core::Mat4;

use super::transform::TransformRef;
use crate::config::CameraConfig;
use crate::error::Result;
use crate::shader::{ShaderData, ShaderDataGroup};

/// Matrices produced by the last [`Camera::render`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

impl Default for CameraMatrices {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
        }
    }
}

/// Projection settings and per-camera shader data
///
/// The camera looks down the -Z axis of its entity's transform.
#[derive(Debug)]
pub struct Camera {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Width over height; `None` follows the viewport
    pub aspect_ratio: Option<f32>,
    pub is_orthographic: bool,
    /// Half of the visible height of an orthographic camera
    pub orthographic_size: f32,
    viewport_aspect: f32,
    matrices: CameraMatrices,
    shader_data: ShaderData,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            fov: 45.0,
            near: 0.1,
            far: 100.0,
            aspect_ratio: None,
            is_orthographic: false,
            orthographic_size: 10.0,
            viewport_aspect: 1.0,
            matrices: CameraMatrices::default(),
            shader_data: ShaderData::new(ShaderDataGroup::Camera),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            fov: config.fov,
            near: config.near,
            far: config.far,
            is_orthographic: config.orthographic,
            orthographic_size: config.orthographic_size,
            ..Self::new()
        }
    }

    /// Effective aspect ratio
    pub fn aspect(&self) -> f32 {
        self.aspect_ratio.unwrap_or(self.viewport_aspect)
    }

    /// Inverse of the camera's world matrix
    ///
    /// Falls back to identity for a degenerate (zero-scaled) camera.
    pub fn view_matrix(&self, transform: &TransformRef<'_>) -> Mat4 {
        transform.world_matrix().try_inverse().unwrap_or(Mat4::IDENTITY)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let aspect = self.aspect();
        if self.is_orthographic {
            let height = self.orthographic_size;
            let width = height * aspect;
            Mat4::orthographic_rh(-width, width, -height, height, self.near, self.far)
        } else {
            Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
        }
    }

    /// Matrices computed by the most recent [`render`](Self::render)
    pub fn matrices(&self) -> &CameraMatrices {
        &self.matrices
    }

    pub fn shader_data(&self) -> &ShaderData {
        &self.shader_data
    }

    pub fn shader_data_mut(&mut self) -> &mut ShaderData {
        &mut self.shader_data
    }

    /// Recompute matrices and write them to the camera shader data
    ///
    /// Must run before any renderer of the frame reads [`matrices`](Self::matrices).
    pub fn render(&mut self, transform: &TransformRef<'_>, viewport_size: (u32, u32)) -> Result<()> {
        let (width, height) = viewport_size;
        if width > 0 && height > 0 {
            self.viewport_aspect = width as f32 / height as f32;
        }

        let view = self.view_matrix(transform);
        let projection = self.projection_matrix();
        let view_projection = projection * view;
        self.matrices = CameraMatrices {
            view,
            projection,
            view_projection,
        };

        let data = &mut self.shader_data;
        data.set_matrix("u_viewMat", view)?;
        data.set_matrix("u_projMat", projection)?;
        data.set_matrix("u_VPMat", view_projection)?;
        data.set_matrix("u_viewInvMat", transform.world_matrix())?;
        data.set_vector3("u_cameraPos", transform.world_position())?;
        Ok(())
    }
}
