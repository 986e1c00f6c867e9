//! Prism 3D
//!
//! Scene graph and render loop for the Prism engine.
//!
//! # Features
//!
//! - **Transforms**: local position, rotation and scale with lazily recomputed
//!   world values, invalidated through the hierarchy with dirty flags
//! - **Shader data**: typed values keyed by globally registered properties, each
//!   property belonging to one update-frequency group
//! - **Shader programs**: uniforms filed into scene, camera, renderer and
//!   material blocks, with per-uniform change detection on upload
//! - **Engine**: a frame loop that sorts render elements and re-sends only the
//!   uniform blocks whose owner changed since the program last drew
//!
//! # Example
//!
//! ```
//! use prism_3d::prelude::*;
//! use prism_gpu::HeadlessDevice;
//!
//! fn main() -> Result<()> {
//!     let mut engine = Engine::new(HeadlessDevice::new(640, 480), EngineConfig::default())?;
//!
//!     let scene = engine.scene_mut();
//!     let mesh = scene.add_mesh(Mesh::cuboid(1.0, 1.0, 1.0));
//!     let material = scene.add_material(UnlitMaterial::new()?);
//!     let cube = scene.create_entity("cube");
//!     scene.add_mesh_renderer(cube, mesh, material)?;
//!
//!     let stats = engine.update()?;
//!     assert_eq!(stats.draw_calls, 1);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod materials;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod shader;
pub mod time;

pub use config::{CameraConfig, EngineConfig, RenderConfig, SceneConfig};
pub use engine::{Engine, FrameStats};
pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::engine::{Engine, FrameStats};
    pub use crate::error::{Error, Result};

    // Scene
    pub use crate::scene::{Camera, Entity, Scene, TransformMut, TransformRef};
    pub use crate::render::MeshRenderer;

    // Resources
    pub use crate::materials::{Material, MaterialId, RenderQueueType, UnlitMaterial};
    pub use crate::mesh::{Mesh, MeshId};
    pub use crate::shader::{Shader, ShaderData, ShaderMacro, ShaderProperty};

    // Core types
    pub use prism_core::{Color, Mat4, Quat, Vec2, Vec3, Vec4};
}
