//! Scene graph
//!
//! A [`Scene`] owns an arena of entities, each with a name, an active flag,
//! hierarchy links and a [`Transform`]. Cameras and mesh renderers are
//! components stored alongside the arena; materials and meshes are shared
//! resources referenced by id.
//!
//! # Example
//!
//! ```
//! use prism_3d::prelude::*;
//!
//! let mut scene = Scene::new();
//! let parent = scene.create_entity("parent");
//! let child = scene.create_child(parent, "child").unwrap();
//!
//! scene.transform_mut(child).unwrap().set_position_xyz(1.0, 0.0, 0.0);
//! scene.transform_mut(parent).unwrap().translate_xyz(0.0, 5.0, 0.0, true);
//!
//! let world = scene.transform(child).unwrap().world_position();
//! assert!(world.approx_eq(Vec3::new(1.0, 5.0, 0.0), 1e-5));
//! ```

mod camera;
mod entity;
mod transform;

pub use camera::{Camera, CameraMatrices};
pub use entity::Entity;
pub use transform::{Transform, TransformFlags, TransformMut, TransformRef};

use prism_core::{Color, Vec3};
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::SceneConfig;
use crate::error::{Error, Result};
use crate::materials::{Material, MaterialId};
use crate::mesh::{Mesh, MeshId};
use crate::render::{MeshRenderer, RenderElement, RenderQueue};
use crate::shader::{ShaderData, ShaderDataGroup};
use entity::{detach, is_ancestor_or_self, EntityNode, Nodes};

/// Entities, components and shared resources
#[derive(Debug)]
pub struct Scene {
    name: String,
    nodes: Nodes,
    cameras: SecondaryMap<Entity, Camera>,
    active_camera: Option<Entity>,
    mesh_renderers: SecondaryMap<Entity, MeshRenderer>,
    materials: SlotMap<MaterialId, Material>,
    meshes: SlotMap<MeshId, Mesh>,
    shader_data: ShaderData,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            name: "scene".to_string(),
            nodes: SlotMap::with_key(),
            cameras: SecondaryMap::new(),
            active_camera: None,
            mesh_renderers: SecondaryMap::new(),
            materials: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            shader_data: ShaderData::new(ShaderDataGroup::Scene),
        }
    }

    pub fn from_config(config: &SceneConfig) -> Result<Self> {
        let mut scene = Self::new();
        scene.name = config.name.clone();
        scene.set_ambient_color(config.ambient_color())?;
        Ok(scene)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Entities

    /// Create a root entity
    pub fn create_entity(&mut self, name: impl Into<String>) -> Entity {
        self.nodes.insert(EntityNode::new(name))
    }

    /// Create an entity under `parent`
    ///
    /// The child starts with an identity local transform, so its world values
    /// are those of the parent.
    pub fn create_child(&mut self, parent: Entity, name: impl Into<String>) -> Result<Entity> {
        if !self.nodes.contains_key(parent) {
            return Err(Error::EntityNotFound);
        }
        let mut node = EntityNode::new(name);
        node.parent = Some(parent);
        let child = self.nodes.insert(node);
        self.nodes[parent].children.push(child);
        transform::invalidate_all_world(&self.nodes, child);
        Ok(child)
    }

    /// Destroy an entity, its descendants and their components
    ///
    /// Returns false if the entity did not exist.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.nodes.contains_key(entity) {
            return false;
        }
        detach(&mut self.nodes, entity);

        let mut pending: SmallVec<[Entity; 16]> = SmallVec::new();
        pending.push(entity);
        let mut destroyed = 0usize;
        while let Some(e) = pending.pop() {
            let Some(node) = self.nodes.remove(e) else {
                continue;
            };
            pending.extend(node.children);
            self.cameras.remove(e);
            self.mesh_renderers.remove(e);
            if self.active_camera == Some(e) {
                self.active_camera = None;
            }
            destroyed += 1;
        }
        debug!(entities = destroyed, "destroyed entity subtree");
        true
    }

    /// Move `child` under `parent`, or to the root with `None`
    ///
    /// The local transform is kept, so the world transform follows the new
    /// parent.
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> Result<()> {
        if !self.nodes.contains_key(child) {
            return Err(Error::EntityNotFound);
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(Error::EntityNotFound);
            }
            if is_ancestor_or_self(&self.nodes, child, parent) {
                return Err(Error::HierarchyCycle);
            }
        }
        if self.nodes[child].parent == parent {
            return Ok(());
        }

        detach(&mut self.nodes, child);
        if let Some(parent) = parent {
            self.nodes[child].parent = Some(parent);
            self.nodes[parent].children.push(child);
        }
        transform::invalidate_all_world(&self.nodes, child);
        Ok(())
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.nodes.get(entity).and_then(|n| n.parent)
    }

    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.nodes
            .get(entity)
            .map_or(&[][..], |n| n.children.as_slice())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.nodes.contains_key(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes.keys()
    }

    pub fn entity_name(&self, entity: Entity) -> Option<&str> {
        self.nodes.get(entity).map(|n| n.name.as_str())
    }

    /// First entity with this name, in arena order
    pub fn find_entity_by_name(&self, name: &str) -> Option<Entity> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(e, _)| e)
    }

    pub fn set_active(&mut self, entity: Entity, active: bool) -> Result<()> {
        let node = self.nodes.get_mut(entity).ok_or(Error::EntityNotFound)?;
        node.active = active;
        Ok(())
    }

    /// The entity's own flag, ignoring ancestors
    pub fn is_active(&self, entity: Entity) -> bool {
        self.nodes.get(entity).is_some_and(|n| n.active)
    }

    /// Active along the whole path to the root
    pub fn is_active_in_hierarchy(&self, entity: Entity) -> bool {
        let mut current = Some(entity);
        while let Some(e) = current {
            match self.nodes.get(e) {
                Some(node) if node.active => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    // Transforms

    pub fn transform(&self, entity: Entity) -> Option<TransformRef<'_>> {
        TransformRef::new(&self.nodes, entity)
    }

    pub fn transform_mut(&mut self, entity: Entity) -> Option<TransformMut<'_>> {
        TransformMut::new(&mut self.nodes, entity)
    }

    // Cameras

    /// Attach a camera; the first camera added becomes the active one
    pub fn add_camera(&mut self, entity: Entity, camera: Camera) -> Result<()> {
        if !self.nodes.contains_key(entity) {
            return Err(Error::EntityNotFound);
        }
        self.cameras.insert(entity, camera);
        if self.active_camera.is_none() {
            self.active_camera = Some(entity);
        }
        Ok(())
    }

    pub fn camera(&self, entity: Entity) -> Option<&Camera> {
        self.cameras.get(entity)
    }

    pub fn camera_mut(&mut self, entity: Entity) -> Option<&mut Camera> {
        self.cameras.get_mut(entity)
    }

    pub fn remove_camera(&mut self, entity: Entity) -> Option<Camera> {
        if self.active_camera == Some(entity) {
            self.active_camera = None;
        }
        self.cameras.remove(entity)
    }

    pub fn set_active_camera(&mut self, entity: Entity) -> Result<()> {
        if !self.cameras.contains_key(entity) {
            return Err(Error::EntityNotFound);
        }
        self.active_camera = Some(entity);
        Ok(())
    }

    pub fn active_camera(&self) -> Option<Entity> {
        self.active_camera
    }

    // Mesh renderers

    pub fn add_mesh_renderer(
        &mut self,
        entity: Entity,
        mesh: MeshId,
        material: MaterialId,
    ) -> Result<()> {
        let transform = TransformRef::new(&self.nodes, entity).ok_or(Error::EntityNotFound)?;
        let renderer = MeshRenderer::new(&transform, mesh, material);
        self.mesh_renderers.insert(entity, renderer);
        Ok(())
    }

    pub fn mesh_renderer(&self, entity: Entity) -> Option<&MeshRenderer> {
        self.mesh_renderers.get(entity)
    }

    pub fn mesh_renderer_mut(&mut self, entity: Entity) -> Option<&mut MeshRenderer> {
        self.mesh_renderers.get_mut(entity)
    }

    pub fn remove_mesh_renderer(&mut self, entity: Entity) -> Option<MeshRenderer> {
        self.mesh_renderers.remove(entity)
    }

    /// Transform and renderer of one entity, borrowed together
    pub fn transform_and_renderer_mut(
        &mut self,
        entity: Entity,
    ) -> Option<(TransformRef<'_>, &mut MeshRenderer)> {
        let transform = TransformRef::new(&self.nodes, entity)?;
        let renderer = self.mesh_renderers.get_mut(entity)?;
        Some((transform, renderer))
    }

    // Resources

    pub fn add_material(&mut self, material: impl Into<Material>) -> MaterialId {
        self.materials.insert(material.into())
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.insert(mesh)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.get_mut(id)
    }

    pub(crate) fn meshes_mut(&mut self) -> impl Iterator<Item = &mut Mesh> {
        self.meshes.values_mut()
    }

    // Scene shader data

    pub fn shader_data(&self) -> &ShaderData {
        &self.shader_data
    }

    pub fn shader_data_mut(&mut self) -> &mut ShaderData {
        &mut self.shader_data
    }

    pub fn ambient_color(&self) -> Color {
        self.shader_data
            .get_color("u_ambientColor")
            .unwrap_or(Color::BLACK)
    }

    pub fn set_ambient_color(&mut self, color: Color) -> Result<()> {
        self.shader_data.set_color("u_ambientColor", color)
    }

    /// Per-frame scene values
    pub(crate) fn update_shader_data(&mut self, elapsed: f32) -> Result<()> {
        self.shader_data.set_float("u_time", elapsed)
    }

    // Frame preparation

    /// Render the active camera; returns its entity, matrices and position
    pub(crate) fn render_camera(
        &mut self,
        viewport_size: (u32, u32),
    ) -> Result<Option<(Entity, CameraMatrices, Vec3)>> {
        let Some(entity) = self.active_camera else {
            return Ok(None);
        };
        let (Some(transform), Some(camera)) = (
            TransformRef::new(&self.nodes, entity),
            self.cameras.get_mut(entity),
        ) else {
            return Ok(None);
        };
        camera.render(&transform, viewport_size)?;
        Ok(Some((entity, *camera.matrices(), transform.world_position())))
    }

    /// Update every drawable renderer for the camera and queue it
    ///
    /// Skips renderers that are disabled, inactive in the hierarchy, or
    /// reference a missing mesh or material.
    pub(crate) fn collect_render_elements(
        &mut self,
        camera: &CameraMatrices,
        camera_position: Vec3,
        queue: &mut RenderQueue,
    ) -> Result<()> {
        let entities: SmallVec<[Entity; 64]> = self.mesh_renderers.keys().collect();
        for entity in entities {
            if !self.is_active_in_hierarchy(entity) {
                continue;
            }
            let Some(renderer) = self.mesh_renderers.get_mut(entity) else {
                continue;
            };
            if !renderer.enabled || !self.meshes.contains_key(renderer.mesh()) {
                continue;
            }
            let Some(material) = self.materials.get(renderer.material()) else {
                continue;
            };
            let Some(transform) = TransformRef::new(&self.nodes, entity) else {
                continue;
            };

            renderer.update_shader_data(&transform, camera)?;
            queue.push(RenderElement {
                entity,
                mesh: renderer.mesh(),
                material: renderer.material(),
                queue: material.render_queue_type(),
                distance: transform.world_position().distance(camera_position),
            });
        }
        Ok(())
    }
}
