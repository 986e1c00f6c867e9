//! Hierarchical transforms
//!
//! A [`Transform`] stores local position, rotation and scale and caches every
//! derived quantity (local matrix, world matrix, world position, world rotation,
//! lossy world scale). Each cache has its own dirty bit in [`TransformFlags`].
//!
//! Mutations push dirty bits down the hierarchy through the `invalidate_*`
//! functions; reads pull fresh values up, recomputing only the bit being read
//! and, for the world matrix, only those ancestors whose own matrix is dirty.
//!
//! Transforms live inside the scene arena, so they are accessed through
//! [`TransformRef`] and [`TransformMut`] views that can see the parent chain.

use prism_core::{BoolUpdateFlag, Mat4, Quat, UpdateFlagHandle, UpdateFlagManager, Vec3, ZERO_TOLERANCE};
use std::cell::Cell;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::entity::{Entity, EntityNode, Nodes};

/// Dirty bits of a transform's cached values
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TransformFlags(u32);

impl TransformFlags {
    pub const NONE: Self = Self(0);
    /// Local Euler angles are stale, the quaternion is authoritative
    pub const LOCAL_EULER: Self = Self(1 << 0);
    /// Local quaternion is stale, the Euler angles are authoritative
    pub const LOCAL_QUAT: Self = Self(1 << 1);
    pub const LOCAL_MATRIX: Self = Self(1 << 2);
    pub const WORLD_POSITION: Self = Self(1 << 3);
    pub const WORLD_EULER: Self = Self(1 << 4);
    pub const WORLD_QUAT: Self = Self(1 << 5);
    pub const WORLD_SCALE: Self = Self(1 << 6);
    pub const WORLD_MATRIX: Self = Self(1 << 7);

    pub const WORLD_ALL: Self = Self(
        Self::WORLD_POSITION.0
            | Self::WORLD_EULER.0
            | Self::WORLD_QUAT.0
            | Self::WORLD_SCALE.0
            | Self::WORLD_MATRIX.0,
    );

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TransformFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for TransformFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for TransformFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TransformFlags, &str); 8] = [
            (TransformFlags::LOCAL_EULER, "LOCAL_EULER"),
            (TransformFlags::LOCAL_QUAT, "LOCAL_QUAT"),
            (TransformFlags::LOCAL_MATRIX, "LOCAL_MATRIX"),
            (TransformFlags::WORLD_POSITION, "WORLD_POSITION"),
            (TransformFlags::WORLD_EULER, "WORLD_EULER"),
            (TransformFlags::WORLD_QUAT, "WORLD_QUAT"),
            (TransformFlags::WORLD_SCALE, "WORLD_SCALE"),
            (TransformFlags::WORLD_MATRIX, "WORLD_MATRIX"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Spatial state of one entity
#[derive(Debug)]
pub struct Transform {
    position: Vec3,
    scale: Vec3,
    rotation: Cell<Vec3>,
    rotation_quaternion: Cell<Quat>,
    local_matrix: Cell<Mat4>,
    world_position: Cell<Vec3>,
    world_rotation: Cell<Vec3>,
    world_rotation_quaternion: Cell<Quat>,
    lossy_world_scale: Cell<Vec3>,
    world_matrix: Cell<Mat4>,
    flags: Cell<TransformFlags>,
    recompute_count: Cell<u64>,
    update_flag_manager: UpdateFlagManager,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Identity transform; every cache starts valid
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Cell::new(Vec3::ZERO),
            rotation_quaternion: Cell::new(Quat::IDENTITY),
            local_matrix: Cell::new(Mat4::IDENTITY),
            world_position: Cell::new(Vec3::ZERO),
            world_rotation: Cell::new(Vec3::ZERO),
            world_rotation_quaternion: Cell::new(Quat::IDENTITY),
            lossy_world_scale: Cell::new(Vec3::ONE),
            world_matrix: Cell::new(Mat4::IDENTITY),
            flags: Cell::new(TransformFlags::NONE),
            recompute_count: Cell::new(0),
            update_flag_manager: UpdateFlagManager::new(),
        }
    }

    fn is_dirty(&self, bits: TransformFlags) -> bool {
        self.flags.get().intersects(bits)
    }

    fn set_dirty(&self, bits: TransformFlags) {
        self.flags.set(self.flags.get() | bits);
    }

    fn clean(&self, bits: TransformFlags) {
        self.flags.set(self.flags.get().difference(bits));
    }

    fn recomputed(&self) {
        self.recompute_count.set(self.recompute_count.get() + 1);
    }

    /// Mark world bits dirty; false if they all already were
    ///
    /// Observers hear about the bits that went from clean to dirty.
    fn mark_dirty(&self, bits: TransformFlags) -> bool {
        let flags = self.flags.get();
        if flags.contains(bits) {
            return false;
        }
        self.flags.set(flags | bits);
        self.update_flag_manager.dispatch(bits.difference(flags).bits());
        true
    }
}

fn invalidate(nodes: &Nodes, entity: Entity, own: TransformFlags, descendants: TransformFlags) {
    let Some(node) = nodes.get(entity) else {
        return;
    };
    // Already dirty means the whole subtree already is
    if !node.transform.mark_dirty(own) {
        return;
    }
    for &child in &node.children {
        invalidate(nodes, child, descendants, descendants);
    }
}

/// Local position changed
pub(crate) fn invalidate_position(nodes: &Nodes, entity: Entity) {
    let bits = TransformFlags::WORLD_POSITION | TransformFlags::WORLD_MATRIX;
    invalidate(nodes, entity, bits, bits);
}

/// Local rotation changed
pub(crate) fn invalidate_rotation(nodes: &Nodes, entity: Entity) {
    let bits = TransformFlags::WORLD_EULER | TransformFlags::WORLD_QUAT | TransformFlags::WORLD_MATRIX;
    invalidate(nodes, entity, bits, bits | TransformFlags::WORLD_POSITION);
}

/// Local scale changed
pub(crate) fn invalidate_scale(nodes: &Nodes, entity: Entity) {
    let bits = TransformFlags::WORLD_SCALE | TransformFlags::WORLD_MATRIX;
    invalidate(nodes, entity, bits, bits | TransformFlags::WORLD_POSITION);
}

/// Local matrix replaced, world matrix replaced or parent changed
pub(crate) fn invalidate_all_world(nodes: &Nodes, entity: Entity) {
    invalidate(nodes, entity, TransformFlags::WORLD_ALL, TransformFlags::WORLD_ALL);
}

/// Read access to a transform and its parent chain
#[derive(Clone, Copy)]
pub struct TransformRef<'a> {
    nodes: &'a Nodes,
    node: &'a EntityNode,
    entity: Entity,
}

impl<'a> TransformRef<'a> {
    pub(crate) fn new(nodes: &'a Nodes, entity: Entity) -> Option<Self> {
        nodes.get(entity).map(|node| Self {
            nodes,
            node,
            entity,
        })
    }

    fn transform(&self) -> &'a Transform {
        &self.node.transform
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Transform of the parent entity, if any
    pub fn parent(&self) -> Option<TransformRef<'a>> {
        self.node
            .parent
            .and_then(|parent| TransformRef::new(self.nodes, parent))
    }

    pub fn position(&self) -> Vec3 {
        self.transform().position
    }

    /// Local rotation as Euler angles in degrees
    pub fn rotation(&self) -> Vec3 {
        let t = self.transform();
        if t.is_dirty(TransformFlags::LOCAL_EULER) {
            t.rotation.set(t.rotation_quaternion.get().to_euler_degrees());
            t.clean(TransformFlags::LOCAL_EULER);
            t.recomputed();
        }
        t.rotation.get()
    }

    pub fn rotation_quaternion(&self) -> Quat {
        let t = self.transform();
        if t.is_dirty(TransformFlags::LOCAL_QUAT) {
            t.rotation_quaternion.set(Quat::from_euler(t.rotation.get()));
            t.clean(TransformFlags::LOCAL_QUAT);
            t.recomputed();
        }
        t.rotation_quaternion.get()
    }

    pub fn scale(&self) -> Vec3 {
        self.transform().scale
    }

    pub fn local_matrix(&self) -> Mat4 {
        let t = self.transform();
        if t.is_dirty(TransformFlags::LOCAL_MATRIX) {
            let matrix = Mat4::compose(t.position, self.rotation_quaternion(), t.scale);
            t.local_matrix.set(matrix);
            t.clean(TransformFlags::LOCAL_MATRIX);
            t.recomputed();
        }
        t.local_matrix.get()
    }

    pub fn world_matrix(&self) -> Mat4 {
        let t = self.transform();
        if t.is_dirty(TransformFlags::WORLD_MATRIX) {
            let local = self.local_matrix();
            let world = match self.parent() {
                Some(parent) => parent.world_matrix() * local,
                None => local,
            };
            t.world_matrix.set(world);
            t.clean(TransformFlags::WORLD_MATRIX);
            t.recomputed();
        }
        t.world_matrix.get()
    }

    pub fn world_position(&self) -> Vec3 {
        let t = self.transform();
        if t.is_dirty(TransformFlags::WORLD_POSITION) {
            let position = match self.parent() {
                Some(_) => self.world_matrix().get_translation(),
                None => t.position,
            };
            t.world_position.set(position);
            t.clean(TransformFlags::WORLD_POSITION);
            t.recomputed();
        }
        t.world_position.get()
    }

    pub fn world_rotation_quaternion(&self) -> Quat {
        let t = self.transform();
        if t.is_dirty(TransformFlags::WORLD_QUAT) {
            let local = self.rotation_quaternion();
            let world = match self.parent() {
                Some(parent) => (parent.world_rotation_quaternion() * local).normalize(),
                None => local,
            };
            t.world_rotation_quaternion.set(world);
            t.clean(TransformFlags::WORLD_QUAT);
            t.recomputed();
        }
        t.world_rotation_quaternion.get()
    }

    /// World rotation as Euler angles in degrees
    pub fn world_rotation(&self) -> Vec3 {
        let t = self.transform();
        if t.is_dirty(TransformFlags::WORLD_EULER) {
            t.world_rotation
                .set(self.world_rotation_quaternion().to_euler_degrees());
            t.clean(TransformFlags::WORLD_EULER);
            t.recomputed();
        }
        t.world_rotation.get()
    }

    /// World scale with rotation removed
    ///
    /// Lossy because skew introduced by a non-uniformly scaled, rotated
    /// ancestor cannot be represented by a scale vector.
    pub fn lossy_world_scale(&self) -> Vec3 {
        let t = self.transform();
        if t.is_dirty(TransformFlags::WORLD_SCALE) {
            let scale = match self.parent() {
                Some(_) => {
                    let unrotate = self.world_rotation_quaternion().inverse().to_mat4();
                    let m = unrotate * self.world_matrix();
                    Vec3::new(m.cols[0][0], m.cols[1][1], m.cols[2][2])
                }
                None => t.scale,
            };
            t.lossy_world_scale.set(scale);
            t.clean(TransformFlags::WORLD_SCALE);
            t.recomputed();
        }
        t.lossy_world_scale.get()
    }

    /// Direction the transform faces (-Z)
    pub fn world_forward(&self) -> Vec3 {
        (-self.world_matrix().column3(2)).normalize()
    }

    pub fn world_right(&self) -> Vec3 {
        self.world_matrix().column3(0).normalize()
    }

    pub fn world_up(&self) -> Vec3 {
        self.world_matrix().column3(1).normalize()
    }

    /// Flag that turns true whenever a world-space value of this transform goes stale
    pub fn register_world_change_flag(&self) -> UpdateFlagHandle<BoolUpdateFlag> {
        self.transform()
            .update_flag_manager
            .create_flag(BoolUpdateFlag::new())
    }

    /// The manager observers of this transform register with
    pub fn update_flag_manager(&self) -> &'a UpdateFlagManager {
        &self.transform().update_flag_manager
    }

    /// Number of cached values recomputed so far
    pub fn recompute_count(&self) -> u64 {
        self.transform().recompute_count.get()
    }

    /// Current dirty bits
    pub fn flags(&self) -> TransformFlags {
        self.transform().flags.get()
    }
}

impl fmt::Debug for TransformRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRef")
            .field("entity", &self.entity)
            .field("transform", self.transform())
            .finish()
    }
}

/// Write access to a transform
///
/// Holds the scene arena mutably so setters can propagate dirty bits to
/// descendants. Getters are available through [`TransformMut::read`] and the
/// forwarding methods.
pub struct TransformMut<'a> {
    nodes: &'a mut Nodes,
    entity: Entity,
}

impl<'a> TransformMut<'a> {
    pub(crate) fn new(nodes: &'a mut Nodes, entity: Entity) -> Option<Self> {
        if !nodes.contains_key(entity) {
            return None;
        }
        Some(Self { nodes, entity })
    }

    /// Read-only view of the same transform
    pub fn read(&self) -> TransformRef<'_> {
        TransformRef {
            nodes: self.nodes,
            node: &self.nodes[self.entity],
            entity: self.entity,
        }
    }

    fn transform_mut(&mut self) -> &mut Transform {
        &mut self.nodes[self.entity].transform
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    // Forwarded getters

    pub fn position(&self) -> Vec3 {
        self.read().position()
    }

    pub fn rotation(&self) -> Vec3 {
        self.read().rotation()
    }

    pub fn rotation_quaternion(&self) -> Quat {
        self.read().rotation_quaternion()
    }

    pub fn scale(&self) -> Vec3 {
        self.read().scale()
    }

    pub fn local_matrix(&self) -> Mat4 {
        self.read().local_matrix()
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.read().world_matrix()
    }

    pub fn world_position(&self) -> Vec3 {
        self.read().world_position()
    }

    pub fn world_rotation(&self) -> Vec3 {
        self.read().world_rotation()
    }

    pub fn world_rotation_quaternion(&self) -> Quat {
        self.read().world_rotation_quaternion()
    }

    pub fn lossy_world_scale(&self) -> Vec3 {
        self.read().lossy_world_scale()
    }

    pub fn world_forward(&self) -> Vec3 {
        self.read().world_forward()
    }

    pub fn world_right(&self) -> Vec3 {
        self.read().world_right()
    }

    pub fn world_up(&self) -> Vec3 {
        self.read().world_up()
    }

    pub fn register_world_change_flag(&self) -> UpdateFlagHandle<BoolUpdateFlag> {
        self.read().register_world_change_flag()
    }

    // Local setters

    pub fn set_position(&mut self, position: Vec3) {
        let t = self.transform_mut();
        t.position = position;
        t.set_dirty(TransformFlags::LOCAL_MATRIX);
        invalidate_position(self.nodes, self.entity);
    }

    pub fn set_position_xyz(&mut self, x: f32, y: f32, z: f32) {
        self.set_position(Vec3::new(x, y, z));
    }

    /// Set the local rotation from Euler angles in degrees
    pub fn set_rotation(&mut self, rotation: Vec3) {
        let t = self.transform_mut();
        t.rotation.set(rotation);
        t.clean(TransformFlags::LOCAL_EULER);
        t.set_dirty(TransformFlags::LOCAL_QUAT | TransformFlags::LOCAL_MATRIX);
        invalidate_rotation(self.nodes, self.entity);
    }

    pub fn set_rotation_xyz(&mut self, x: f32, y: f32, z: f32) {
        self.set_rotation(Vec3::new(x, y, z));
    }

    pub fn set_rotation_quaternion(&mut self, rotation: Quat) {
        let t = self.transform_mut();
        t.rotation_quaternion.set(rotation.normalize());
        t.clean(TransformFlags::LOCAL_QUAT);
        t.set_dirty(TransformFlags::LOCAL_EULER | TransformFlags::LOCAL_MATRIX);
        invalidate_rotation(self.nodes, self.entity);
    }

    pub fn set_rotation_quaternion_xyzw(&mut self, x: f32, y: f32, z: f32, w: f32) {
        self.set_rotation_quaternion(Quat::new(x, y, z, w));
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        let t = self.transform_mut();
        t.scale = scale;
        t.set_dirty(TransformFlags::LOCAL_MATRIX);
        invalidate_scale(self.nodes, self.entity);
    }

    pub fn set_scale_xyz(&mut self, x: f32, y: f32, z: f32) {
        self.set_scale(Vec3::new(x, y, z));
    }

    /// Replace position, rotation and scale with the decomposition of `matrix`
    pub fn set_local_matrix(&mut self, matrix: Mat4) {
        let (position, rotation, scale) = matrix.decompose();
        let t = self.transform_mut();
        t.position = position;
        t.scale = scale;
        t.rotation_quaternion.set(rotation);
        t.local_matrix.set(matrix);
        t.clean(TransformFlags::LOCAL_QUAT | TransformFlags::LOCAL_MATRIX);
        t.set_dirty(TransformFlags::LOCAL_EULER);
        invalidate_all_world(self.nodes, self.entity);
    }

    // World setters

    /// Move so the world position becomes `position`
    ///
    /// No-op under a parent whose world matrix cannot be inverted.
    pub fn set_world_position(&mut self, position: Vec3) {
        let local = match self.read().parent() {
            Some(parent) => match parent.world_matrix().try_inverse() {
                Some(inverse) => inverse.transform_point(position),
                None => return,
            },
            None => position,
        };
        self.set_position(local);
    }

    pub fn set_world_position_xyz(&mut self, x: f32, y: f32, z: f32) {
        self.set_world_position(Vec3::new(x, y, z));
    }

    /// Set the world rotation from Euler angles in degrees
    pub fn set_world_rotation(&mut self, rotation: Vec3) {
        self.set_world_rotation_quaternion(Quat::from_euler(rotation));
    }

    pub fn set_world_rotation_xyz(&mut self, x: f32, y: f32, z: f32) {
        self.set_world_rotation(Vec3::new(x, y, z));
    }

    pub fn set_world_rotation_quaternion(&mut self, rotation: Quat) {
        let local = match self.read().parent() {
            Some(parent) => parent.world_rotation_quaternion().inverse() * rotation,
            None => rotation,
        };
        self.set_rotation_quaternion(local);
    }

    pub fn set_world_rotation_quaternion_xyzw(&mut self, x: f32, y: f32, z: f32, w: f32) {
        self.set_world_rotation_quaternion(Quat::new(x, y, z, w));
    }

    /// Set the local matrix so the world matrix becomes `matrix`
    ///
    /// No-op under a parent whose world matrix cannot be inverted.
    pub fn set_world_matrix(&mut self, matrix: Mat4) {
        let local = match self.read().parent() {
            Some(parent) => match parent.world_matrix().try_inverse() {
                Some(inverse) => inverse * matrix,
                None => return,
            },
            None => matrix,
        };
        self.set_local_matrix(local);
    }

    // Incremental operations

    /// Move by `delta`
    ///
    /// With `relative_to_local` the delta is expressed in the transform's own
    /// rotated axes; otherwise it is a world-space offset.
    pub fn translate(&mut self, delta: Vec3, relative_to_local: bool) {
        if relative_to_local {
            let offset = self.rotation_quaternion().rotate_vec3(delta);
            let position = self.position() + offset;
            self.set_position(position);
        } else {
            let position = self.world_position() + delta;
            self.set_world_position(position);
        }
    }

    pub fn translate_xyz(&mut self, x: f32, y: f32, z: f32, relative_to_local: bool) {
        self.translate(Vec3::new(x, y, z), relative_to_local);
    }

    /// Rotate by Euler angles in degrees
    ///
    /// Local rotations compose on the right of the local rotation, world
    /// rotations on the left of the world rotation.
    pub fn rotate(&mut self, euler_delta: Vec3, relative_to_local: bool) {
        self.rotate_by_quat(Quat::from_euler(euler_delta), relative_to_local);
    }

    pub fn rotate_xyz(&mut self, x: f32, y: f32, z: f32, relative_to_local: bool) {
        self.rotate(Vec3::new(x, y, z), relative_to_local);
    }

    /// Rotate around `axis` by `degrees`; a zero axis is ignored
    pub fn rotate_by_axis(&mut self, axis: Vec3, degrees: f32, relative_to_local: bool) {
        if axis.length() < ZERO_TOLERANCE {
            return;
        }
        let delta = Quat::from_axis_angle(axis.normalize(), degrees.to_radians());
        self.rotate_by_quat(delta, relative_to_local);
    }

    fn rotate_by_quat(&mut self, delta: Quat, relative_to_local: bool) {
        if relative_to_local {
            let rotation = self.rotation_quaternion() * delta;
            self.set_rotation_quaternion(rotation);
        } else {
            let rotation = delta * self.world_rotation_quaternion();
            self.set_world_rotation_quaternion(rotation);
        }
    }

    /// Turn so that -Z points at `target`
    ///
    /// No-op when the target is at this transform's position or `world_up`
    /// is parallel to the viewing direction.
    pub fn look_at(&mut self, target: Vec3, world_up: Vec3) {
        let back = self.world_position() - target;
        if back.length() < ZERO_TOLERANCE {
            return;
        }
        let z_axis = back.normalize();
        let x_axis = world_up.cross(z_axis);
        if x_axis.length() < ZERO_TOLERANCE {
            return;
        }
        let x_axis = x_axis.normalize();
        let y_axis = z_axis.cross(x_axis);
        self.set_world_rotation_quaternion(Quat::from_rotation_axes(x_axis, y_axis, z_axis));
    }
}

impl fmt::Debug for TransformMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformMut")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;

    const EPS: f32 = 1e-4;

    fn chain(scene: &mut Scene, depth: usize) -> Vec<Entity> {
        let mut entities = vec![scene.create_entity("root")];
        for i in 1..depth {
            let parent = entities[i - 1];
            entities.push(scene.create_child(parent, format!("node{i}")).unwrap());
        }
        entities
    }

    #[test]
    fn test_world_matrix_is_product_of_locals() {
        let mut scene = Scene::new();
        let nodes = chain(&mut scene, 4);

        for (i, &e) in nodes.iter().enumerate() {
            let f = i as f32 + 1.0;
            let mut t = scene.transform_mut(e).unwrap();
            t.set_position_xyz(f, -f * 0.5, 2.0);
            t.set_rotation_xyz(10.0 * f, 20.0 * f, -5.0 * f);
            t.set_scale_xyz(1.0 + 0.1 * f, 1.0, 0.9);
        }
        // Mutate the middle after the leaf was set up
        scene.transform_mut(nodes[1]).unwrap().translate_xyz(0.0, 3.0, 0.0, true);
        scene.transform_mut(nodes[0]).unwrap().rotate_xyz(0.0, 45.0, 0.0, false);

        let mut expected = Mat4::IDENTITY;
        for &e in &nodes {
            expected = expected * scene.transform(e).unwrap().local_matrix();
        }
        let leaf = scene.transform(nodes[3]).unwrap().world_matrix();
        assert!(leaf.approx_eq(&expected, EPS), "{leaf:?} != {expected:?}");
    }

    #[test]
    fn test_child_world_position_follows_parent() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let child = scene.create_child(root, "child").unwrap();
        scene.transform_mut(child).unwrap().set_position_xyz(1.0, 0.0, 0.0);

        scene
            .transform_mut(root)
            .unwrap()
            .translate(Vec3::new(0.0, 5.0, 0.0), true);

        let world = scene.transform(child).unwrap().world_position();
        assert!(world.approx_eq(Vec3::new(1.0, 5.0, 0.0), EPS), "{world:?}");
    }

    #[test]
    fn test_look_at_points_forward_at_target() {
        let mut scene = Scene::new();
        let e = scene.create_entity("camera");
        let mut t = scene.transform_mut(e).unwrap();
        t.set_position_xyz(0.0, 0.0, 10.0);
        t.look_at(Vec3::ZERO, Vec3::UP);

        let forward = t.world_forward();
        assert!(forward.approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5), "{forward:?}");

        // From the side
        t.set_position_xyz(10.0, 0.0, 0.0);
        t.look_at(Vec3::ZERO, Vec3::UP);
        assert!(t.world_forward().approx_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-5));
        assert!(t.world_up().approx_eq(Vec3::UP, 1e-5));
    }

    #[test]
    fn test_look_at_degenerate_is_noop() {
        let mut scene = Scene::new();
        let e = scene.create_entity("e");
        let mut t = scene.transform_mut(e).unwrap();
        t.set_position_xyz(0.0, 5.0, 0.0);
        t.set_rotation_xyz(10.0, 20.0, 30.0);
        let before = t.rotation_quaternion();

        t.look_at(Vec3::new(0.0, 5.0, 0.0), Vec3::UP);
        assert_eq!(t.rotation_quaternion(), before);

        // Up parallel to the viewing direction
        t.look_at(Vec3::ZERO, Vec3::UP);
        assert_eq!(t.rotation_quaternion(), before);
    }

    #[test]
    fn test_repeated_reads_do_not_recompute() {
        let mut scene = Scene::new();
        let nodes = chain(&mut scene, 3);
        scene.transform_mut(nodes[0]).unwrap().set_rotation_xyz(0.0, 90.0, 0.0);
        scene.transform_mut(nodes[2]).unwrap().set_scale_xyz(2.0, 2.0, 2.0);

        let leaf = scene.transform(nodes[2]).unwrap();
        let read_all = || {
            (
                leaf.world_matrix(),
                leaf.world_position(),
                leaf.world_rotation(),
                leaf.world_rotation_quaternion(),
                leaf.lossy_world_scale(),
            )
        };
        let first = read_all();
        let count = leaf.recompute_count();
        let second = read_all();
        assert_eq!(first, second);
        assert_eq!(leaf.recompute_count(), count);
        assert!(leaf.flags().is_empty());
    }

    #[test]
    fn test_euler_quaternion_round_trip() {
        let mut scene = Scene::new();
        let e = scene.create_entity("e");
        let mut t = scene.transform_mut(e).unwrap();

        for euler in [
            Vec3::new(30.0, 45.0, 60.0),
            Vec3::new(-20.0, 170.0, 5.0),
            Vec3::new(80.0, -30.0, -120.0),
        ] {
            let q = Quat::from_euler(euler);
            t.set_rotation_quaternion(q);
            let back = t.rotation();
            assert!(back.approx_eq(euler, 1e-2), "{euler:?} -> {back:?}");
            assert!(Quat::from_euler(back).approx_eq_rotation(q, 1e-4));
        }
    }

    #[test]
    fn test_invalidate_position_bits() {
        let mut scene = Scene::new();
        let nodes = chain(&mut scene, 3);
        let _ = scene.transform(nodes[2]).unwrap().world_matrix();

        scene.transform_mut(nodes[1]).unwrap().set_position_xyz(1.0, 0.0, 0.0);
        let world = TransformFlags::WORLD_POSITION | TransformFlags::WORLD_MATRIX;
        assert!(scene.transform(nodes[0]).unwrap().flags().is_empty());
        assert_eq!(
            scene.transform(nodes[1]).unwrap().flags(),
            world | TransformFlags::LOCAL_MATRIX
        );
        assert_eq!(scene.transform(nodes[2]).unwrap().flags(), world);
    }

    #[test]
    fn test_invalidate_rotation_bits() {
        let mut scene = Scene::new();
        let nodes = chain(&mut scene, 3);
        let _ = scene.transform(nodes[2]).unwrap().world_matrix();

        scene.transform_mut(nodes[1]).unwrap().set_rotation_xyz(0.0, 30.0, 0.0);
        let own = TransformFlags::WORLD_EULER | TransformFlags::WORLD_QUAT | TransformFlags::WORLD_MATRIX;
        assert_eq!(
            scene.transform(nodes[1]).unwrap().flags(),
            own | TransformFlags::LOCAL_QUAT | TransformFlags::LOCAL_MATRIX
        );
        assert_eq!(
            scene.transform(nodes[2]).unwrap().flags(),
            own | TransformFlags::WORLD_POSITION
        );
    }

    #[test]
    fn test_invalidate_scale_bits() {
        let mut scene = Scene::new();
        let nodes = chain(&mut scene, 3);
        let _ = scene.transform(nodes[2]).unwrap().world_matrix();

        scene.transform_mut(nodes[1]).unwrap().set_scale_xyz(2.0, 2.0, 2.0);
        let own = TransformFlags::WORLD_SCALE | TransformFlags::WORLD_MATRIX;
        assert_eq!(
            scene.transform(nodes[1]).unwrap().flags(),
            own | TransformFlags::LOCAL_MATRIX
        );
        assert_eq!(
            scene.transform(nodes[2]).unwrap().flags(),
            own | TransformFlags::WORLD_POSITION
        );
    }

    #[test]
    fn test_world_change_flag() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let child = scene.create_child(root, "child").unwrap();
        let _ = scene.transform(child).unwrap().world_matrix();

        let flag = scene.transform(child).unwrap().register_world_change_flag();
        assert!(!flag.get());

        scene.transform_mut(root).unwrap().set_position_xyz(0.0, 1.0, 0.0);
        assert!(flag.take());

        // Still dirty, so no new notification
        scene.transform_mut(root).unwrap().set_position_xyz(0.0, 2.0, 0.0);
        assert!(!flag.get());

        let _ = scene.transform(child).unwrap().world_position();
        let _ = scene.transform(child).unwrap().world_matrix();
        scene.transform_mut(root).unwrap().set_position_xyz(0.0, 3.0, 0.0);
        assert!(flag.get());

        let manager_len = scene.transform(child).unwrap().update_flag_manager().len();
        drop(flag);
        assert_eq!(
            scene.transform(child).unwrap().update_flag_manager().len(),
            manager_len - 1
        );
    }

    #[test]
    fn test_set_world_position_under_transformed_parent() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let child = scene.create_child(root, "child").unwrap();
        {
            let mut parent = scene.transform_mut(root).unwrap();
            parent.set_position_xyz(5.0, 0.0, 0.0);
            parent.set_rotation_xyz(0.0, 90.0, 0.0);
            parent.set_scale_xyz(2.0, 2.0, 2.0);
        }

        let target = Vec3::new(1.0, 2.0, 3.0);
        scene.transform_mut(child).unwrap().set_world_position(target);
        let world = scene.transform(child).unwrap().world_position();
        assert!(world.approx_eq(target, EPS), "{world:?}");
    }

    #[test]
    fn test_set_world_rotation_under_rotated_parent() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let child = scene.create_child(root, "child").unwrap();
        scene.transform_mut(root).unwrap().set_rotation_xyz(0.0, 45.0, 0.0);

        let target = Quat::from_euler_degrees(10.0, 20.0, 30.0);
        scene
            .transform_mut(child)
            .unwrap()
            .set_world_rotation_quaternion(target);
        let world = scene.transform(child).unwrap().world_rotation_quaternion();
        assert!(world.approx_eq_rotation(target, 1e-4));
    }

    #[test]
    fn test_set_local_matrix_decomposes() {
        let mut scene = Scene::new();
        let e = scene.create_entity("e");
        let rotation = Quat::from_euler_degrees(0.0, 30.0, 0.0);
        let m = Mat4::compose(Vec3::new(1.0, 2.0, 3.0), rotation, Vec3::new(2.0, 3.0, 4.0));

        let mut t = scene.transform_mut(e).unwrap();
        t.set_local_matrix(m);
        assert!(t.position().approx_eq(Vec3::new(1.0, 2.0, 3.0), EPS));
        assert!(t.scale().approx_eq(Vec3::new(2.0, 3.0, 4.0), EPS));
        assert!(t.rotation_quaternion().approx_eq_rotation(rotation, 1e-4));
        assert!(t.rotation().approx_eq(Vec3::new(0.0, 30.0, 0.0), 1e-2));
        assert!(t.world_matrix().approx_eq(&m, EPS));
    }

    #[test]
    fn test_set_world_matrix_under_parent() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let child = scene.create_child(root, "child").unwrap();
        scene.transform_mut(root).unwrap().set_position_xyz(0.0, 10.0, 0.0);

        let m = Mat4::from_translation(Vec3::new(1.0, 1.0, 1.0));
        scene.transform_mut(child).unwrap().set_world_matrix(m);
        let t = scene.transform(child).unwrap();
        assert!(t.position().approx_eq(Vec3::new(1.0, -9.0, 1.0), EPS));
        assert!(t.world_matrix().approx_eq(&m, EPS));
    }

    #[test]
    fn test_translate_local_vs_world() {
        let mut scene = Scene::new();
        let e = scene.create_entity("e");
        let mut t = scene.transform_mut(e).unwrap();
        t.set_rotation_xyz(0.0, 90.0, 0.0);

        // Local -Z after a 90 degree yaw is world -X
        t.translate(Vec3::new(0.0, 0.0, -1.0), true);
        assert!(t.position().approx_eq(Vec3::new(-1.0, 0.0, 0.0), EPS));

        t.translate(Vec3::new(0.0, 0.0, -1.0), false);
        assert!(t.position().approx_eq(Vec3::new(-1.0, 0.0, -1.0), EPS));
    }

    #[test]
    fn test_rotate_local_vs_world() {
        let mut scene = Scene::new();
        let e = scene.create_entity("e");
        let mut t = scene.transform_mut(e).unwrap();
        t.set_rotation_xyz(90.0, 0.0, 0.0);
        let base = t.rotation_quaternion();
        let delta = Quat::from_euler_degrees(0.0, 45.0, 0.0);

        t.rotate_xyz(0.0, 45.0, 0.0, true);
        assert!(t.rotation_quaternion().approx_eq_rotation(base * delta, 1e-4));

        t.set_rotation_quaternion(base);
        t.rotate_by_axis(Vec3::UP, 45.0, false);
        assert!(t.rotation_quaternion().approx_eq_rotation(delta * base, 1e-4));

        // Zero axis is ignored
        t.rotate_by_axis(Vec3::ZERO, 45.0, false);
        assert!(t.rotation_quaternion().approx_eq_rotation(delta * base, 1e-4));
    }

    #[test]
    fn test_lossy_world_scale() {
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let child = scene.create_child(root, "child").unwrap();
        scene.transform_mut(root).unwrap().set_scale_xyz(2.0, 3.0, 4.0);
        scene.transform_mut(child).unwrap().set_scale_xyz(0.5, 1.0, 2.0);

        let scale = scene.transform(child).unwrap().lossy_world_scale();
        assert!(scale.approx_eq(Vec3::new(1.0, 3.0, 8.0), EPS), "{scale:?}");
    }
}
