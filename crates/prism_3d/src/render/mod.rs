//! Render queue and renderer components

mod renderer;

pub use renderer::MeshRenderer;

use std::cmp::Ordering;

use crate::materials::{MaterialId, RenderQueueType};
use crate::mesh::MeshId;
use crate::scene::Entity;

/// One draw: an entity's renderer resolved against its material
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderElement {
    pub entity: Entity,
    pub mesh: MeshId,
    pub material: MaterialId,
    pub queue: RenderQueueType,
    /// Distance from the camera to the entity's world position
    pub distance: f32,
}

/// Frame's draws in submission order
#[derive(Debug, Default)]
pub struct RenderQueue {
    elements: Vec<RenderElement>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: RenderElement) {
        self.elements.push(element);
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[RenderElement] {
        &self.elements
    }

    /// Order by queue, then by distance within each queue
    ///
    /// Stable, so equal keys keep insertion order.
    pub fn sort(&mut self) {
        self.elements.sort_by(compare_elements);
    }
}

fn compare_elements(a: &RenderElement, b: &RenderElement) -> Ordering {
    a.queue.cmp(&b.queue).then_with(|| {
        if a.queue.sorts_back_to_front() {
            b.distance.total_cmp(&a.distance)
        } else {
            a.distance.total_cmp(&b.distance)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_sort_order() {
        let mut entities: SlotMap<Entity, ()> = SlotMap::with_key();
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        let mut materials: SlotMap<MaterialId, ()> = SlotMap::with_key();
        let mesh = meshes.insert(());
        let material = materials.insert(());

        let mut queue = RenderQueue::new();
        let mut element = |queue_type, distance| RenderElement {
            entity: entities.insert(()),
            mesh,
            material,
            queue: queue_type,
            distance,
        };
        let far_transparent = element(RenderQueueType::Transparent, 20.0);
        let near_transparent = element(RenderQueueType::Transparent, 5.0);
        let far_opaque = element(RenderQueueType::Opaque, 30.0);
        let near_opaque = element(RenderQueueType::Opaque, 1.0);
        let alpha_test = element(RenderQueueType::AlphaTest, 0.5);

        for e in [near_transparent, far_opaque, alpha_test, far_transparent, near_opaque] {
            queue.push(e);
        }
        queue.sort();

        let order: Vec<Entity> = queue.elements().iter().map(|e| e.entity).collect();
        assert_eq!(
            order,
            vec![
                near_opaque.entity,
                far_opaque.entity,
                alpha_test.entity,
                far_transparent.entity,
                near_transparent.entity,
            ]
        );
    }
}
