//! Entities and the scene arena

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use super::transform::Transform;

new_key_type! {
    /// Unique identifier for an entity in a scene
    pub struct Entity;
}

/// Per-entity storage: name, activity, hierarchy links and transform
#[derive(Debug)]
pub(crate) struct EntityNode {
    pub name: String,
    pub active: bool,
    pub parent: Option<Entity>,
    pub children: SmallVec<[Entity; 8]>,
    pub transform: Transform,
}

impl EntityNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            parent: None,
            children: SmallVec::new(),
            transform: Transform::new(),
        }
    }
}

pub(crate) type Nodes = SlotMap<Entity, EntityNode>;

/// True if `ancestor` is `entity` or one of its ancestors
pub(crate) fn is_ancestor_or_self(nodes: &Nodes, ancestor: Entity, entity: Entity) -> bool {
    let mut current = Some(entity);
    while let Some(e) = current {
        if e == ancestor {
            return true;
        }
        current = nodes.get(e).and_then(|n| n.parent);
    }
    false
}

/// Remove `child` from its parent's child list
pub(crate) fn detach(nodes: &mut Nodes, child: Entity) {
    let Some(parent) = nodes.get_mut(child).and_then(|n| n.parent.take()) else {
        return;
    };
    if let Some(siblings) = nodes.get_mut(parent).map(|n| &mut n.children) {
        siblings.retain(|e| *e != child);
    }
}
