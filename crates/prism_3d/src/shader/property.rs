//! Shader properties
//!
//! A process-wide registry maps shader variable names to small integer ids. The
//! first lookup of a name allocates the next id; every later lookup returns the
//! same property. A property's update-frequency group is fixed by the first
//! [`ShaderData`](super::ShaderData) that writes it.

use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, Mutex, OnceLock, PoisonError};

use crate::error::{Error, Result};

/// Update frequency of shader data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderDataGroup {
    /// Changes at most once per frame
    Scene,
    /// Changes per camera
    Camera,
    /// Changes per draw
    Renderer,
    /// Changes per material switch
    Material,
}

struct PropertyEntry {
    id: u32,
    name: String,
    group: OnceLock<ShaderDataGroup>,
}

/// Named, globally unique shader variable
#[derive(Clone)]
pub struct ShaderProperty(Arc<PropertyEntry>);

#[derive(Default)]
struct PropertyRegistry {
    by_name: FxHashMap<String, ShaderProperty>,
    by_id: Vec<ShaderProperty>,
}

static PROPERTIES: LazyLock<Mutex<PropertyRegistry>> =
    LazyLock::new(|| Mutex::new(PropertyRegistry::default()));

impl ShaderProperty {
    /// Get the property for a name, registering it on first use
    pub fn get_by_name(name: &str) -> ShaderProperty {
        let mut registry = PROPERTIES.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(property) = registry.by_name.get(name) {
            return property.clone();
        }

        let property = ShaderProperty(Arc::new(PropertyEntry {
            id: registry.by_id.len() as u32,
            name: name.to_string(),
            group: OnceLock::new(),
        }));
        registry.by_name.insert(name.to_string(), property.clone());
        registry.by_id.push(property.clone());
        property
    }

    /// Look up an already registered property
    pub fn get_by_id(id: u32) -> Option<ShaderProperty> {
        let registry = PROPERTIES.lock().unwrap_or_else(PoisonError::into_inner);
        registry.by_id.get(id as usize).cloned()
    }

    /// Look up a name without registering it
    pub fn find(name: &str) -> Option<ShaderProperty> {
        let registry = PROPERTIES.lock().unwrap_or_else(PoisonError::into_inner);
        registry.by_name.get(name).cloned()
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Group assigned by the first write, if any
    pub fn group(&self) -> Option<ShaderDataGroup> {
        self.0.group.get().copied()
    }

    /// Assign the group on first use and reject any other group afterwards
    pub(crate) fn bind_group(&self, group: ShaderDataGroup) -> Result<()> {
        let assigned = *self.0.group.get_or_init(|| group);
        if assigned == group {
            Ok(())
        } else {
            Err(Error::GroupConflict {
                property: self.0.name.clone(),
                assigned,
                attempted: group,
            })
        }
    }
}

impl PartialEq for ShaderProperty {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ShaderProperty {}

impl Hash for ShaderProperty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ShaderProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProperty")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("group", &self.group())
            .finish()
    }
}

/// Anything that names a shader property
pub trait IntoShaderProperty {
    fn into_property(self) -> ShaderProperty;
}

impl IntoShaderProperty for ShaderProperty {
    fn into_property(self) -> ShaderProperty {
        self
    }
}

impl IntoShaderProperty for &ShaderProperty {
    fn into_property(self) -> ShaderProperty {
        self.clone()
    }
}

impl IntoShaderProperty for &str {
    fn into_property(self) -> ShaderProperty {
        ShaderProperty::get_by_name(self)
    }
}

impl IntoShaderProperty for &String {
    fn into_property(self) -> ShaderProperty {
        ShaderProperty::get_by_name(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_property() {
        let a = ShaderProperty::get_by_name("test_property_identity");
        let b = ShaderProperty::get_by_name("test_property_identity");
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_different_names_never_collide() {
        let a = ShaderProperty::get_by_name("test_property_distinct_a");
        let b = ShaderProperty::get_by_name("test_property_distinct_b");
        assert_ne!(a.id(), b.id());
        assert_eq!(ShaderProperty::get_by_id(a.id()), Some(a));
        assert_eq!(ShaderProperty::find("test_property_distinct_b"), Some(b));
        assert_eq!(ShaderProperty::find("test_property_never_registered"), None);
    }

    #[test]
    fn test_group_is_assigned_once() {
        let p = ShaderProperty::get_by_name("test_property_group_once");
        assert_eq!(p.group(), None);
        p.bind_group(ShaderDataGroup::Material).unwrap();
        p.bind_group(ShaderDataGroup::Material).unwrap();
        assert_eq!(p.group(), Some(ShaderDataGroup::Material));

        let err = p.bind_group(ShaderDataGroup::Camera).unwrap_err();
        assert!(matches!(
            err,
            Error::GroupConflict {
                assigned: ShaderDataGroup::Material,
                attempted: ShaderDataGroup::Camera,
                ..
            }
        ));
        assert_eq!(p.group(), Some(ShaderDataGroup::Material));
    }
}
