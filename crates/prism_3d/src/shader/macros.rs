//! Shader macros
//!
//! A macro is a preprocessor define, optionally with a value. Each distinct
//! name/value pair gets a global index, and a [`ShaderMacroCollection`] is a
//! bitset over those indices. Collections are cheap to union and hash, which
//! makes them the key for compiled program variants.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

struct MacroEntry {
    index: u32,
    name: String,
    value: Option<String>,
}

/// A registered preprocessor define
#[derive(Clone)]
pub struct ShaderMacro(Arc<MacroEntry>);

#[derive(Default)]
struct MacroRegistry {
    by_key: FxHashMap<(String, Option<String>), ShaderMacro>,
    by_index: Vec<ShaderMacro>,
}

static MACROS: LazyLock<Mutex<MacroRegistry>> =
    LazyLock::new(|| Mutex::new(MacroRegistry::default()));

impl ShaderMacro {
    /// Get the macro for a plain define
    pub fn get_by_name(name: &str) -> ShaderMacro {
        Self::get(name, None)
    }

    /// Get the macro for a define with a value, e.g. `LIGHT_COUNT 4`
    pub fn get_by_name_value(name: &str, value: &str) -> ShaderMacro {
        Self::get(name, Some(value))
    }

    fn get(name: &str, value: Option<&str>) -> ShaderMacro {
        let key = (name.to_string(), value.map(str::to_string));
        let mut registry = MACROS.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = registry.by_key.get(&key) {
            return existing.clone();
        }

        let entry = ShaderMacro(Arc::new(MacroEntry {
            index: registry.by_index.len() as u32,
            name: key.0.clone(),
            value: key.1.clone(),
        }));
        registry.by_index.push(entry.clone());
        registry.by_key.insert(key, entry.clone());
        entry
    }

    fn by_index(index: u32) -> Option<ShaderMacro> {
        let registry = MACROS.lock().unwrap_or_else(PoisonError::into_inner);
        registry.by_index.get(index as usize).cloned()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn value(&self) -> Option<&str> {
        self.0.value.as_deref()
    }

    pub fn index(&self) -> u32 {
        self.0.index
    }
}

impl std::fmt::Debug for ShaderMacro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.value {
            Some(value) => write!(f, "ShaderMacro({} {})", self.0.name, value),
            None => write!(f, "ShaderMacro({})", self.0.name),
        }
    }
}

/// Set of enabled macros
///
/// Trailing zero words are never stored, so equal sets always compare and hash
/// equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderMacroCollection {
    mask: SmallVec<[u32; 2]>,
}

impl ShaderMacroCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self, shader_macro: &ShaderMacro) {
        let (word, bit) = Self::slot(shader_macro.index());
        if self.mask.len() <= word {
            self.mask.resize(word + 1, 0);
        }
        self.mask[word] |= bit;
    }

    pub fn disable(&mut self, shader_macro: &ShaderMacro) {
        let (word, bit) = Self::slot(shader_macro.index());
        if let Some(w) = self.mask.get_mut(word) {
            *w &= !bit;
        }
        self.trim();
    }

    /// Disable every define with this name, whatever its value
    pub fn disable_name(&mut self, name: &str) {
        let enabled: Vec<_> = self.macros().filter(|m| m.name() == name).collect();
        for shader_macro in &enabled {
            self.disable(shader_macro);
        }
    }

    pub fn is_enabled(&self, shader_macro: &ShaderMacro) -> bool {
        let (word, bit) = Self::slot(shader_macro.index());
        self.mask.get(word).is_some_and(|w| w & bit != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn clear(&mut self) {
        self.mask.clear();
    }

    /// Union of two collections
    pub fn union(a: &ShaderMacroCollection, b: &ShaderMacroCollection) -> ShaderMacroCollection {
        let len = a.mask.len().max(b.mask.len());
        let mask = (0..len)
            .map(|i| a.mask.get(i).copied().unwrap_or(0) | b.mask.get(i).copied().unwrap_or(0))
            .collect();
        ShaderMacroCollection { mask }
    }

    /// Add every macro of `other` to this collection
    pub fn union_with(&mut self, other: &ShaderMacroCollection) {
        *self = Self::union(self, other);
    }

    /// Iterate the enabled macros in index order
    pub fn macros(&self) -> impl Iterator<Item = ShaderMacro> + '_ {
        self.mask.iter().enumerate().flat_map(|(word, bits)| {
            (0..32u32)
                .filter(move |bit| bits & (1u32 << bit) != 0)
                .filter_map(move |bit| ShaderMacro::by_index(word as u32 * 32 + bit))
        })
    }

    /// Enabled defines as name/value pairs
    pub fn defines(&self) -> FxHashMap<String, Option<String>> {
        self.macros()
            .map(|m| (m.name().to_string(), m.value().map(str::to_string)))
            .collect()
    }

    fn slot(index: u32) -> (usize, u32) {
        ((index / 32) as usize, 1 << (index % 32))
    }

    fn trim(&mut self) {
        while self.mask.last() == Some(&0) {
            self.mask.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_identity() {
        let a = ShaderMacro::get_by_name("TEST_MACRO_IDENTITY");
        let b = ShaderMacro::get_by_name("TEST_MACRO_IDENTITY");
        let c = ShaderMacro::get_by_name_value("TEST_MACRO_IDENTITY", "2");
        assert_eq!(a.index(), b.index());
        assert_ne!(a.index(), c.index());
        assert_eq!(c.value(), Some("2"));
    }

    #[test]
    fn test_collection_enable_disable() {
        let m = ShaderMacro::get_by_name("TEST_MACRO_TOGGLE");
        let mut collection = ShaderMacroCollection::new();
        collection.enable(&m);
        assert!(collection.is_enabled(&m));

        collection.disable(&m);
        assert!(!collection.is_enabled(&m));
        assert!(collection.is_empty());
        assert_eq!(collection, ShaderMacroCollection::default());
    }

    #[test]
    fn test_union_and_defines() {
        let a = ShaderMacro::get_by_name("TEST_MACRO_UNION_A");
        let b = ShaderMacro::get_by_name_value("TEST_MACRO_UNION_B", "3");
        let mut left = ShaderMacroCollection::new();
        left.enable(&a);
        let mut right = ShaderMacroCollection::new();
        right.enable(&b);

        let both = ShaderMacroCollection::union(&left, &right);
        assert!(both.is_enabled(&a) && both.is_enabled(&b));

        let defines = both.defines();
        assert_eq!(defines.get("TEST_MACRO_UNION_A"), Some(&None));
        assert_eq!(defines.get("TEST_MACRO_UNION_B"), Some(&Some("3".to_string())));
    }

    #[test]
    fn test_disable_name() {
        let one = ShaderMacro::get_by_name_value("TEST_MACRO_BY_NAME", "1");
        let two = ShaderMacro::get_by_name_value("TEST_MACRO_BY_NAME", "2");
        let mut collection = ShaderMacroCollection::new();
        collection.enable(&one);
        collection.enable(&two);
        collection.disable_name("TEST_MACRO_BY_NAME");
        assert!(collection.is_empty());
    }
}
