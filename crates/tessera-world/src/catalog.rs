//! Archetype catalog: the default templates live entities are instantiated
//! from.
//!
//! Each archetype is backed by a *prefab* entity held in the world. Prefabs
//! carry the archetype's default components but are invisible to every
//! spatial query and to [`World::entities`](crate::world::World::entities).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::entity::EntityId;

/// Stable archetype identifier chosen by the host.
///
/// Persisted inside schematics, so it must not change between runs for the
/// same template.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeId(pub i32);

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    prefab: EntityId,
    name: String,
}

/// Maps [`ArchetypeId`]s to their prefab entities and display names.
#[derive(Debug, Default)]
pub struct ArchetypeCatalog {
    entries: HashMap<ArchetypeId, CatalogEntry>,
    by_name: HashMap<String, ArchetypeId>,
}

impl ArchetypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a prefab. Returns `false` if `id` is already registered.
    pub(crate) fn insert(&mut self, id: ArchetypeId, name: &str, prefab: EntityId) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(
            id,
            CatalogEntry {
                prefab,
                name: name.to_owned(),
            },
        );
        self.by_name.entry(name.to_owned()).or_insert(id);
        true
    }

    /// Forget `id`, returning the prefab entity it pointed at.
    pub(crate) fn remove(&mut self, id: ArchetypeId) -> Option<EntityId> {
        let entry = self.entries.remove(&id)?;
        if self.by_name.get(&entry.name) == Some(&id) {
            self.by_name.remove(&entry.name);
            // Another archetype may share the display name.
            if let Some((other, _)) = self
                .entries
                .iter()
                .filter(|(_, e)| e.name == entry.name)
                .min_by_key(|(other, _)| **other)
            {
                self.by_name.insert(entry.name.clone(), *other);
            }
        }
        Some(entry.prefab)
    }

    /// The prefab entity backing `id`, or `None` if it is not registered.
    pub fn lookup(&self, id: ArchetypeId) -> Option<EntityId> {
        self.entries.get(&id).map(|e| e.prefab)
    }

    /// Human-readable archetype name.
    pub fn display_name(&self, id: ArchetypeId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.name.as_str())
    }

    /// Find an archetype by display name.
    pub fn find_by_name(&self, name: &str) -> Option<ArchetypeId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: ArchetypeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
