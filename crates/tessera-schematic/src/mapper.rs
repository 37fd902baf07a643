//! Session-local integer identities for captured entities.
//!
//! A schematic cannot store live [`EntityId`]s: they mean nothing once the
//! world changes. Capture instead gives every captured entity a dense index
//! starting at 1, and every cross-entity reference inside a patch is written
//! as such an index. Index 0 is reserved for "no reference".
//!
//! [`EntityMapper`] is the capture-side table; [`CreatedEntities`] is its
//! restore-side counterpart, filled in as entities are spawned.

use std::collections::HashMap;

use tessera_world::entity::EntityId;

/// The index meaning "no reference".
pub const NULL_INDEX: usize = 0;

// ---------------------------------------------------------------------------
// EntityMapper
// ---------------------------------------------------------------------------

/// Bidirectional table between live entities and capture indices.
///
/// Grows monotonically; an index once assigned is never rebound.
#[derive(Debug, Clone, Default)]
pub struct EntityMapper {
    /// `entities[i - 1]` is the entity at index `i`.
    entities: Vec<EntityId>,
    indices: HashMap<EntityId, usize>,
}

impl EntityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `entity` the next index, or return the index it already has.
    pub fn assign(&mut self, entity: EntityId) -> usize {
        if let Some(&index) = self.indices.get(&entity) {
            return index;
        }
        self.entities.push(entity);
        let index = self.entities.len();
        self.indices.insert(entity, index);
        index
    }

    /// The index of `entity`, or [`NULL_INDEX`] if it was never assigned.
    pub fn index_of(&self, entity: EntityId) -> usize {
        self.indices.get(&entity).copied().unwrap_or(NULL_INDEX)
    }

    /// Translate an optional reference into an index; references outside the
    /// captured set become [`NULL_INDEX`].
    pub fn index_of_ref(&self, entity: Option<EntityId>) -> usize {
        entity.map_or(NULL_INDEX, |e| self.index_of(e))
    }

    /// The entity at `index`, if the mapper produced it.
    pub fn entity_at(&self, index: usize) -> Option<EntityId> {
        index
            .checked_sub(1)
            .and_then(|slot| self.entities.get(slot))
            .copied()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.indices.contains_key(&entity)
    }

    /// Number of assigned indices (the highest index).
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// `(index, entity)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, EntityId)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .map(|(slot, &entity)| (slot + 1, entity))
    }
}

// ---------------------------------------------------------------------------
// CreatedEntities
// ---------------------------------------------------------------------------

/// How a reference index resolved against the restore-time table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// The index was [`NULL_INDEX`]; the reference is intentionally empty.
    Null,
    Entity(EntityId),
    /// The index has no created entity (skipped group, out of range, or not
    /// yet spawned).
    Missing,
}

impl Resolved {
    /// Collapse into the value a reference field should hold.
    pub fn entity(self) -> Option<EntityId> {
        match self {
            Resolved::Entity(e) => Some(e),
            Resolved::Null | Resolved::Missing => None,
        }
    }
}

/// The restore-time table from schematic index to freshly created entity.
#[derive(Debug, Clone)]
pub struct CreatedEntities {
    /// Slot 0 is always `None`.
    slots: Vec<Option<EntityId>>,
}

impl CreatedEntities {
    /// A table for a schematic with `count` entities.
    pub fn with_len(count: usize) -> Self {
        Self {
            slots: vec![None; count + 1],
        }
    }

    pub fn set(&mut self, index: usize, entity: Option<EntityId>) {
        if index != NULL_INDEX {
            if let Some(slot) = self.slots.get_mut(index) {
                *slot = entity;
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<EntityId> {
        self.slots.get(index).copied().flatten()
    }

    pub fn resolve(&self, index: usize) -> Resolved {
        if index == NULL_INDEX {
            return Resolved::Null;
        }
        match self.get(index) {
            Some(entity) => Resolved::Entity(entity),
            None => Resolved::Missing,
        }
    }

    /// Number of indices that currently hold an entity.
    pub fn created_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// `(index, entity)` pairs for every created entity, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, EntityId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|e| (index, e)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
