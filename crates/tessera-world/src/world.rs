//! The in-memory live object store.
//!
//! [`World`] owns every entity and its components, the archetype catalog, the
//! territory map and the host-wide respawn toggle. Components are stored per
//! entity in a map keyed by [`ComponentKind`], so an entity may carry any
//! subset of kinds and gain or lose kinds without migration.
//!
//! Entity iteration is always in ascending [`EntityId`] order, which keeps
//! capture output deterministic.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::catalog::{ArchetypeCatalog, ArchetypeId};
use crate::component::{Attachment, Component, ComponentData, ComponentKind};
use crate::entity::{EntityAllocator, EntityId};
use crate::territory::TerritoryMap;
use crate::WorldError;

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// A set of components to pass to [`World::spawn_bundle`] or
/// [`World::register_archetype`]. Adding a kind twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct ComponentBundle {
    components: BTreeMap<ComponentKind, Component>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component to the bundle.
    pub fn add<T: ComponentData>(&mut self, value: T) -> &mut Self {
        self.components.insert(T::KIND, value.into_component());
        self
    }

    /// Builder-style [`add`](Self::add).
    pub fn with<T: ComponentData>(mut self, value: T) -> Self {
        self.add(value);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl FromIterator<Component> for ComponentBundle {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Self {
            components: iter.into_iter().map(|c| (c.kind(), c)).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredEntity {
    archetype: Option<ArchetypeId>,
    prefab: bool,
    components: BTreeMap<ComponentKind, Component>,
}

/// The live object store.
#[derive(Default)]
pub struct World {
    allocator: EntityAllocator,
    entities: BTreeMap<EntityId, StoredEntity>,
    catalog: ArchetypeCatalog,
    territories: TerritoryMap,
    respawns_suppressed: bool,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entity_count())
            .field("archetype_count", &self.catalog.len())
            .field("respawns_suppressed", &self.respawns_suppressed)
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &ArchetypeCatalog {
        &self.catalog
    }

    pub fn territories(&self) -> &TerritoryMap {
        &self.territories
    }

    pub fn territories_mut(&mut self) -> &mut TerritoryMap {
        &mut self.territories
    }

    // -- archetypes ---------------------------------------------------------

    /// Register an archetype whose default instance carries `bundle`.
    ///
    /// Creates a prefab entity to hold the defaults and returns it.
    pub fn register_archetype(
        &mut self,
        id: ArchetypeId,
        name: &str,
        bundle: ComponentBundle,
    ) -> Result<EntityId, WorldError> {
        if self.catalog.contains(id) {
            return Err(WorldError::DuplicateArchetype { id });
        }
        let prefab = self.allocator.allocate();
        self.entities.insert(
            prefab,
            StoredEntity {
                archetype: Some(id),
                prefab: true,
                components: bundle.components,
            },
        );
        self.catalog.insert(id, name, prefab);
        debug!(archetype = %id, name, prefab = %prefab, "archetype registered");
        Ok(prefab)
    }

    /// Remove an archetype and its prefab. Live instances are left alone.
    pub fn unregister_archetype(&mut self, id: ArchetypeId) -> Result<(), WorldError> {
        let prefab = self
            .catalog
            .remove(id)
            .ok_or(WorldError::UnknownArchetype { id })?;
        self.entities.remove(&prefab);
        self.allocator.release(prefab);
        Ok(())
    }

    /// Spawn a fresh instance of `archetype`, copying the prefab's
    /// components.
    pub fn instantiate(&mut self, archetype: ArchetypeId) -> Result<EntityId, WorldError> {
        let prefab = self
            .catalog
            .lookup(archetype)
            .ok_or(WorldError::UnknownArchetype { id: archetype })?;
        let components = self
            .entities
            .get(&prefab)
            .map(|stored| stored.components.clone())
            .unwrap_or_default();
        let entity = self.allocator.allocate();
        self.entities.insert(
            entity,
            StoredEntity {
                archetype: Some(archetype),
                prefab: false,
                components,
            },
        );
        Ok(entity)
    }

    /// The archetype `entity` was instantiated from.
    pub fn archetype_of(&self, entity: EntityId) -> Option<ArchetypeId> {
        self.entities.get(&entity).and_then(|stored| stored.archetype)
    }

    /// Whether `entity` is an archetype's prefab.
    pub fn is_prefab(&self, entity: EntityId) -> bool {
        self.entities.get(&entity).is_some_and(|stored| stored.prefab)
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn an entity with no archetype.
    pub fn spawn_bundle(&mut self, bundle: ComponentBundle) -> EntityId {
        let entity = self.allocator.allocate();
        self.entities.insert(
            entity,
            StoredEntity {
                archetype: None,
                prefab: false,
                components: bundle.components,
            },
        );
        entity
    }

    /// Spawn an entity with a single component.
    pub fn spawn_with<T: ComponentData>(&mut self, component: T) -> EntityId {
        self.spawn_bundle(ComponentBundle::new().with(component))
    }

    /// Destroy an entity and recycle its id.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), WorldError> {
        if !self.allocator.is_alive(entity) || self.is_prefab(entity) {
            return Err(WorldError::StaleEntity { entity });
        }
        self.entities.remove(&entity);
        self.allocator.release(entity);
        self.territories.forget_anchor(entity);
        Ok(())
    }

    /// Destroy `entity` and, transitively, everything attached to it.
    ///
    /// Returns the number of entities destroyed. Each entity is visited at
    /// most once, so attachment cycles terminate.
    pub fn despawn_with_attachments(&mut self, entity: EntityId) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![entity];
        let mut destroyed = 0;
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            if let Some(attachment) = self.get_component::<Attachment>(next) {
                stack.extend(attachment.attached.iter().copied());
            }
            if self.despawn(next).is_ok() {
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Check whether an entity is alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live non-prefab entities.
    pub fn entity_count(&self) -> usize {
        self.entities.values().filter(|stored| !stored.prefab).count()
    }

    /// All live non-prefab entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(|(_, stored)| !stored.prefab)
            .map(|(id, _)| *id)
    }

    /// First live non-prefab entity carrying `T`.
    pub fn first_with<T: ComponentData>(&self) -> Option<EntityId> {
        self.entities()
            .find(|&entity| self.has_component::<T>(entity))
    }

    // -- respawn toggle -----------------------------------------------------

    pub fn respawns_suppressed(&self) -> bool {
        self.respawns_suppressed
    }

    /// Pause or resume the host's respawning of destroyed entities.
    pub fn set_respawns_suppressed(&mut self, suppressed: bool) {
        self.respawns_suppressed = suppressed;
    }

    // -- typed component access ---------------------------------------------

    /// Get an immutable reference to a component on an entity.
    pub fn get_component<T: ComponentData>(&self, entity: EntityId) -> Option<&T> {
        self.component(entity, T::KIND)
            .and_then(T::from_component)
    }

    /// Get a mutable reference to a component on an entity.
    pub fn get_component_mut<T: ComponentData>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.entities
            .get_mut(&entity)?
            .components
            .get_mut(&T::KIND)
            .and_then(T::from_component_mut)
    }

    /// Check whether an entity has a given component type.
    pub fn has_component<T: ComponentData>(&self, entity: EntityId) -> bool {
        self.has_kind(entity, T::KIND)
    }

    /// Insert a component, overwriting any existing value of the same kind.
    pub fn insert_component<T: ComponentData>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), WorldError> {
        self.set_component(entity, value.into_component())
    }

    /// Remove a component. Removing an absent kind is a no-op.
    pub fn remove_component<T: ComponentData>(
        &mut self,
        entity: EntityId,
    ) -> Result<Option<T>, WorldError> {
        Ok(self
            .remove_kind(entity, T::KIND)?
            .and_then(|c| T::from_component(&c).cloned()))
    }

    // -- dynamic component access -------------------------------------------

    /// The component of `kind` on `entity`, if any.
    pub fn component(&self, entity: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.entities.get(&entity)?.components.get(&kind)
    }

    /// Every component on `entity`, ordered by kind.
    pub fn components(&self, entity: EntityId) -> impl Iterator<Item = &Component> + '_ {
        self.entities
            .get(&entity)
            .into_iter()
            .flat_map(|stored| stored.components.values())
    }

    /// The kinds present on `entity`, ordered.
    pub fn kinds(&self, entity: EntityId) -> Vec<ComponentKind> {
        self.entities
            .get(&entity)
            .map(|stored| stored.components.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_kind(&self, entity: EntityId, kind: ComponentKind) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|stored| stored.components.contains_key(&kind))
    }

    /// Insert or overwrite a tagged component.
    pub fn set_component(&mut self, entity: EntityId, component: Component) -> Result<(), WorldError> {
        let stored = self.stored_mut(entity)?;
        stored.components.insert(component.kind(), component);
        Ok(())
    }

    /// Remove the component of `kind`, returning it.
    pub fn remove_kind(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
    ) -> Result<Option<Component>, WorldError> {
        let stored = self.stored_mut(entity)?;
        Ok(stored.components.remove(&kind))
    }

    fn stored_mut(&mut self, entity: EntityId) -> Result<&mut StoredEntity, WorldError> {
        if !self.allocator.is_alive(entity) {
            return Err(WorldError::StaleEntity { entity });
        }
        self.entities
            .get_mut(&entity)
            .ok_or(WorldError::StaleEntity { entity })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Door, Health, Immortal};

    fn world_with_door() -> (World, ArchetypeId) {
        let mut world = World::new();
        let id = ArchetypeId(100);
        world
            .register_archetype(
                id,
                "Wooden Door",
                ComponentBundle::new()
                    .with(Door::default())
                    .with(Health {
                        value: 50.0,
                        max: 50.0,
                    }),
            )
            .unwrap();
        (world, id)
    }

    #[test]
    fn instantiate_copies_prefab_components() {
        let (mut world, id) = world_with_door();
        let door = world.instantiate(id).unwrap();
        assert_eq!(world.archetype_of(door), Some(id));
        assert_eq!(world.get_component::<Health>(door).unwrap().value, 50.0);

        world.get_component_mut::<Health>(door).unwrap().value = 10.0;
        let prefab = world.catalog().lookup(id).unwrap();
        assert_eq!(world.get_component::<Health>(prefab).unwrap().value, 50.0);
    }

    #[test]
    fn prefabs_are_hidden_from_iteration() {
        let (mut world, id) = world_with_door();
        assert_eq!(world.entity_count(), 0);
        let door = world.instantiate(id).unwrap();
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![door]);
        assert_eq!(world.first_with::<Door>(), Some(door));
    }

    #[test]
    fn unknown_and_duplicate_archetypes_error() {
        let (mut world, id) = world_with_door();
        assert!(matches!(
            world.instantiate(ArchetypeId(7)),
            Err(WorldError::UnknownArchetype { .. })
        ));
        assert!(matches!(
            world.register_archetype(id, "Again", ComponentBundle::new()),
            Err(WorldError::DuplicateArchetype { .. })
        ));
    }

    #[test]
    fn despawn_makes_handle_stale() {
        let mut world = World::new();
        let e = world.spawn_with(Immortal(true));
        world.despawn(e).unwrap();
        assert!(!world.is_alive(e));
        assert!(matches!(
            world.insert_component(e, Immortal(false)),
            Err(WorldError::StaleEntity { .. })
        ));
        assert!(world.despawn(e).is_err());
    }

    #[test]
    fn prefab_cannot_be_despawned_directly() {
        let (mut world, id) = world_with_door();
        let prefab = world.catalog().lookup(id).unwrap();
        assert!(world.despawn(prefab).is_err());
        world.unregister_archetype(id).unwrap();
        assert!(!world.is_alive(prefab));
    }

    #[test]
    fn insert_and_remove_components() {
        let mut world = World::new();
        let e = world.spawn_bundle(ComponentBundle::new());
        assert!(!world.has_component::<Door>(e));
        world.insert_component(e, Door { open: true, locked: false }).unwrap();
        assert!(world.has_kind(e, ComponentKind::Door));
        let removed = world.remove_component::<Door>(e).unwrap();
        assert_eq!(removed, Some(Door { open: true, locked: false }));
        assert_eq!(world.remove_component::<Door>(e).unwrap(), None);
    }

    #[test]
    fn attachment_cascade_follows_cycles_once() {
        let mut world = World::new();
        let a = world.spawn_bundle(ComponentBundle::new());
        let b = world.spawn_bundle(ComponentBundle::new());
        let c = world.spawn_bundle(ComponentBundle::new());
        let untouched = world.spawn_bundle(ComponentBundle::new());
        world
            .insert_component(a, Attachment { attached: vec![b] })
            .unwrap();
        world
            .insert_component(b, Attachment { attached: vec![c, a] })
            .unwrap();

        assert_eq!(world.despawn_with_attachments(a), 3);
        assert!(!world.is_alive(a) && !world.is_alive(b) && !world.is_alive(c));
        assert!(world.is_alive(untouched));
    }

    #[test]
    fn respawn_toggle_round_trips() {
        let mut world = World::new();
        assert!(!world.respawns_suppressed());
        world.set_respawns_suppressed(true);
        assert!(world.respawns_suppressed());
    }
}
