//! Per-kind diff/apply table.
//!
//! Each component kind that can be persisted registers a [`ComponentSaver`]
//! with four operations: diff against the archetype, unconditional snapshot,
//! apply a patch onto an instance, and list the entity indices a patch refers
//! to. Patches travel as JSON values so the document layer stays agnostic of
//! the concrete kinds.
//!
//! Most savers are written as a [`PatchCodec`]: a typed patch struct of
//! `Option` fields plus three small functions. [`Codec`] adapts any
//! `PatchCodec` into a `ComponentSaver`.

mod links;
mod storage;
mod structure;

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use tessera_world::component::{Component, ComponentData, ComponentKind};
use tessera_world::entity::EntityId;

use crate::error::{RestoreWarning, SaverError};
use crate::mapper::{CreatedEntities, EntityMapper, Resolved, NULL_INDEX};

pub use links::{AttachmentPatch, CellPatch, FloorLinksPatch};
pub use storage::ContainerPatch;
pub use structure::{DismantlePatch, DoorPatch, HealthPatch, ImmortalPatch};

// ---------------------------------------------------------------------------
// ComponentSaver
// ---------------------------------------------------------------------------

/// The four-operation contract every persisted kind implements.
pub trait ComponentSaver: Send + Sync {
    /// The kind this saver handles.
    fn kind(&self) -> ComponentKind;

    /// Patch holding only the fields where `live` differs from `archetype`,
    /// or `None` when they are identical.
    fn diff(&self, archetype: &Component, live: &Component, mapper: &EntityMapper)
        -> Option<Value>;

    /// Patch holding every field of `live`.
    fn snapshot(&self, live: &Component, mapper: &EntityMapper) -> Value;

    /// Write the fields present in `patch` onto `target`.
    fn apply(
        &self,
        target: &mut Component,
        patch: &Value,
        ctx: &mut ApplyContext<'_>,
    ) -> Result<(), SaverError>;

    /// Entity indices `patch` refers to, [`NULL_INDEX`] excluded.
    fn references(&self, patch: &Value) -> Result<Vec<usize>, SaverError>;

    /// The value a target starts from when the instance lacks this kind.
    fn default_component(&self) -> Component;
}

// ---------------------------------------------------------------------------
// ApplyContext
// ---------------------------------------------------------------------------

/// Restore-side state handed to [`ComponentSaver::apply`].
///
/// Resolves reference indices through the created-entity table and records a
/// warning for every index that should exist but does not.
pub struct ApplyContext<'a> {
    created: &'a CreatedEntities,
    entity_index: usize,
    kind: ComponentKind,
    warnings: Vec<RestoreWarning>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(created: &'a CreatedEntities, entity_index: usize) -> Self {
        Self {
            created,
            entity_index,
            kind: ComponentKind::Translation,
            warnings: Vec::new(),
        }
    }

    /// Resolve a reference index; missing entities resolve to `None`.
    pub fn resolve(&mut self, index: usize) -> Option<EntityId> {
        match self.created.resolve(index) {
            Resolved::Entity(entity) => Some(entity),
            Resolved::Null => None,
            Resolved::Missing => {
                warn!(
                    entity = self.entity_index,
                    kind = ?self.kind,
                    index,
                    "reference to an entity that was never created; leaving it empty"
                );
                self.warnings.push(RestoreWarning::UnresolvedDependency {
                    entity: self.entity_index,
                    kind: self.kind,
                    index,
                });
                None
            }
        }
    }

    pub fn warnings(&self) -> &[RestoreWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<RestoreWarning> {
        self.warnings
    }
}

// ---------------------------------------------------------------------------
// PatchCodec
// ---------------------------------------------------------------------------

/// Typed form of a saver: a patch struct plus the field-level logic.
///
/// `Patch::default()` must be the "no fields set" value; [`Codec`] uses it to
/// detect an empty diff.
pub trait PatchCodec: ComponentData + PartialEq {
    type Patch: Serialize + DeserializeOwned + Default + PartialEq;

    /// Fields of `live` that differ from `archetype`.
    fn diff(archetype: &Self, live: &Self, mapper: &EntityMapper) -> Self::Patch;

    /// Every field of `live`.
    fn snapshot(live: &Self, mapper: &EntityMapper) -> Self::Patch;

    /// Write the present fields of `patch` onto `self`.
    fn apply(&mut self, patch: &Self::Patch, ctx: &mut ApplyContext<'_>);

    fn references(_patch: &Self::Patch) -> Vec<usize> {
        Vec::new()
    }
}

/// Adapts a [`PatchCodec`] to the dynamic [`ComponentSaver`] table.
pub struct Codec<T>(PhantomData<fn() -> T>);

impl<T> Codec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Codec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PatchCodec> Codec<T> {
    fn decode(patch: &Value) -> Result<T::Patch, SaverError> {
        T::Patch::deserialize(patch).map_err(|e| SaverError {
            kind: T::KIND,
            details: e.to_string(),
        })
    }

    fn encode(patch: &T::Patch) -> Value {
        // Patch structs are plain data; encoding into a Value cannot fail.
        serde_json::to_value(patch).unwrap_or(Value::Null)
    }
}

impl<T: PatchCodec> ComponentSaver for Codec<T> {
    fn kind(&self) -> ComponentKind {
        T::KIND
    }

    fn diff(
        &self,
        archetype: &Component,
        live: &Component,
        mapper: &EntityMapper,
    ) -> Option<Value> {
        let (archetype, live) = (T::from_component(archetype)?, T::from_component(live)?);
        if archetype == live {
            return None;
        }
        let patch = T::diff(archetype, live, mapper);
        (patch != T::Patch::default()).then(|| Self::encode(&patch))
    }

    fn snapshot(&self, live: &Component, mapper: &EntityMapper) -> Value {
        match T::from_component(live) {
            Some(live) => Self::encode(&T::snapshot(live, mapper)),
            None => Value::Null,
        }
    }

    fn apply(
        &self,
        target: &mut Component,
        patch: &Value,
        ctx: &mut ApplyContext<'_>,
    ) -> Result<(), SaverError> {
        let patch = Self::decode(patch)?;
        let held = target.kind();
        let target = T::from_component_mut(target).ok_or_else(|| SaverError {
            kind: T::KIND,
            details: format!("target holds {held:?}"),
        })?;
        ctx.kind = T::KIND;
        PatchCodec::apply(target, &patch, ctx);
        Ok(())
    }

    fn references(&self, patch: &Value) -> Result<Vec<usize>, SaverError> {
        let patch = Self::decode(patch)?;
        Ok(T::references(&patch)
            .into_iter()
            .filter(|&index| index != NULL_INDEX)
            .collect())
    }

    fn default_component(&self) -> Component {
        T::default().into_component()
    }
}

/// `Some(live)` when it differs from `archetype`.
pub(crate) fn changed<V: PartialEq + Clone>(archetype: &V, live: &V) -> Option<V> {
    (archetype != live).then(|| live.clone())
}

// ---------------------------------------------------------------------------
// SaverRegistry
// ---------------------------------------------------------------------------

/// Dispatch table from [`ComponentKind`] to its saver.
pub struct SaverRegistry {
    savers: BTreeMap<ComponentKind, Box<dyn ComponentSaver>>,
}

impl std::fmt::Debug for SaverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaverRegistry")
            .field("kinds", &self.savers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SaverRegistry {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            savers: BTreeMap::new(),
        }
    }

    /// The table with every built-in saver registered.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Codec::<tessera_world::component::Health>::new());
        registry.register(Codec::<tessera_world::component::Immortal>::new());
        registry.register(Codec::<tessera_world::component::Dismantle>::new());
        registry.register(Codec::<tessera_world::component::Door>::new());
        registry.register(Codec::<tessera_world::component::Container>::new());
        registry.register(Codec::<tessera_world::component::Cell>::new());
        registry.register(Codec::<tessera_world::component::FloorLinks>::new());
        registry.register(Codec::<tessera_world::component::Attachment>::new());
        registry
    }

    /// Register (or replace) the saver for its kind.
    pub fn register(&mut self, saver: impl ComponentSaver + 'static) {
        self.savers.insert(saver.kind(), Box::new(saver));
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&dyn ComponentSaver> {
        self.savers.get(&kind).map(|saver| saver.as_ref())
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.savers.contains_key(&kind)
    }

    /// Registered kinds in order.
    pub fn kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.savers.keys().copied()
    }

    /// Every entity index referenced by a record's patches, deduplicated and
    /// sorted. Kinds without a saver, and malformed patches, contribute
    /// nothing.
    pub fn references(&self, patches: &BTreeMap<ComponentKind, Value>) -> Vec<usize> {
        let mut refs: Vec<usize> = patches
            .iter()
            .filter_map(|(kind, patch)| {
                let saver = self.get(*kind)?;
                saver.references(patch).ok()
            })
            .flatten()
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs
    }
}

impl Default for SaverRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_world::component::{Cell, Door, Health};

    #[test]
    fn identical_components_diff_to_none() {
        let registry = SaverRegistry::standard();
        let saver = registry.get(ComponentKind::Health).unwrap();
        let a = Health {
            value: 10.0,
            max: 10.0,
        }
        .into_component();
        assert_eq!(saver.diff(&a, &a, &EntityMapper::new()), None);
    }

    #[test]
    fn diff_holds_only_changed_fields() {
        let registry = SaverRegistry::standard();
        let saver = registry.get(ComponentKind::Door).unwrap();
        let archetype = Door::default().into_component();
        let live = Door {
            open: true,
            locked: false,
        }
        .into_component();
        let patch = saver.diff(&archetype, &live, &EntityMapper::new()).unwrap();
        assert_eq!(patch, json!({ "open": true }));
    }

    #[test]
    fn apply_with_missing_reference_records_warning() {
        let registry = SaverRegistry::standard();
        let saver = registry.get(ComponentKind::Cell).unwrap();
        let created = CreatedEntities::with_len(4);
        let mut ctx = ApplyContext::new(&created, 1);
        let mut target = Cell::default().into_component();
        saver
            .apply(&mut target, &json!({ "occupant": 3 }), &mut ctx)
            .unwrap();
        assert_eq!(Cell::from_component(&target).unwrap().occupant, None);
        assert_eq!(
            ctx.into_warnings(),
            vec![RestoreWarning::UnresolvedDependency {
                entity: 1,
                kind: ComponentKind::Cell,
                index: 3
            }]
        );
    }

    #[test]
    fn malformed_patch_is_an_error() {
        let registry = SaverRegistry::standard();
        let saver = registry.get(ComponentKind::Door).unwrap();
        let created = CreatedEntities::with_len(0);
        let mut ctx = ApplyContext::new(&created, 1);
        let mut target = Door::default().into_component();
        let err = saver
            .apply(&mut target, &json!({ "open": "wide" }), &mut ctx)
            .unwrap_err();
        assert_eq!(err.kind, ComponentKind::Door);
    }

    #[test]
    fn registry_references_are_sorted_and_deduplicated() {
        let registry = SaverRegistry::standard();
        let mut patches = BTreeMap::new();
        patches.insert(ComponentKind::Cell, json!({ "occupant": 5 }));
        patches.insert(
            ComponentKind::FloorLinks,
            json!({ "north": 2, "south": 5, "east": 0 }),
        );
        patches.insert(ComponentKind::Translation, json!({ "ignored": 9 }));
        assert_eq!(registry.references(&patches), vec![2, 5]);
    }
}
