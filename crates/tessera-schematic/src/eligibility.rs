//! Applying [`EligibilityRules`] to live entities.

use tessera_world::component::Translation;
use tessera_world::entity::EntityId;
use tessera_world::world::World;

use crate::config::EligibilityRules;

impl EligibilityRules {
    /// Whether capture may record `entity`.
    ///
    /// The entity must be a positioned instance of some archetype, carry none
    /// of the excluded kinds, and pass the archetype name and deny filters.
    pub fn may_capture(&self, world: &World, entity: EntityId) -> bool {
        if world.is_prefab(entity) || !world.has_component::<Translation>(entity) {
            return false;
        }
        let Some(archetype) = world.archetype_of(entity) else {
            return false;
        };
        if self.denied_archetypes.contains(&archetype) {
            return false;
        }
        if self
            .excluded_kinds
            .iter()
            .any(|&kind| world.has_kind(entity, kind))
        {
            return false;
        }
        if self.allowed_prefixes.is_empty() {
            return true;
        }
        world
            .catalog()
            .display_name(archetype)
            .is_some_and(|name| self.allowed_prefixes.iter().any(|p| name.starts_with(p.as_str())))
    }

    /// Whether clearing may destroy `entity`. Same filter as capture.
    pub fn may_clear(&self, world: &World, entity: EntityId) -> bool {
        self.may_capture(world, entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
