//! Tessera World -- the live entity store the schematic engine captures from
//! and restores into.
//!
//! Entities are generational handles carrying any subset of a fixed set of
//! component kinds. Archetypes are registered as prefab entities holding the
//! default components; [`World::instantiate`](world::World::instantiate)
//! copies them onto a fresh entity. Placement is tile based: positions convert
//! to a discretized grid, and footprints are grid-space [`Aabb`](bounds::Aabb)s.
//!
//! # Quick Start
//!
//! ```
//! use tessera_world::prelude::*;
//!
//! let mut world = World::new();
//! let wall = ArchetypeId(1);
//! world
//!     .register_archetype(wall, "Stone Wall", ComponentBundle::new().with(Health { value: 100.0, max: 100.0 }))
//!     .unwrap();
//!
//! let e = world.instantiate(wall).unwrap();
//! world.insert_component(e, Translation(Vec3::new(2.0, 0.0, 3.0))).unwrap();
//!
//! assert_eq!(world.entities_in_radius(Vec3::ZERO, 5.0), vec![e]);
//! ```

#![deny(unsafe_code)]

pub mod bounds;
pub mod catalog;
pub mod component;
pub mod entity;
pub mod spatial;
pub mod territory;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// An archetype id was registered twice.
    #[error("archetype {id} is already registered")]
    DuplicateArchetype { id: catalog::ArchetypeId },

    /// An archetype id was referenced that is not in the catalog.
    #[error("archetype {id} is not registered")]
    UnknownArchetype { id: catalog::ArchetypeId },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bounds::{merge_all, Aabb, GridCoord, Quat, Vec3};
    pub use crate::catalog::{ArchetypeCatalog, ArchetypeId};
    pub use crate::component::*;
    pub use crate::entity::EntityId;
    pub use crate::spatial::{checked_tile_offset, grid_shift, tile_of, tile_offset, to_grid};
    pub use crate::territory::{Territory, TerritoryMap, NO_TERRITORY};
    pub use crate::world::{ComponentBundle, World};
    pub use crate::WorldError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn instance_diverges_from_prefab_independently() {
        let mut world = World::new();
        let chest = ArchetypeId(20);
        world
            .register_archetype(
                chest,
                "Chest",
                ComponentBundle::new().with(Container {
                    capacity: 8,
                    items: Vec::new(),
                }),
            )
            .unwrap();
        let a = world.instantiate(chest).unwrap();
        let b = world.instantiate(chest).unwrap();
        world
            .get_component_mut::<Container>(a)
            .unwrap()
            .items
            .push(ItemStack {
                item: ArchetypeId(900),
                amount: 3,
            });
        assert_eq!(world.get_component::<Container>(a).unwrap().items.len(), 1);
        assert!(world.get_component::<Container>(b).unwrap().items.is_empty());
    }

    #[test]
    fn territory_anchor_queries_compose() {
        let mut world = World::new();
        let tile = tile_of(Vec3::ZERO);
        world.territories_mut().insert(Territory::new(
            0,
            GridCoord::new(tile.x - 10, tile.y - 10),
            GridCoord::new(tile.x + 10, tile.y + 10),
        ));
        let heart = world.spawn_bundle(
            ComponentBundle::new()
                .with(Anchor)
                .with(Translation(Vec3::ZERO))
                .with(TilePosition(tile)),
        );
        world.territories_mut().set_anchor(0, Some(heart));

        let index = world.territory_index_of(heart);
        assert_eq!(index, 0);
        assert_eq!(world.anchor_for_territory(index), Some(heart));
        assert_eq!(world.first_with::<Anchor>(), Some(heart));
    }
}
