//! Grid conversion and spatial queries over the [`World`].
//!
//! World positions map to grid space by doubling the horizontal axes, flooring
//! and adding [`GRID_ORIGIN`]; the vertical axis is left in world units. Tile
//! positions, tile bounds and every footprint [`Aabb`] are in grid space.
//!
//! All queries skip prefabs and return entities in ascending id order.

use crate::bounds::{Aabb, GridCoord, Vec3};
use crate::component::{TileBounds, TileHeight, TilePosition, Translation};
use crate::entity::EntityId;
use crate::territory::NO_TERRITORY;
use crate::world::World;

/// Tiles per world unit on the horizontal axes.
pub const GRID_SCALE: f32 = 2.0;

/// Grid coordinate of world position zero.
pub const GRID_ORIGIN: f32 = 6400.0;

/// Footprints shorter than this are raised to it so flat tiles still have
/// volume.
pub const MIN_FOOTPRINT_HEIGHT: f32 = 0.1;

/// Convert a world position to grid space.
pub fn to_grid(pos: Vec3) -> Vec3 {
    Vec3::new(
        (pos.x * GRID_SCALE).floor() + GRID_ORIGIN,
        pos.y,
        (pos.z * GRID_SCALE).floor() + GRID_ORIGIN,
    )
}

/// The tile containing world position `pos`.
pub fn tile_of(pos: Vec3) -> GridCoord {
    let grid = to_grid(pos);
    GridCoord::new(grid.x as i32, grid.z as i32)
}

/// The tile shift produced by moving something by `translation` world units.
pub fn tile_offset(translation: Vec3) -> GridCoord {
    GridCoord::new(
        (translation.x * GRID_SCALE).floor() as i32,
        (translation.z * GRID_SCALE).floor() as i32,
    )
}

/// [`tile_offset`] for translations whose tile shift fits the grid, `None`
/// for anything else, non-finite values included.
pub fn checked_tile_offset(translation: Vec3) -> Option<GridCoord> {
    let axis = |value: f32| {
        let tiles = (value * GRID_SCALE).floor();
        (tiles >= i32::MIN as f32 && tiles < i32::MAX as f32).then_some(tiles as i32)
    };
    Some(GridCoord::new(axis(translation.x)?, axis(translation.z)?))
}

/// The grid-space shift matching [`tile_offset`], with the vertical component
/// kept in world units.
pub fn grid_shift(translation: Vec3) -> Vec3 {
    let tiles = tile_offset(translation);
    Vec3::new(tiles.x as f32, translation.y, tiles.y as f32)
}

impl World {
    /// The grid-space box an entity occupies.
    ///
    /// Built from [`TileBounds`] and [`TileHeight`] relative to the entity's
    /// height. Entities without tile bounds, or with all-zero bounds, have no
    /// footprint.
    pub fn footprint(&self, entity: EntityId) -> Option<Aabb> {
        let bounds = self.get_component::<TileBounds>(entity)?;
        if bounds.is_degenerate() {
            return None;
        }
        let base = self
            .get_component::<Translation>(entity)
            .map_or(0.0, |t| t.0.y);
        let height = self
            .get_component::<TileHeight>(entity)
            .copied()
            .unwrap_or_default();
        let top = height.max.max(MIN_FOOTPRINT_HEIGHT);
        Some(Aabb::new(
            Vec3::new(bounds.min.x as f32, base + height.min.min(top), bounds.min.y as f32),
            Vec3::new(bounds.max.x as f32, base + top, bounds.max.y as f32),
        ))
    }

    /// Whether `entity` lies in the grid-space box `area`: its position is
    /// inside, or its footprint overlaps it.
    pub fn is_in_box(&self, entity: EntityId, area: &Aabb) -> bool {
        let Some(translation) = self.get_component::<Translation>(entity) else {
            return false;
        };
        area.contains(to_grid(translation.0))
            || self
                .footprint(entity)
                .is_some_and(|footprint| area.overlaps(&footprint))
    }

    /// Positioned entities within `radius` world units (horizontally) of
    /// `center`.
    pub fn entities_in_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        self.positioned()
            .filter(|(_, pos)| pos.horizontal_distance(center) <= radius)
            .map(|(entity, _)| entity)
            .collect()
    }

    /// Positioned entities inside the horizontal rectangle centred on
    /// `center` with half extents `half_x` by `half_z` world units.
    pub fn entities_in_rect(&self, center: Vec3, half_x: f32, half_z: f32) -> Vec<EntityId> {
        self.positioned()
            .filter(|(_, pos)| {
                (pos.x - center.x).abs() <= half_x && (pos.z - center.z).abs() <= half_z
            })
            .map(|(entity, _)| entity)
            .collect()
    }

    /// Entities lying in the grid-space box `area` (see [`is_in_box`](Self::is_in_box)).
    pub fn entities_overlapping(&self, area: &Aabb) -> Vec<EntityId> {
        self.entities()
            .filter(|&entity| self.is_in_box(entity, area))
            .collect()
    }

    /// Entities whose territory is `index`.
    pub fn entities_in_territory(&self, index: i32) -> Vec<EntityId> {
        if index == NO_TERRITORY {
            return Vec::new();
        }
        self.entities()
            .filter(|&entity| self.territory_index_of(entity) == index)
            .collect()
    }

    /// The territory an entity belongs to, or [`NO_TERRITORY`].
    ///
    /// Checks the tile position first, then every tile of the tile bounds,
    /// then the tile under the world position.
    pub fn territory_index_of(&self, entity: EntityId) -> i32 {
        let territories = self.territories();
        if let Some(tile) = self.get_component::<TilePosition>(entity) {
            let index = territories.index_of_tile(tile.0);
            if index != NO_TERRITORY {
                return index;
            }
        }
        if let Some(bounds) = self.get_component::<TileBounds>(entity) {
            if !bounds.is_degenerate() {
                for x in bounds.min.x..=bounds.max.x {
                    for y in bounds.min.y..=bounds.max.y {
                        let index = territories.index_of_tile(GridCoord::new(x, y));
                        if index != NO_TERRITORY {
                            return index;
                        }
                    }
                }
            }
        }
        if let Some(translation) = self.get_component::<Translation>(entity) {
            return territories.index_of_tile(tile_of(translation.0));
        }
        NO_TERRITORY
    }

    /// The anchor holding territory `index`, if it is still alive.
    pub fn anchor_for_territory(&self, index: i32) -> Option<EntityId> {
        self.territories()
            .anchor_for(index)
            .filter(|&anchor| self.is_alive(anchor))
    }

    fn positioned(&self) -> impl Iterator<Item = (EntityId, Vec3)> + '_ {
        self.entities().filter_map(|entity| {
            self.get_component::<Translation>(entity)
                .map(|t| (entity, t.0))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
