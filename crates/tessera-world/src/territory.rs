//! Territories: rectangular tile regions, each optionally held by an anchor
//! entity.

use serde::{Deserialize, Serialize};

use crate::bounds::GridCoord;
use crate::entity::EntityId;

/// Sentinel returned by territory lookups for "outside every territory".
pub const NO_TERRITORY: i32 = -1;

/// One territory: an inclusive tile rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub index: i32,
    pub min: GridCoord,
    pub max: GridCoord,
    /// The anchor entity currently holding this territory.
    #[serde(default)]
    pub anchor: Option<EntityId>,
}

impl Territory {
    pub fn new(index: i32, min: GridCoord, max: GridCoord) -> Self {
        Self {
            index,
            min,
            max,
            anchor: None,
        }
    }

    pub fn contains_tile(&self, tile: GridCoord) -> bool {
        tile.x >= self.min.x && tile.x <= self.max.x && tile.y >= self.min.y && tile.y <= self.max.y
    }
}

/// All territories known to the world.
///
/// Territories are assumed not to overlap; when they do, the one added first
/// wins a lookup.
#[derive(Debug, Clone, Default)]
pub struct TerritoryMap {
    territories: Vec<Territory>,
}

impl TerritoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the territory with `territory.index`.
    pub fn insert(&mut self, territory: Territory) {
        match self
            .territories
            .iter_mut()
            .find(|t| t.index == territory.index)
        {
            Some(existing) => *existing = territory,
            None => self.territories.push(territory),
        }
    }

    pub fn get(&self, index: i32) -> Option<&Territory> {
        self.territories.iter().find(|t| t.index == index)
    }

    /// Index of the territory containing `tile`, or [`NO_TERRITORY`].
    pub fn index_of_tile(&self, tile: GridCoord) -> i32 {
        self.territories
            .iter()
            .find(|t| t.contains_tile(tile))
            .map_or(NO_TERRITORY, |t| t.index)
    }

    /// The anchor holding territory `index`, if any.
    pub fn anchor_for(&self, index: i32) -> Option<EntityId> {
        self.get(index).and_then(|t| t.anchor)
    }

    /// Set (or clear) the anchor of territory `index`. Returns `false` when no
    /// such territory exists.
    pub fn set_anchor(&mut self, index: i32, anchor: Option<EntityId>) -> bool {
        match self.territories.iter_mut().find(|t| t.index == index) {
            Some(t) => {
                t.anchor = anchor;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Territory> {
        self.territories.iter()
    }

    pub(crate) fn forget_anchor(&mut self, anchor: EntityId) {
        for t in &mut self.territories {
            if t.anchor == Some(anchor) {
                t.anchor = None;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
