//! The persisted schematic document.
//!
//! A schematic is a pretty-printed JSON document. It is anchored either at a
//! world position (free-form area capture) or at a territory index, never
//! both. Entities are listed in capture-index order: record `i` has mapper
//! index `i + 1`, which is what patch references point at.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_world::bounds::{Aabb, GridCoord, Quat, Vec3};
use tessera_world::catalog::ArchetypeId;
use tessera_world::component::{ComponentKind, TileBounds};

use crate::error::SchematicError;

/// The only format version this engine reads and writes.
pub const FORMAT_VERSION: &str = "1.0.1";

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Archetype reference stored with each record. The name is kept so a
/// restore can fall back to a same-named archetype when the id has changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeRef {
    pub id: ArchetypeId,
    #[serde(default)]
    pub name: String,
}

/// One captured entity, as a diff against its archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub archetype: ArchetypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Quat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_position: Option<GridCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_bounds: Option<TileBounds>,
    /// Kind-tagged patches, opaque at this layer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<ComponentKind, Value>,
    /// Kinds the archetype has that the captured entity had lost.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub removals: BTreeSet<ComponentKind>,
    /// Keep the entity out of the destination anchor's team.
    #[serde(default, skip_serializing_if = "is_false")]
    pub keep_team: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl EntityRecord {
    pub fn new(archetype: ArchetypeId, name: impl Into<String>) -> Self {
        Self {
            archetype: ArchetypeRef {
                id: archetype,
                name: name.into(),
            },
            position: None,
            rotation: None,
            tile_position: None,
            tile_bounds: None,
            components: BTreeMap::new(),
            removals: BTreeSet::new(),
            keep_team: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Schematic
// ---------------------------------------------------------------------------

/// Where a schematic is anchored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchematicAnchor {
    Location(Vec3),
    Territory(i32),
}

/// A captured region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schematic {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub territory_index: Option<i32>,
    /// Hull of every captured footprint. Only set for location anchors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<Aabb>,
    /// Disjoint boxes covering the captured footprints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<Aabb>,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
}

impl Schematic {
    /// An empty schematic with the given anchor.
    pub fn new(anchor: SchematicAnchor) -> Self {
        let (location, territory_index) = match anchor {
            SchematicAnchor::Location(at) => (Some(at), None),
            SchematicAnchor::Territory(index) => (None, Some(index)),
        };
        Self {
            version: FORMAT_VERSION.to_owned(),
            location,
            territory_index,
            bounding_box: None,
            boxes: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// The anchor. Fails unless exactly one of location and territory is set.
    pub fn anchor(&self) -> Result<SchematicAnchor, SchematicError> {
        match (self.location, self.territory_index) {
            (Some(at), None) => Ok(SchematicAnchor::Location(at)),
            (None, Some(index)) => Ok(SchematicAnchor::Territory(index)),
            (Some(_), Some(_)) => Err(SchematicError::Format {
                details: "both location and territory_index are set".into(),
            }),
            (None, None) => Err(SchematicError::Format {
                details: "neither location nor territory_index is set".into(),
            }),
        }
    }

    /// Decode a persisted document.
    ///
    /// The version is checked on the raw JSON before the typed decode, so a
    /// document from another format version reports a version mismatch rather
    /// than a structural error.
    pub fn from_json_str(json: &str) -> Result<Self, SchematicError> {
        let raw: Value = serde_json::from_str(json).map_err(SchematicError::format)?;
        let version = raw
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| SchematicError::Format {
                details: "missing version".into(),
            })?;
        if version != FORMAT_VERSION {
            return Err(SchematicError::VersionUnsupported {
                found: version.to_owned(),
                expected: FORMAT_VERSION.to_owned(),
            });
        }
        let schematic: Schematic = serde_json::from_value(raw).map_err(SchematicError::format)?;
        schematic.anchor()?;
        Ok(schematic)
    }

    pub fn to_json_pretty(&self) -> Result<String, SchematicError> {
        serde_json::to_string_pretty(self).map_err(SchematicError::format)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
