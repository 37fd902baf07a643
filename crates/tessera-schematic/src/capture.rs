//! Capture pipeline: turns a region of the live world into a [`Schematic`].
//!
//! 1. The region selector enumerates candidate entities.
//! 2. [`EligibilityRules`] filter them and each survivor gets a mapper index.
//! 3. Footprints are collected into per-entity boxes and a running hull.
//! 4. For free-form areas the boxes are merged into a disjoint covering set
//!    and the hull is re-scanned for eligible entities the selector missed
//!    whose footprint lies in one of the merged boxes.
//! 5. Every indexed entity is diffed against its archetype, in index order.
//!
//! Diffing waits until every index is assigned, so references between
//! captured entities always resolve, whichever pass found them.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tessera_world::bounds::{merge_all, Aabb, Vec3};
use tessera_world::component::{
    ComponentKind, NeutralTeam, Rotation, TeamLink, TileBounds, TilePosition, Translation,
};
use tessera_world::entity::EntityId;
use tessera_world::spatial::to_grid;
use tessera_world::world::World;

use crate::config::EligibilityRules;
use crate::error::SchematicError;
use crate::mapper::EntityMapper;
use crate::saver::SaverRegistry;
use crate::schematic::{EntityRecord, Schematic, SchematicAnchor};

/// Kinds stored in the record's own transform fields; never recorded as
/// removals.
const TRANSFORM_KINDS: [ComponentKind; 4] = [
    ComponentKind::Translation,
    ComponentKind::Rotation,
    ComponentKind::TilePosition,
    ComponentKind::TileBounds,
];

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Which part of the world to capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSelector {
    /// Everything within `radius` world units of `center`.
    Radius { center: Vec3, radius: f32 },
    /// Everything in the horizontal rectangle around `center`.
    Box { center: Vec3, half_x: f32, half_z: f32 },
    /// Everything belonging to a territory.
    Territory(i32),
}

/// A capture request: a region plus the rules deciding what is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub region: RegionSelector,
    pub rules: EligibilityRules,
}

impl CaptureRequest {
    pub fn new(region: RegionSelector) -> Self {
        Self {
            region,
            rules: EligibilityRules::default(),
        }
    }

    pub fn radius(center: Vec3, radius: f32) -> Self {
        Self::new(RegionSelector::Radius { center, radius })
    }

    pub fn rect(center: Vec3, half_x: f32, half_z: f32) -> Self {
        Self::new(RegionSelector::Box {
            center,
            half_x,
            half_z,
        })
    }

    pub fn territory(index: i32) -> Self {
        Self::new(RegionSelector::Territory(index))
    }

    pub fn with_rules(mut self, rules: EligibilityRules) -> Self {
        self.rules = rules;
        self
    }

    fn validate(&self, world: &World) -> Result<(), SchematicError> {
        let positive = |value: f32| value.is_finite() && value > 0.0;
        let invalid = |reason: String| Err(SchematicError::InvalidRegion { reason });
        match self.region {
            RegionSelector::Radius { center, radius } => {
                if !center.is_finite() || !positive(radius) {
                    return invalid(format!("radius {radius} around {center:?}"));
                }
            }
            RegionSelector::Box {
                center,
                half_x,
                half_z,
            } => {
                if !center.is_finite() || !positive(half_x) || !positive(half_z) {
                    return invalid(format!("box {half_x}x{half_z} around {center:?}"));
                }
            }
            RegionSelector::Territory(index) => {
                if world.territories().get(index).is_none() {
                    return invalid(format!("unknown territory {index}"));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CaptureSummary
// ---------------------------------------------------------------------------

/// What a capture found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSummary {
    /// Entities recorded in the schematic.
    pub entities: usize,
    /// Entities picked up by the footprint re-scan.
    pub second_pass: usize,
    /// Footprint boxes before merging.
    pub boxes_collected: usize,
    /// Disjoint boxes after merging.
    pub boxes_merged: usize,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Capture `request.region` of `world`.
///
/// Nothing in the world is modified. Fails with `InvalidRegion` before any
/// work for an unusable selector, and with `MissingArchetype` if an
/// entity's archetype has been unregistered.
pub fn capture(
    world: &World,
    request: &CaptureRequest,
    registry: &SaverRegistry,
) -> Result<(Schematic, CaptureSummary), SchematicError> {
    let started = Instant::now();
    request.validate(world)?;
    let rules = &request.rules;

    let (mut schematic, candidates) = match request.region {
        RegionSelector::Radius { center, radius } => (
            Schematic::new(SchematicAnchor::Location(center)),
            world.entities_in_radius(center, radius),
        ),
        RegionSelector::Box {
            center,
            half_x,
            half_z,
        } => (
            Schematic::new(SchematicAnchor::Location(center)),
            world.entities_in_rect(center, half_x, half_z),
        ),
        RegionSelector::Territory(index) => (
            Schematic::new(SchematicAnchor::Territory(index)),
            world.entities_in_territory(index),
        ),
    };
    debug!(
        candidates = candidates.len(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
        "gathered capture candidates"
    );

    let mut mapper = EntityMapper::new();
    for entity in candidates {
        if rules.may_capture(world, entity) {
            mapper.assign(entity);
        }
    }

    let mut summary = CaptureSummary::default();
    if let Some(location) = schematic.location {
        let mut hull = Aabb::point(to_grid(location));
        let mut boxes = Vec::new();
        for (_, entity) in mapper.iter() {
            if let Some(footprint) = world.footprint(entity) {
                hull.include(&footprint);
                boxes.push(footprint);
            }
        }
        summary.boxes_collected = boxes.len();
        merge_all(&mut boxes);
        summary.boxes_merged = boxes.len();
        debug!(
            before = summary.boxes_collected,
            after = summary.boxes_merged,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "merged footprint boxes"
        );

        let missed: Vec<EntityId> = world
            .entities_overlapping(&hull)
            .into_iter()
            .filter(|&entity| !mapper.contains(entity) && rules.may_capture(world, entity))
            .filter(|&entity| boxes.iter().any(|area| world.is_in_box(entity, area)))
            .collect();
        summary.second_pass = missed.len();
        for entity in missed {
            mapper.assign(entity);
        }

        schematic.bounding_box = Some(hull);
        schematic.boxes = boxes;
    }

    schematic.entities.reserve(mapper.len());
    for (_, entity) in mapper.iter() {
        schematic
            .entities
            .push(record_entity(world, entity, &mapper, registry)?);
    }

    summary.entities = schematic.entities.len();
    summary.elapsed = started.elapsed();
    info!(
        entities = summary.entities,
        second_pass = summary.second_pass,
        boxes = summary.boxes_merged,
        elapsed_ms = summary.elapsed.as_secs_f64() * 1e3,
        "captured schematic"
    );
    Ok((schematic, summary))
}

/// Diff one live entity against its archetype.
fn record_entity(
    world: &World,
    entity: EntityId,
    mapper: &EntityMapper,
    registry: &SaverRegistry,
) -> Result<EntityRecord, SchematicError> {
    let archetype = world
        .archetype_of(entity)
        .ok_or(SchematicError::NotAnInstance { entity })?;
    let prefab = world
        .catalog()
        .lookup(archetype)
        .ok_or(SchematicError::MissingArchetype { entity, archetype })?;
    let name = world.catalog().display_name(archetype).unwrap_or_default();

    let mut record = EntityRecord::new(archetype, name);
    record.position = world.get_component::<Translation>(entity).map(|t| t.0);
    record.rotation = world.get_component::<Rotation>(entity).map(|r| r.0);
    record.tile_position = world.get_component::<TilePosition>(entity).map(|t| t.0);
    record.tile_bounds = world.get_component::<TileBounds>(entity).copied();

    for kind in registry.kinds() {
        let Some(saver) = registry.get(kind) else {
            continue;
        };
        let Some(live) = world.component(entity, kind) else {
            continue;
        };
        let patch = match world.component(prefab, kind) {
            Some(default) => saver.diff(default, live, mapper),
            None => Some(saver.snapshot(live, mapper)),
        };
        if let Some(patch) = patch {
            record.components.insert(kind, patch);
        }
    }

    record.removals = world
        .kinds(prefab)
        .into_iter()
        .filter(|kind| !TRANSFORM_KINDS.contains(kind) && !world.has_kind(entity, *kind))
        .collect::<BTreeSet<_>>();

    record.keep_team = world
        .get_component::<TeamLink>(entity)
        .and_then(|link| link.0)
        .is_some_and(|team| world.has_component::<NeutralTeam>(team));

    Ok(record)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_world::prelude::*;

    const FLOOR: ArchetypeId = ArchetypeId(1);
    const CELL: ArchetypeId = ArchetypeId(2);
    const HALL: ArchetypeId = ArchetypeId(3);

    fn world() -> World {
        let mut world = World::new();
        world
            .register_archetype(
                FLOOR,
                "TM_Floor",
                ComponentBundle::new()
                    .with(Health {
                        value: 10.0,
                        max: 10.0,
                    })
                    .with(Door::default()),
            )
            .unwrap();
        world
            .register_archetype(CELL, "TM_Cell", ComponentBundle::new().with(Cell::default()))
            .unwrap();
        world
            .register_archetype(HALL, "TM_Hall", ComponentBundle::new())
            .unwrap();
        world
    }

    fn place(world: &mut World, archetype: ArchetypeId, at: Vec3) -> EntityId {
        let e = world.instantiate(archetype).unwrap();
        world.insert_component(e, Translation(at)).unwrap();
        let tile = tile_of(at);
        world.insert_component(e, TilePosition(tile)).unwrap();
        world
            .insert_component(e, TileBounds { min: tile, max: tile })
            .unwrap();
        e
    }

    #[test]
    fn unusable_regions_are_rejected() {
        let w = world();
        let registry = SaverRegistry::standard();
        for request in [
            CaptureRequest::radius(Vec3::ZERO, 0.0),
            CaptureRequest::radius(Vec3::ZERO, f32::NAN),
            CaptureRequest::rect(Vec3::ZERO, 4.0, -1.0),
            CaptureRequest::territory(9),
        ] {
            assert!(matches!(
                capture(&w, &request, &registry),
                Err(SchematicError::InvalidRegion { .. })
            ));
        }
    }

    #[test]
    fn bare_entities_are_not_instances() {
        let mut w = world();
        let bare = w.spawn_with(Translation(Vec3::ZERO));
        let mut mapper = EntityMapper::new();
        mapper.assign(bare);
        assert!(matches!(
            record_entity(&w, bare, &mapper, &SaverRegistry::standard()),
            Err(SchematicError::NotAnInstance { entity }) if entity == bare
        ));
        // The public path never maps such an entity in the first place.
        let (schematic, _) = capture(
            &w,
            &CaptureRequest::radius(Vec3::ZERO, 4.0),
            &SaverRegistry::standard(),
        )
        .unwrap();
        assert!(schematic.entities.is_empty());
    }

    #[test]
    fn unchanged_entity_records_only_transform() {
        let mut w = world();
        let floor = place(&mut w, FLOOR, Vec3::new(1.0, 0.0, 1.0));
        let (schematic, summary) = capture(
            &w,
            &CaptureRequest::radius(Vec3::ZERO, 5.0),
            &SaverRegistry::standard(),
        )
        .unwrap();
        assert_eq!(summary.entities, 1);
        let record = &schematic.entities[0];
        assert_eq!(record.archetype.id, FLOOR);
        assert_eq!(record.archetype.name, "TM_Floor");
        assert_eq!(record.position, Some(Vec3::new(1.0, 0.0, 1.0)));
        assert!(record.components.is_empty());
        assert!(record.removals.is_empty());
        assert!(schematic.bounding_box.unwrap().contains(to_grid(Vec3::ZERO)));
        assert!(w.is_alive(floor));
    }

    #[test]
    fn changes_additions_and_removals_are_recorded() {
        let mut w = world();
        let floor = place(&mut w, FLOOR, Vec3::ZERO);
        w.get_component_mut::<Health>(floor).unwrap().value = 4.0;
        w.remove_component::<Door>(floor).unwrap();
        w.insert_component(floor, Immortal(true)).unwrap();

        let (schematic, _) = capture(
            &w,
            &CaptureRequest::radius(Vec3::ZERO, 5.0),
            &SaverRegistry::standard(),
        )
        .unwrap();
        let record = &schematic.entities[0];
        assert_eq!(
            record.components[&ComponentKind::Health],
            serde_json::json!({ "value": 4.0 })
        );
        assert!(record.components.contains_key(&ComponentKind::Immortal));
        assert_eq!(
            record.removals.iter().copied().collect::<Vec<_>>(),
            vec![ComponentKind::Door]
        );
    }

    #[test]
    fn references_use_capture_indices() {
        let mut w = world();
        let cell = place(&mut w, CELL, Vec3::ZERO);
        let inmate = place(&mut w, HALL, Vec3::new(1.0, 0.0, 0.0));
        w.get_component_mut::<Cell>(cell).unwrap().occupant = Some(inmate);

        let (schematic, _) = capture(
            &w,
            &CaptureRequest::radius(Vec3::ZERO, 5.0),
            &SaverRegistry::standard(),
        )
        .unwrap();
        // The cell was created first, so it is index 1 and the inmate index 2.
        assert_eq!(
            schematic.entities[0].components[&ComponentKind::Cell],
            serde_json::json!({ "occupant": 2 })
        );
    }

    #[test]
    fn second_pass_finds_large_footprints() {
        let mut w = world();
        place(&mut w, HALL, Vec3::ZERO);
        // Anchored far away but its bounds reach back over the first tile.
        let hall = w.instantiate(HALL).unwrap();
        w.insert_component(hall, Translation(Vec3::new(30.0, 0.0, 0.0)))
            .unwrap();
        w.insert_component(
            hall,
            TileBounds {
                min: tile_of(Vec3::ZERO),
                max: tile_of(Vec3::new(30.0, 0.0, 0.0)),
            },
        )
        .unwrap();

        let (schematic, summary) = capture(
            &w,
            &CaptureRequest::radius(Vec3::ZERO, 5.0),
            &SaverRegistry::standard(),
        )
        .unwrap();
        assert_eq!(summary.second_pass, 1);
        assert_eq!(schematic.entities.len(), 2);
        assert_eq!(schematic.boxes.len(), 1);
    }

    #[test]
    fn territory_capture_has_no_boxes() {
        let mut w = world();
        let floor = place(&mut w, FLOOR, Vec3::ZERO);
        let tile = tile_of(Vec3::ZERO);
        w.territories_mut()
            .insert(Territory::new(4, tile, tile.offset(GridCoord::new(4, 4))));
        let (schematic, _) = capture(
            &w,
            &CaptureRequest::territory(4),
            &SaverRegistry::standard(),
        )
        .unwrap();
        assert_eq!(schematic.anchor().unwrap(), SchematicAnchor::Territory(4));
        assert!(schematic.bounding_box.is_none());
        assert!(schematic.boxes.is_empty());
        assert_eq!(schematic.entities.len(), 1);
        assert!(w.is_alive(floor));
    }

    #[test]
    fn neutral_team_link_sets_keep_team() {
        let mut w = world();
        let neutral = w.spawn_with(NeutralTeam);
        let floor = place(&mut w, FLOOR, Vec3::ZERO);
        w.insert_component(floor, TeamLink(Some(neutral))).unwrap();
        let (schematic, _) = capture(
            &w,
            &CaptureRequest::radius(Vec3::ZERO, 5.0),
            &SaverRegistry::standard(),
        )
        .unwrap();
        assert!(schematic.entities[0].keep_team);
    }
}
