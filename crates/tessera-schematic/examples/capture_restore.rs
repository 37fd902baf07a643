//! Capture a small walled yard, save it, and restore a copy next door one
//! frame slice at a time.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example capture_restore -p tessera-schematic

use std::time::Duration;

use tessera_schematic::prelude::*;

const WALL: ArchetypeId = ArchetypeId(1);
const GATE: ArchetypeId = ArchetypeId(2);

/// Prints every message as the caller would see it in chat.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&mut self, recipient: EntityId, text: &str) {
        println!("[to {recipient}] {text}");
    }
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

/// An instance of `archetype` at `pos`, two tiles wide either side.
fn place(world: &mut World, archetype: ArchetypeId, pos: Vec3) -> Result<EntityId, anyhow::Error> {
    let e = world.instantiate(archetype)?;
    let tile = tile_of(pos);
    world.insert_component(e, Translation(pos))?;
    world.insert_component(e, TilePosition(tile))?;
    world.insert_component(
        e,
        TileBounds {
            min: GridCoord::new(tile.x - 2, tile.y),
            max: GridCoord::new(tile.x + 2, tile.y + 1),
        },
    )?;
    Ok(e)
}

fn build_yard(world: &mut World) -> Result<(), anyhow::Error> {
    world.register_archetype(
        WALL,
        "TM_StoneWall",
        ComponentBundle::new().with(Health {
            value: 500.0,
            max: 500.0,
        }),
    )?;
    world.register_archetype(
        GATE,
        "TM_Gate",
        ComponentBundle::new()
            .with(Door::default())
            .with(Health {
                value: 300.0,
                max: 300.0,
            }),
    )?;

    for x in [-6.0, -4.0, -2.0, 2.0, 4.0, 6.0] {
        place(world, WALL, Vec3::new(x, 0.0, -4.0))?;
        place(world, WALL, Vec3::new(x, 0.0, 4.0))?;
    }
    let gate = place(world, GATE, Vec3::new(0.0, 0.0, -4.0))?;
    if let Some(door) = world.get_component_mut::<Door>(gate) {
        door.locked = true;
    }
    // One damaged wall, so the schematic carries a patch.
    let damaged = place(world, WALL, Vec3::new(0.0, 0.0, 4.0))?;
    if let Some(health) = world.get_component_mut::<Health>(damaged) {
        health.value = 120.0;
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut world = World::new();
    build_yard(&mut world)?;
    let builder = world.spawn_bundle(ComponentBundle::new());

    let directory = std::env::temp_dir().join("tessera-schematics");
    let service = SchematicService::new(SchematicConfig {
        directory,
        ..Default::default()
    });

    let request = service.request(RegionSelector::Box {
        center: Vec3::ZERO,
        half_x: 8.0,
        half_z: 5.0,
    });
    let summary = service.save(&world, "yard", &request)?;
    println!(
        "captured {} entities into {} boxes ({:?})",
        summary.entities, summary.boxes_merged, summary.elapsed
    );
    println!("stored schematics: {:?}", service.list()?);

    // A host frame loop: one slice per frame.
    let options = RestoreOptions::new(builder).at(Vec3::new(40.0, 0.0, 0.0));
    let mut task = service.begin_restore("yard", options)?;
    let mut sink = ConsoleSink;
    let mut frame = 0u32;
    let report = loop {
        frame += 1;
        let budget = SliceBudget::start(Duration::from_millis(2));
        match task.step(&mut world, service.prefs(), &mut sink, &budget) {
            StepOutcome::Pending(progress) => {
                tracing::debug!(frame, phase = ?progress.phase, percent = progress.percent(), "frame");
            }
            StepOutcome::Finished(report) => break report,
            StepOutcome::Aborted(err) => return Err(err.into()),
        }
    };

    println!(
        "restored {} entities over {} frames (longest slice {:?}), {} warnings",
        report.created,
        frame,
        report.diagnostics.longest,
        report.warnings.len()
    );
    Ok(())
}
