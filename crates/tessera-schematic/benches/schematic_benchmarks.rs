//! Schematic pipeline benchmarks.
//!
//! Covers the pieces whose cost grows with schematic size: merging footprint
//! boxes, grouping references, capturing a district, and restoring it.
//! Inputs come from a fixed-seed PCG so runs are comparable.
//!
//! Run with: `cargo bench --bench schematic_benchmarks`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use tessera_schematic::prelude::*;

const SEED: u64 = 0x5eed_7e55;
const FLOOR: ArchetypeId = ArchetypeId(1);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn random_boxes(count: usize) -> Vec<Aabb> {
    let mut rng = Pcg64::seed_from_u64(SEED);
    (0..count)
        .map(|_| {
            let (x, z) = (rng.gen_range(0..400) as f32, rng.gen_range(0..400) as f32);
            let (w, d) = (rng.gen_range(1..6) as f32, rng.gen_range(1..6) as f32);
            Aabb::new(Vec3::new(x, 0.0, z), Vec3::new(x + w, 1.0, z + d))
        })
        .collect()
}

/// Mostly one-way references with some mutual pairs.
fn random_deps(count: usize) -> Vec<Vec<usize>> {
    let mut rng = Pcg64::seed_from_u64(SEED);
    let mut deps = vec![Vec::new(); count];
    for i in 0..count {
        for _ in 0..rng.gen_range(0..3) {
            let j = rng.gen_range(0..count);
            deps[i].push(j);
            if rng.gen_bool(0.2) {
                deps[j].push(i);
            }
        }
    }
    deps
}

/// A square district of linked floor tiles around the origin.
fn district(side: usize) -> World {
    let mut world = World::new();
    world
        .register_archetype(
            FLOOR,
            "TM_Floor",
            ComponentBundle::new()
                .with(FloorLinks::default())
                .with(Health {
                    value: 10.0,
                    max: 10.0,
                }),
        )
        .unwrap();
    let mut rows: Vec<Vec<EntityId>> = Vec::new();
    for row in 0..side {
        let mut cells = Vec::new();
        for col in 0..side {
            let pos = Vec3::new(col as f32, 0.0, row as f32);
            let tile = tile_of(pos);
            let e = world.instantiate(FLOOR).unwrap();
            world.insert_component(e, Translation(pos)).unwrap();
            world.insert_component(e, TilePosition(tile)).unwrap();
            world
                .insert_component(
                    e,
                    TileBounds {
                        min: tile,
                        max: GridCoord::new(tile.x + 1, tile.y + 1),
                    },
                )
                .unwrap();
            if let Some(&west) = cells.last() {
                world.get_component_mut::<FloorLinks>(e).unwrap().west = Some(west);
                world.get_component_mut::<FloorLinks>(west).unwrap().east = Some(e);
            }
            if let Some(prev) = rows.last() {
                world.get_component_mut::<FloorLinks>(e).unwrap().south = Some(prev[col]);
            }
            cells.push(e);
        }
        rows.push(cells);
    }
    world
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_merge_boxes(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_all");
    for &count in &[100usize, 1_000, 5_000] {
        let boxes = random_boxes(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &boxes, |b, boxes| {
            b.iter_batched(
                || boxes.clone(),
                |mut boxes| {
                    merge_all(&mut boxes);
                    black_box(boxes.len())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_group_dependencies(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_dependencies");
    for &count in &[1_000usize, 10_000, 50_000] {
        let deps = random_deps(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &deps, |b, deps| {
            b.iter(|| {
                let grouping = group_dependencies(black_box(deps));
                black_box(GroupScheduler::new(grouping).count())
            });
        });
    }
    group.finish();
}

fn bench_capture(c: &mut Criterion) {
    let world = district(40);
    let registry = SaverRegistry::standard();
    let request = CaptureRequest::radius(Vec3::new(20.0, 0.0, 20.0), 40.0);
    c.bench_function("capture_district_1600", |b| {
        b.iter(|| {
            let (schematic, _) = capture(&world, &request, &registry).unwrap();
            black_box(schematic.entities.len())
        });
    });
}

fn bench_restore(c: &mut Criterion) {
    let registry = Arc::new(SaverRegistry::standard());
    let (schematic, _) = capture(
        &district(40),
        &CaptureRequest::radius(Vec3::new(20.0, 0.0, 20.0), 40.0),
        &registry,
    )
    .unwrap();
    let prefs = SessionPreferences::new();

    c.bench_function("restore_district_1600", |b| {
        b.iter_batched(
            || {
                let mut target = district(40);
                let caller = target.spawn_bundle(ComponentBundle::new());
                let task = RestoreTask::new(
                    schematic.clone(),
                    RestoreOptions::new(caller).at(Vec3::new(200.0, 0.0, 20.0)),
                    RestoreConfig::default(),
                    Arc::clone(&registry),
                    EligibilityRules::default(),
                );
                (target, task)
            },
            |(mut target, mut task)| {
                let report =
                    run_to_completion(&mut task, &mut target, &prefs, &mut NullSink).unwrap();
                black_box(report.created)
            },
            BatchSize::LargeInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_merge_boxes,
    bench_group_dependencies,
    bench_capture,
    bench_restore,
);
criterion_main!(benches);
