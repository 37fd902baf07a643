//! Property tests for the diff/apply contract of the built-in savers.

use std::fmt::Debug;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use serde_json::{json, Value};
use tessera_schematic::mapper::{CreatedEntities, EntityMapper};
use tessera_schematic::saver::{
    ApplyContext, AttachmentPatch, CellPatch, ContainerPatch, DismantlePatch, DoorPatch,
    FloorLinksPatch, HealthPatch, ImmortalPatch, SaverRegistry,
};
use tessera_world::catalog::ArchetypeId;
use tessera_world::component::{
    Attachment, Cell, Component, Container, Dismantle, Door, FloorLinks, Health, Immortal,
    ItemStack,
};
use tessera_world::entity::EntityId;

const CAPTURED: u32 = 4;

/// A mapper over entities `1..=CAPTURED` and a created table that maps each
/// index straight back, so references survive the round trip unchanged.
fn identity_tables() -> (EntityMapper, CreatedEntities) {
    let mut mapper = EntityMapper::new();
    let mut created = CreatedEntities::with_len(CAPTURED as usize);
    for raw in 1..=CAPTURED {
        let entity = EntityId::new(raw, 0);
        let index = mapper.assign(entity);
        created.set(index, Some(entity));
    }
    (mapper, created)
}

/// A patch as it comes back from a stored schematic.
fn through_text(patch: &Value) -> Value {
    let text = serde_json::to_string(patch).unwrap();
    serde_json::from_str(&text).unwrap()
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn entity() -> impl Strategy<Value = EntityId> {
    (1..=CAPTURED).prop_map(|raw| EntityId::new(raw, 0))
}

fn link() -> impl Strategy<Value = Option<EntityId>> {
    prop::option::of(entity())
}

fn health() -> BoxedStrategy<Component> {
    (0u8..4, 0u8..4)
        .prop_map(|(value, max)| {
            Component::Health(Health {
                value: value as f32 * 25.0,
                max: max as f32 * 25.0,
            })
        })
        .boxed()
}

fn immortal() -> BoxedStrategy<Component> {
    any::<bool>()
        .prop_map(|immortal| Component::Immortal(Immortal(immortal)))
        .boxed()
}

fn dismantle() -> BoxedStrategy<Component> {
    any::<bool>()
        .prop_map(|allowed| Component::Dismantle(Dismantle { allowed }))
        .boxed()
}

fn door() -> BoxedStrategy<Component> {
    (any::<bool>(), any::<bool>())
        .prop_map(|(open, locked)| Component::Door(Door { open, locked }))
        .boxed()
}

fn container() -> BoxedStrategy<Component> {
    let stack = (0i32..3, 1u32..3).prop_map(|(item, amount)| ItemStack {
        item: ArchetypeId(item),
        amount,
    });
    (0u32..3, prop::collection::vec(stack, 0..3))
        .prop_map(|(capacity, items)| Component::Container(Container { capacity, items }))
        .boxed()
}

fn cell() -> BoxedStrategy<Component> {
    (link(), prop::option::of((0i32..3).prop_map(ArchetypeId)))
        .prop_map(|(occupant, restraint)| Component::Cell(Cell { occupant, restraint }))
        .boxed()
}

fn floor_links() -> BoxedStrategy<Component> {
    (link(), link(), link(), link())
        .prop_map(|(north, east, south, west)| {
            Component::FloorLinks(FloorLinks {
                north,
                east,
                south,
                west,
            })
        })
        .boxed()
}

fn attachment() -> BoxedStrategy<Component> {
    prop::collection::vec(entity(), 0..3)
        .prop_map(|attached| Component::Attachment(Attachment { attached }))
        .boxed()
}

/// Archetype and live values of the same kind.
fn pair(strategy: BoxedStrategy<Component>) -> BoxedStrategy<(Component, Component)> {
    (strategy.clone(), strategy).boxed()
}

fn any_pair() -> impl Strategy<Value = (Component, Component)> {
    prop_oneof![
        pair(health()),
        pair(immortal()),
        pair(dismantle()),
        pair(door()),
        pair(container()),
        pair(cell()),
        pair(floor_links()),
        pair(attachment()),
    ]
}

// ---------------------------------------------------------------------------
// Minimality
// ---------------------------------------------------------------------------

/// A field is in the patch exactly when archetype and live disagree on it.
fn field<T: PartialEq + Debug, P>(
    name: &str,
    present: &Option<P>,
    archetype: &T,
    live: &T,
) -> Result<(), TestCaseError> {
    prop_assert_eq!(
        present.is_some(),
        archetype != live,
        "field {}: archetype {:?}, live {:?}",
        name,
        archetype,
        live
    );
    Ok(())
}

fn decode<P: serde::de::DeserializeOwned>(patch: &Value) -> Result<P, TestCaseError> {
    serde_json::from_value(patch.clone()).map_err(|e| TestCaseError::fail(e.to_string()))
}

fn assert_minimal(archetype: &Component, live: &Component, patch: &Value) -> Result<(), TestCaseError> {
    match (archetype, live) {
        (Component::Health(a), Component::Health(l)) => {
            let p: HealthPatch = decode(patch)?;
            field("value", &p.value, &a.value, &l.value)?;
            field("max", &p.max, &a.max, &l.max)
        }
        (Component::Immortal(a), Component::Immortal(l)) => {
            let p: ImmortalPatch = decode(patch)?;
            field("immortal", &p.immortal, &a.0, &l.0)
        }
        (Component::Dismantle(a), Component::Dismantle(l)) => {
            let p: DismantlePatch = decode(patch)?;
            field("allowed", &p.allowed, &a.allowed, &l.allowed)
        }
        (Component::Door(a), Component::Door(l)) => {
            let p: DoorPatch = decode(patch)?;
            field("open", &p.open, &a.open, &l.open)?;
            field("locked", &p.locked, &a.locked, &l.locked)
        }
        (Component::Container(a), Component::Container(l)) => {
            let p: ContainerPatch = decode(patch)?;
            field("capacity", &p.capacity, &a.capacity, &l.capacity)?;
            field("items", &p.items, &a.items, &l.items)
        }
        (Component::Cell(a), Component::Cell(l)) => {
            let p: CellPatch = decode(patch)?;
            field("occupant", &p.occupant, &a.occupant, &l.occupant)?;
            field("restraint", &p.restraint, &a.restraint, &l.restraint)
        }
        (Component::FloorLinks(a), Component::FloorLinks(l)) => {
            let p: FloorLinksPatch = decode(patch)?;
            field("north", &p.north, &a.north, &l.north)?;
            field("east", &p.east, &a.east, &l.east)?;
            field("south", &p.south, &a.south, &l.south)?;
            field("west", &p.west, &a.west, &l.west)
        }
        (Component::Attachment(a), Component::Attachment(l)) => {
            let p: AttachmentPatch = decode(patch)?;
            field("attached", &p.attached, &a.attached, &l.attached)
        }
        other => Err(TestCaseError::fail(format!("unexpected pair {other:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1_000))]

    #[test]
    fn apply_of_diff_reproduces_live((archetype, live) in any_pair()) {
        let registry = SaverRegistry::standard();
        let saver = registry.get(archetype.kind()).unwrap();
        let (mapper, created) = identity_tables();

        match saver.diff(&archetype, &live, &mapper) {
            None => prop_assert_eq!(&archetype, &live),
            Some(patch) => {
                prop_assert_ne!(&archetype, &live);
                let patch = through_text(&patch);
                let mut target = archetype.clone();
                let mut ctx = ApplyContext::new(&created, 1);
                saver.apply(&mut target, &patch, &mut ctx).unwrap();
                prop_assert!(ctx.warnings().is_empty());
                prop_assert_eq!(target, live);
            }
        }
    }

    #[test]
    fn diff_holds_only_changed_fields((archetype, live) in any_pair()) {
        let registry = SaverRegistry::standard();
        let saver = registry.get(archetype.kind()).unwrap();
        let (mapper, _) = identity_tables();

        let patch = saver
            .diff(&archetype, &live, &mapper)
            .map_or_else(|| json!({}), |patch| through_text(&patch));
        assert_minimal(&archetype, &live, &patch)?;
    }

    #[test]
    fn snapshot_applies_over_the_default((_, live) in any_pair()) {
        let registry = SaverRegistry::standard();
        let saver = registry.get(live.kind()).unwrap();
        let (mapper, created) = identity_tables();

        let patch = through_text(&saver.snapshot(&live, &mapper));
        let mut target = saver.default_component();
        saver
            .apply(&mut target, &patch, &mut ApplyContext::new(&created, 1))
            .unwrap();
        prop_assert_eq!(target, live);
    }
}
