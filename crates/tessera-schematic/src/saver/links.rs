//! Savers for components that reference other entities.
//!
//! Reference fields are written as mapper indices. An index of 0 in a patch
//! means the field was set to "nothing" (or pointed outside the captured
//! set); an absent field means "keep the archetype's value".

use serde::{Deserialize, Deserializer, Serialize};

use tessera_world::catalog::ArchetypeId;
use tessera_world::component::{Attachment, Cell, FloorLinks};
use tessera_world::entity::EntityId;

use super::{changed, ApplyContext, PatchCodec};
use crate::mapper::EntityMapper;

/// Index of `live` if restoring the archetype's reference would not already
/// give the same result. References outside the captured set count as null.
fn changed_ref(
    archetype: Option<EntityId>,
    live: Option<EntityId>,
    mapper: &EntityMapper,
) -> Option<usize> {
    let index = mapper.index_of_ref(live);
    let archetype_restores_as_is = archetype.map_or(true, |e| mapper.contains(e));
    let same = archetype == live
        || (archetype_restores_as_is && mapper.index_of_ref(archetype) == index);
    (!same).then_some(index)
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupant: Option<usize>,
    /// `Some(None)` clears the restraint; serialized as `null`.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub restraint: Option<Option<ArchetypeId>>,
}

/// Keeps an explicit `null` distinct from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl PatchCodec for Cell {
    type Patch = CellPatch;

    fn diff(archetype: &Self, live: &Self, mapper: &EntityMapper) -> CellPatch {
        CellPatch {
            occupant: changed_ref(archetype.occupant, live.occupant, mapper),
            restraint: changed(&archetype.restraint, &live.restraint),
        }
    }

    fn snapshot(live: &Self, mapper: &EntityMapper) -> CellPatch {
        CellPatch {
            occupant: Some(mapper.index_of_ref(live.occupant)),
            restraint: Some(live.restraint),
        }
    }

    fn apply(&mut self, patch: &CellPatch, ctx: &mut ApplyContext<'_>) {
        if let Some(index) = patch.occupant {
            self.occupant = ctx.resolve(index);
        }
        if let Some(restraint) = patch.restraint {
            self.restraint = restraint;
        }
    }

    fn references(patch: &CellPatch) -> Vec<usize> {
        patch.occupant.into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// FloorLinks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorLinksPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub north: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub east: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub south: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub west: Option<usize>,
}

impl PatchCodec for FloorLinks {
    type Patch = FloorLinksPatch;

    fn diff(archetype: &Self, live: &Self, mapper: &EntityMapper) -> FloorLinksPatch {
        FloorLinksPatch {
            north: changed_ref(archetype.north, live.north, mapper),
            east: changed_ref(archetype.east, live.east, mapper),
            south: changed_ref(archetype.south, live.south, mapper),
            west: changed_ref(archetype.west, live.west, mapper),
        }
    }

    fn snapshot(live: &Self, mapper: &EntityMapper) -> FloorLinksPatch {
        FloorLinksPatch {
            north: Some(mapper.index_of_ref(live.north)),
            east: Some(mapper.index_of_ref(live.east)),
            south: Some(mapper.index_of_ref(live.south)),
            west: Some(mapper.index_of_ref(live.west)),
        }
    }

    fn apply(&mut self, patch: &FloorLinksPatch, ctx: &mut ApplyContext<'_>) {
        let slots = [
            (&mut self.north, patch.north),
            (&mut self.east, patch.east),
            (&mut self.south, patch.south),
            (&mut self.west, patch.west),
        ];
        for (slot, index) in slots {
            if let Some(index) = index {
                *slot = ctx.resolve(index);
            }
        }
    }

    fn references(patch: &FloorLinksPatch) -> Vec<usize> {
        [patch.north, patch.east, patch.south, patch.west]
            .into_iter()
            .flatten()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentPatch {
    /// Indices of attached entities; references outside the captured set are
    /// dropped at capture time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached: Option<Vec<usize>>,
}

fn attached_indices(attached: &[EntityId], mapper: &EntityMapper) -> Vec<usize> {
    attached
        .iter()
        .map(|&e| mapper.index_of(e))
        .filter(|&index| index != crate::mapper::NULL_INDEX)
        .collect()
}

impl PatchCodec for Attachment {
    type Patch = AttachmentPatch;

    fn diff(archetype: &Self, live: &Self, mapper: &EntityMapper) -> AttachmentPatch {
        AttachmentPatch {
            attached: (archetype.attached != live.attached)
                .then(|| attached_indices(&live.attached, mapper)),
        }
    }

    fn snapshot(live: &Self, mapper: &EntityMapper) -> AttachmentPatch {
        AttachmentPatch {
            attached: Some(attached_indices(&live.attached, mapper)),
        }
    }

    fn apply(&mut self, patch: &AttachmentPatch, ctx: &mut ApplyContext<'_>) {
        if let Some(indices) = &patch.attached {
            self.attached = indices.iter().filter_map(|&i| ctx.resolve(i)).collect();
        }
    }

    fn references(patch: &AttachmentPatch) -> Vec<usize> {
        patch.attached.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::CreatedEntities;

    fn e(index: u32) -> EntityId {
        EntityId::new(index, 0)
    }

    #[test]
    fn occupant_written_as_index() {
        let mut mapper = EntityMapper::new();
        mapper.assign(e(10));
        mapper.assign(e(20));
        let live = Cell {
            occupant: Some(e(20)),
            restraint: None,
        };
        let patch = Cell::diff(&Cell::default(), &live, &mapper);
        assert_eq!(patch.occupant, Some(2));
        assert_eq!(patch.restraint, None);
        assert_eq!(Cell::references(&patch), vec![2]);
    }

    #[test]
    fn references_outside_the_capture_match_a_null_archetype() {
        let mut mapper = EntityMapper::new();
        mapper.assign(e(10));
        let outside = Cell {
            occupant: Some(e(99)),
            restraint: None,
        };
        assert_eq!(Cell::diff(&Cell::default(), &outside, &mapper), CellPatch::default());

        // An archetype pointing outside still needs an explicit null.
        let patch = Cell::diff(&outside, &Cell::default(), &mapper);
        assert_eq!(patch.occupant, Some(0));
        let links = FloorLinks {
            east: Some(e(10)),
            ..FloorLinks::default()
        };
        let patch = FloorLinks::diff(&FloorLinks::default(), &links, &mapper);
        assert_eq!(patch.east, Some(1));
        assert_eq!(patch.north, None);
    }

    #[test]
    fn cleared_restraint_survives_json() {
        let patch = Cell::diff(
            &Cell {
                occupant: None,
                restraint: Some(ArchetypeId(4)),
            },
            &Cell::default(),
            &EntityMapper::new(),
        );
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "restraint": null }));
        let back: CellPatch = serde_json::from_value(json).unwrap();
        assert_eq!(back.restraint, Some(None));
        let absent: CellPatch = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.restraint, None);
    }

    #[test]
    fn reference_outside_capture_becomes_null_index() {
        let mapper = EntityMapper::new();
        let live = FloorLinks {
            north: Some(e(99)),
            ..Default::default()
        };
        let patch = FloorLinks::diff(&FloorLinks::default(), &live, &mapper);
        assert_eq!(patch.north, Some(0));
        assert_eq!(patch.south, None);
    }

    #[test]
    fn apply_resolves_through_created_table() {
        let mut created = CreatedEntities::with_len(3);
        created.set(1, Some(e(100)));
        created.set(3, Some(e(300)));
        let mut ctx = ApplyContext::new(&created, 2);

        let mut links = FloorLinks {
            west: Some(e(5)),
            ..Default::default()
        };
        let patch = FloorLinksPatch {
            north: Some(1),
            east: Some(3),
            south: None,
            west: Some(0),
        };
        links.apply(&patch, &mut ctx);
        assert_eq!(links.north, Some(e(100)));
        assert_eq!(links.east, Some(e(300)));
        assert_eq!(links.west, None);
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn attachments_drop_unresolved_entries() {
        let mut created = CreatedEntities::with_len(3);
        created.set(1, Some(e(100)));
        let mut ctx = ApplyContext::new(&created, 3);
        let mut attachment = Attachment::default();
        attachment.apply(
            &AttachmentPatch {
                attached: Some(vec![1, 2]),
            },
            &mut ctx,
        );
        assert_eq!(attachment.attached, vec![e(100)]);
        assert_eq!(ctx.warnings().len(), 1);
    }
}
