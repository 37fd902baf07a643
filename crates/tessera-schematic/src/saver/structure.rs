//! Savers for plain-value structure state: health, immortality, dismantle
//! permission, doors.

use serde::{Deserialize, Serialize};

use tessera_world::component::{Dismantle, Door, Health, Immortal};

use super::{changed, ApplyContext, PatchCodec};
use crate::mapper::EntityMapper;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
}

impl PatchCodec for Health {
    type Patch = HealthPatch;

    fn diff(archetype: &Self, live: &Self, _mapper: &EntityMapper) -> HealthPatch {
        HealthPatch {
            value: changed(&archetype.value, &live.value),
            max: changed(&archetype.max, &live.max),
        }
    }

    fn snapshot(live: &Self, _mapper: &EntityMapper) -> HealthPatch {
        HealthPatch {
            value: Some(live.value),
            max: Some(live.max),
        }
    }

    fn apply(&mut self, patch: &HealthPatch, _ctx: &mut ApplyContext<'_>) {
        if let Some(value) = patch.value {
            self.value = value;
        }
        if let Some(max) = patch.max {
            self.max = max;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImmortalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immortal: Option<bool>,
}

impl PatchCodec for Immortal {
    type Patch = ImmortalPatch;

    fn diff(archetype: &Self, live: &Self, _mapper: &EntityMapper) -> ImmortalPatch {
        ImmortalPatch {
            immortal: changed(&archetype.0, &live.0),
        }
    }

    fn snapshot(live: &Self, _mapper: &EntityMapper) -> ImmortalPatch {
        ImmortalPatch {
            immortal: Some(live.0),
        }
    }

    fn apply(&mut self, patch: &ImmortalPatch, _ctx: &mut ApplyContext<'_>) {
        if let Some(immortal) = patch.immortal {
            self.0 = immortal;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DismantlePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
}

impl PatchCodec for Dismantle {
    type Patch = DismantlePatch;

    fn diff(archetype: &Self, live: &Self, _mapper: &EntityMapper) -> DismantlePatch {
        DismantlePatch {
            allowed: changed(&archetype.allowed, &live.allowed),
        }
    }

    fn snapshot(live: &Self, _mapper: &EntityMapper) -> DismantlePatch {
        DismantlePatch {
            allowed: Some(live.allowed),
        }
    }

    fn apply(&mut self, patch: &DismantlePatch, _ctx: &mut ApplyContext<'_>) {
        if let Some(allowed) = patch.allowed {
            self.allowed = allowed;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl PatchCodec for Door {
    type Patch = DoorPatch;

    fn diff(archetype: &Self, live: &Self, _mapper: &EntityMapper) -> DoorPatch {
        DoorPatch {
            open: changed(&archetype.open, &live.open),
            locked: changed(&archetype.locked, &live.locked),
        }
    }

    fn snapshot(live: &Self, _mapper: &EntityMapper) -> DoorPatch {
        DoorPatch {
            open: Some(live.open),
            locked: Some(live.locked),
        }
    }

    fn apply(&mut self, patch: &DoorPatch, _ctx: &mut ApplyContext<'_>) {
        if let Some(open) = patch.open {
            self.open = open;
        }
        if let Some(locked) = patch.locked {
            self.locked = locked;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::CreatedEntities;

    #[test]
    fn health_round_trips_through_diff() {
        let archetype = Health {
            value: 100.0,
            max: 100.0,
        };
        let live = Health {
            value: 35.0,
            max: 100.0,
        };
        let patch = Health::diff(&archetype, &live, &EntityMapper::new());
        assert_eq!(patch.max, None);

        let created = CreatedEntities::with_len(0);
        let mut ctx = ApplyContext::new(&created, 1);
        let mut fresh = archetype;
        fresh.apply(&patch, &mut ctx);
        assert_eq!(fresh, live);
    }

    #[test]
    fn empty_patch_leaves_target_untouched() {
        let created = CreatedEntities::with_len(0);
        let mut ctx = ApplyContext::new(&created, 1);
        let mut door = Door {
            open: true,
            locked: true,
        };
        door.apply(&DoorPatch::default(), &mut ctx);
        assert!(door.open && door.locked);
    }

    #[test]
    fn snapshot_sets_every_field() {
        let patch = Dismantle::snapshot(&Dismantle { allowed: false }, &EntityMapper::new());
        assert_eq!(patch.allowed, Some(false));
        let patch = Immortal::snapshot(&Immortal(true), &EntityMapper::new());
        assert_eq!(patch.immortal, Some(true));
    }
}
