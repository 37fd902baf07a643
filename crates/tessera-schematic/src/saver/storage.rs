//! Container inventories. Items are stored as archetype ids, never as entity
//! references, so containers add no restore-order constraints.

use serde::{Deserialize, Serialize};

use tessera_world::component::{Container, ItemStack};

use super::{changed, ApplyContext, PatchCodec};
use crate::mapper::EntityMapper;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// The whole item list; inventories are replaced, not merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemStack>>,
}

impl PatchCodec for Container {
    type Patch = ContainerPatch;

    fn diff(archetype: &Self, live: &Self, _mapper: &EntityMapper) -> ContainerPatch {
        ContainerPatch {
            capacity: changed(&archetype.capacity, &live.capacity),
            items: changed(&archetype.items, &live.items),
        }
    }

    fn snapshot(live: &Self, _mapper: &EntityMapper) -> ContainerPatch {
        ContainerPatch {
            capacity: Some(live.capacity),
            items: Some(live.items.clone()),
        }
    }

    fn apply(&mut self, patch: &ContainerPatch, _ctx: &mut ApplyContext<'_>) {
        if let Some(capacity) = patch.capacity {
            self.capacity = capacity;
        }
        if let Some(items) = &patch.items {
            self.items = items.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::CreatedEntities;
    use tessera_world::catalog::ArchetypeId;

    #[test]
    fn item_list_replaced_wholesale() {
        let archetype = Container {
            capacity: 4,
            items: vec![ItemStack {
                item: ArchetypeId(1),
                amount: 1,
            }],
        };
        let live = Container {
            capacity: 4,
            items: vec![ItemStack {
                item: ArchetypeId(2),
                amount: 9,
            }],
        };
        let patch = Container::diff(&archetype, &live, &EntityMapper::new());
        assert_eq!(patch.capacity, None);

        let created = CreatedEntities::with_len(0);
        let mut ctx = ApplyContext::new(&created, 1);
        let mut fresh = archetype.clone();
        fresh.apply(&patch, &mut ctx);
        assert_eq!(fresh, live);
    }
}
