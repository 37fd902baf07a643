//! The fixed set of component kinds a live entity can carry.
//!
//! Every kind is a plain serde-friendly struct. [`ComponentKind`] is the tag
//! used as a lookup key (by the world's per-entity storage and by the
//! schematic saver table), and [`Component`] is the tagged union stored per
//! entity. The [`ComponentData`] trait connects a concrete struct to its tag
//! so the world can offer typed `get::<T>()` / `insert(e, T)` access.
//!
//! References to other entities are stored as `Option<EntityId>`; `None`
//! means "no reference".

use serde::{Deserialize, Serialize};

use crate::bounds::{GridCoord, Quat, Vec3};
use crate::catalog::ArchetypeId;
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// ComponentData
// ---------------------------------------------------------------------------

/// Links a component struct to its [`ComponentKind`] tag.
pub trait ComponentData: Clone + Default + Sized + 'static {
    /// The tag this struct is stored under.
    const KIND: ComponentKind;

    /// Borrow the struct out of a [`Component`] with a matching tag.
    fn from_component(component: &Component) -> Option<&Self>;

    /// Mutably borrow the struct out of a [`Component`] with a matching tag.
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;

    /// Wrap the struct in its [`Component`] variant.
    fn into_component(self) -> Component;
}

macro_rules! component_kinds {
    ($( $(#[$doc:meta])* $kind:ident ),* $(,)?) => {
        /// Tag naming one component kind.
        ///
        /// Serialized in `snake_case`; the tags double as the keys of a
        /// schematic entity's patch map, so renaming a variant is a format
        /// change.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ComponentKind {
            $( $(#[$doc])* $kind, )*
        }

        impl ComponentKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [ComponentKind] = &[$(ComponentKind::$kind),*];
        }

        /// A component value tagged with its kind.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum Component {
            $( $kind($kind), )*
        }

        impl Component {
            /// The tag of the wrapped value.
            pub fn kind(&self) -> ComponentKind {
                match self {
                    $( Component::$kind(_) => ComponentKind::$kind, )*
                }
            }
        }

        $(
            impl ComponentData for $kind {
                const KIND: ComponentKind = ComponentKind::$kind;

                fn from_component(component: &Component) -> Option<&Self> {
                    match component {
                        Component::$kind(value) => Some(value),
                        _ => None,
                    }
                }

                fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                    match component {
                        Component::$kind(value) => Some(value),
                        _ => None,
                    }
                }

                fn into_component(self) -> Component {
                    Component::$kind(self)
                }
            }

            impl From<$kind> for Component {
                fn from(value: $kind) -> Self {
                    Component::$kind(value)
                }
            }
        )*
    };
}

component_kinds! {
    /// World-space position.
    Translation,
    /// World-space orientation.
    Rotation,
    /// Anchor tile of a grid-placed entity.
    TilePosition,
    /// Inclusive tile rectangle occupied by a grid-placed entity.
    TileBounds,
    /// Vertical extent of a grid-placed entity, relative to its translation.
    TileHeight,
    Health,
    /// Team membership value.
    Team,
    /// Reference to the team entity this entity belongs to.
    TeamLink,
    /// Reference to the territory anchor this entity is connected to.
    AnchorLink,
    /// Reference to the owning user.
    Owner,
    Door,
    Container,
    /// A cell that can hold one occupant entity.
    Cell,
    /// References to the neighbouring floor tiles.
    FloorLinks,
    /// Entities attached to this one; destroyed together with it.
    Attachment,
    Immortal,
    Dismantle,
    /// Placement blueprint that points back at the entity built from it.
    Blueprint,
    /// Marks a territory anchor.
    Anchor,
    /// Data carried by a team entity.
    TeamData,
    /// Marks the world's neutral team entity.
    NeutralTeam,
    /// Marks a world portal; never captured, never spawned from a schematic.
    Portal,
    /// Marks an archetype that transforms itself once its inventory empties.
    ConsumeOnEmpty,
    /// Marks an entity created by a schematic restore.
    SchematicSpawned,
}

// ---------------------------------------------------------------------------
// Component structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation(pub Vec3);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation(pub Quat);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TilePosition(pub GridCoord);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileBounds {
    pub min: GridCoord,
    pub max: GridCoord,
}

impl TileBounds {
    /// The all-zero bounds hosts use for "not placed on the grid".
    pub fn is_degenerate(&self) -> bool {
        self.min == GridCoord::default() && self.max == GridCoord::default()
    }

    pub fn offset(&self, by: GridCoord) -> TileBounds {
        TileBounds {
            min: self.min.offset(by),
            max: self.max.offset(by),
        }
    }

    pub fn checked_offset(&self, by: GridCoord) -> Option<TileBounds> {
        Some(TileBounds {
            min: self.min.checked_offset(by)?,
            max: self.max.checked_offset(by)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TileHeight {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Health {
    pub value: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Team {
    pub value: i32,
    pub faction: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamLink(pub Option<EntityId>);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnchorLink(pub Option<EntityId>);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Owner(pub Option<EntityId>);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Door {
    pub open: bool,
    pub locked: bool,
}

/// One inventory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ArchetypeId,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Container {
    pub capacity: u32,
    pub items: Vec<ItemStack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub occupant: Option<EntityId>,
    /// Effect applied to whoever occupies the cell.
    pub restraint: Option<ArchetypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FloorLinks {
    pub north: Option<EntityId>,
    pub east: Option<EntityId>,
    pub south: Option<EntityId>,
    pub west: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    pub attached: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Immortal(pub bool);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dismantle {
    pub allowed: bool,
}

impl Default for Dismantle {
    fn default() -> Self {
        Self { allowed: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Blueprint {
    pub entity: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Anchor;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamData {
    pub value: i32,
    /// The anchor this team holds, if any.
    pub anchor: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NeutralTeam;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Portal;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsumeOnEmpty;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicSpawned;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
