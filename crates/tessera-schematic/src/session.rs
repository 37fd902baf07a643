//! Per-caller restore preferences.
//!
//! Every setting is keyed by the caller's entity, so independent callers can
//! change their own preferences while other restores are in flight.

use std::collections::{HashMap, HashSet};

use tessera_world::component::{TeamData, TeamLink};
use tessera_world::entity::EntityId;
use tessera_world::world::World;

/// The anchor a restore assigns ownership from when the destination
/// territory has none, plus the caller's door/container ownership choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorInfo {
    pub anchor: Option<EntityId>,
    /// Doors join the anchor's team; otherwise they go to the neutral team.
    pub owner_doors: bool,
    /// Containers join the anchor's team; otherwise they go neutral.
    pub owner_containers: bool,
}

impl AnchorInfo {
    pub fn new(anchor: Option<EntityId>) -> Self {
        Self {
            anchor,
            owner_doors: true,
            owner_containers: true,
        }
    }
}

/// Caller-keyed preference tables, owned by whoever drives restores.
#[derive(Debug, Clone, Default)]
pub struct SessionPreferences {
    fallback: HashMap<EntityId, AnchorInfo>,
    clearing_entire_area: HashSet<EntityId>,
    placing_off_grid: HashSet<EntityId>,
}

impl SessionPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the fallback anchor for `caller`.
    pub fn set_fallback_anchor(
        &mut self,
        caller: EntityId,
        anchor: Option<EntityId>,
        owner_doors: bool,
        owner_containers: bool,
    ) {
        self.fallback.insert(
            caller,
            AnchorInfo {
                anchor,
                owner_doors,
                owner_containers,
            },
        );
    }

    pub fn use_neutral_doors(&mut self, world: &World, caller: EntityId) {
        self.update(world, caller, |info| info.owner_doors = false);
    }

    pub fn use_owner_doors(&mut self, world: &World, caller: EntityId) {
        self.update(world, caller, |info| info.owner_doors = true);
    }

    pub fn use_neutral_containers(&mut self, world: &World, caller: EntityId) {
        self.update(world, caller, |info| info.owner_containers = false);
    }

    pub fn use_owner_containers(&mut self, world: &World, caller: EntityId) {
        self.update(world, caller, |info| info.owner_containers = true);
    }

    /// Flip "clear the entire area" for `caller`; returns the new state.
    pub fn toggle_clearing_entire_area(&mut self, caller: EntityId) -> bool {
        toggle(&mut self.clearing_entire_area, caller)
    }

    pub fn clearing_entire_area(&self, caller: EntityId) -> bool {
        self.clearing_entire_area.contains(&caller)
    }

    /// Flip "place off grid" for `caller`; returns the new state.
    pub fn toggle_placing_off_grid(&mut self, caller: EntityId) -> bool {
        toggle(&mut self.placing_off_grid, caller)
    }

    pub fn placing_off_grid(&self, caller: EntityId) -> bool {
        self.placing_off_grid.contains(&caller)
    }

    /// The fallback anchor for `caller`.
    ///
    /// An explicit override wins. Otherwise the anchor held by the caller's
    /// team is used, with both ownership flags on.
    pub fn fallback_for(&self, world: &World, caller: EntityId) -> AnchorInfo {
        if let Some(info) = self.fallback.get(&caller) {
            return *info;
        }
        let anchor = world
            .get_component::<TeamLink>(caller)
            .and_then(|link| link.0)
            .and_then(|team| world.get_component::<TeamData>(team))
            .and_then(|data| data.anchor)
            .filter(|&anchor| world.is_alive(anchor));
        AnchorInfo::new(anchor)
    }

    fn update(&mut self, world: &World, caller: EntityId, change: impl FnOnce(&mut AnchorInfo)) {
        let mut info = self.fallback_for(world, caller);
        change(&mut info);
        self.fallback.insert(caller, info);
    }
}

fn toggle(set: &mut HashSet<EntityId>, caller: EntityId) -> bool {
    if set.remove(&caller) {
        false
    } else {
        set.insert(caller);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_world::component::Anchor;

    fn team_world() -> (World, EntityId, EntityId) {
        let mut world = World::new();
        let anchor = world.spawn_with(Anchor);
        let team = world.spawn_with(TeamData {
            value: 7,
            anchor: Some(anchor),
        });
        let caller = world.spawn_with(TeamLink(Some(team)));
        (world, caller, anchor)
    }

    #[test]
    fn fallback_comes_from_callers_team() {
        let (world, caller, anchor) = team_world();
        let prefs = SessionPreferences::new();
        assert_eq!(prefs.fallback_for(&world, caller), AnchorInfo::new(Some(anchor)));
    }

    #[test]
    fn override_wins_and_flags_are_per_caller() {
        let (mut world, caller, _) = team_world();
        let other_anchor = world.spawn_with(Anchor);
        let other_caller = world.spawn_with(TeamLink(None));
        let mut prefs = SessionPreferences::new();

        prefs.set_fallback_anchor(caller, Some(other_anchor), true, true);
        prefs.use_neutral_doors(&world, caller);
        let info = prefs.fallback_for(&world, caller);
        assert_eq!(info.anchor, Some(other_anchor));
        assert!(!info.owner_doors);
        assert!(info.owner_containers);

        prefs.use_neutral_containers(&world, other_caller);
        let info = prefs.fallback_for(&world, other_caller);
        assert_eq!(info.anchor, None);
        assert!(info.owner_doors);
        assert!(!info.owner_containers);
    }

    #[test]
    fn toggles_flip() {
        let (_, caller, _) = team_world();
        let mut prefs = SessionPreferences::new();
        assert!(prefs.toggle_placing_off_grid(caller));
        assert!(prefs.placing_off_grid(caller));
        assert!(!prefs.toggle_placing_off_grid(caller));
        assert!(!prefs.placing_off_grid(caller));
        assert!(prefs.toggle_clearing_entire_area(caller));
        assert!(prefs.clearing_entire_area(caller));
    }
}
