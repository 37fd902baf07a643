//! Incremental, time-sliced restore of a [`Schematic`] into the world.
//!
//! A [`RestoreTask`] is an explicit state machine:
//!
//! ```text
//! Validating -> Clearing -> Spawning -> Finalizing -> Done
//!     \-> Aborted
//! ```
//!
//! - **Validating** decodes the document, checks its version, anchor and
//!   destination offset, then plans the clearing in batches: first scanning
//!   the world for candidates and anchor protection boxes, then filtering the
//!   candidates down to the entities to clear. Nothing in the world is
//!   touched, so every abort leaves the world exactly as it was.
//! - **Clearing** suppresses respawns and destroys the planned entities in
//!   batches, cascading through attachments.
//! - **Spawning** releases dependency groups one at a time. Each group is
//!   instantiated whole, then patched, so references inside the group
//!   resolve against the created-entity table.
//! - **Finalizing** re-enables respawns and reports what could not be
//!   restored.
//!
//! Each call to [`RestoreTask::step`] performs units of work (decoding, one
//! planning batch, one destroy batch, one group) until its [`SliceBudget`] runs out. At least
//! one unit runs per call.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use tessera_world::bounds::{Aabb, GridCoord, Vec3};
use tessera_world::catalog::ArchetypeId;
use tessera_world::component::{
    Anchor, AnchorLink, Blueprint, Container, Dismantle, Door, Immortal, NeutralTeam, Owner,
    Rotation, SchematicSpawned, Team, TeamData, TeamLink, TilePosition, Translation,
};
use tessera_world::entity::EntityId;
use tessera_world::spatial::{checked_tile_offset, grid_shift, to_grid, GRID_SCALE};
use tessera_world::territory::NO_TERRITORY;
use tessera_world::world::World;
use tessera_world::WorldError;

use crate::config::{EligibilityRules, RestoreConfig};
use crate::error::{RestoreWarning, SchematicError};
use crate::grouping::{group_dependencies, GroupScheduler};
use crate::mapper::CreatedEntities;
use crate::notify::{NotificationSink, Notifier};
use crate::saver::{ApplyContext, SaverRegistry};
use crate::scheduler::{SliceBudget, SliceDiagnostics};
use crate::schematic::{EntityRecord, Schematic, SchematicAnchor, FORMAT_VERSION};
use crate::session::{AnchorInfo, SessionPreferences};

/// Header of the end-of-restore list of unresolvable archetype names.
pub const MISSING_ARCHETYPES_HEADER: &str = "Missing archetypes that could be remapped";

/// Final message of every completed restore.
pub const FINISHED_MESSAGE: &str = "Finished Loading Schematic";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Where a restore currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Validating,
    Clearing,
    Spawning,
    Finalizing,
    Done,
    Aborted,
}

/// Per-restore options chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoreOptions {
    /// Who asked; receives notifications and keys the session preferences.
    pub caller: EntityId,
    /// Restore a location-anchored schematic around this point instead of
    /// where it was captured.
    pub new_center: Option<Vec3>,
    /// Grid-space margin added around every clearing box.
    pub expand_clear: f32,
}

impl RestoreOptions {
    pub fn new(caller: EntityId) -> Self {
        Self {
            caller,
            new_center: None,
            expand_clear: 0.0,
        }
    }

    pub fn at(mut self, center: Vec3) -> Self {
        self.new_center = Some(center);
        self
    }

    pub fn expand_clear(mut self, margin: f32) -> Self {
        self.expand_clear = margin;
        self
    }
}

/// Counters reported after every slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoreProgress {
    pub phase: RestorePhase,
    /// Entities planned for clearing.
    pub to_clear: usize,
    /// Entities destroyed by clearing, attachments included.
    pub destroyed: usize,
    /// Schematic entities whose group has been handled.
    pub loaded: usize,
    pub total: usize,
}

impl RestoreProgress {
    /// Share of schematic entities handled, 0 to 100.
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.loaded as f32 / self.total as f32
    }
}

/// Outcome of a finished restore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Entities created and still alive.
    pub created: usize,
    /// Entities destroyed while clearing.
    pub destroyed: usize,
    /// Spawned entities destroyed again for overlapping a protected anchor.
    pub collisions: usize,
    pub skipped_groups: usize,
    pub warnings: Vec<RestoreWarning>,
    /// Archetype names that resolved neither by id nor by name.
    pub missing_archetypes: Vec<String>,
    pub diagnostics: SliceDiagnostics,
}

/// What one [`RestoreTask::step`] produced.
#[derive(Debug)]
pub enum StepOutcome {
    /// More work remains. Also returned when stepping an aborted task.
    Pending(RestoreProgress),
    Finished(RestoreReport),
    /// The restore was rejected before touching the world.
    Aborted(SchematicError),
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

enum Source {
    Document(String),
    Parsed(Schematic),
}

/// The destination, decided during validation.
struct Plan {
    schematic: Schematic,
    translation: Vec3,
    tile_shift: GridCoord,
    /// Grid-space boxes around live anchors: never cleared, never spawned
    /// into.
    protected: Vec<Aabb>,
}

/// Where clearing candidates are looked for.
enum Region {
    Area(Aabb),
    Territory(i32),
}

impl Region {
    fn holds(&self, world: &World, entity: EntityId) -> bool {
        match *self {
            Region::Area(ref area) => world.is_in_box(entity, area),
            Region::Territory(index) => {
                index != NO_TERRITORY && world.territory_index_of(entity) == index
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanStage {
    /// Walking the world for candidates and anchors.
    Scanning,
    /// Narrowing candidates to the entities to clear.
    Filtering,
}

struct Planning {
    plan: Plan,
    region: Option<Region>,
    /// Relocated schematic boxes, unless the caller clears the entire area.
    boxes: Option<Vec<Aabb>>,
    stage: PlanStage,
    scan: Vec<EntityId>,
    candidates: Vec<EntityId>,
    doomed: Vec<EntityId>,
    cursor: usize,
}

struct Clearing {
    plan: Plan,
    doomed: Vec<EntityId>,
    cursor: usize,
}

struct Spawning {
    plan: Plan,
    scheduler: GroupScheduler,
    created: CreatedEntities,
    fallback: AnchorInfo,
    /// Anchor info per destination territory, resolved on first use.
    anchors: HashMap<i32, AnchorInfo>,
    neutral_team: Option<EntityId>,
}

enum State {
    Validating(Source),
    Planning(Planning),
    Clearing(Clearing),
    Spawning(Spawning),
    Finalizing,
    Done,
    Aborted,
}

enum Slice {
    Pending,
    Finished,
    Aborted(SchematicError),
}

// ---------------------------------------------------------------------------
// RestoreTask
// ---------------------------------------------------------------------------

/// One in-flight restore. Owns everything but the world and preferences.
pub struct RestoreTask {
    options: RestoreOptions,
    config: RestoreConfig,
    registry: Arc<SaverRegistry>,
    rules: EligibilityRules,
    state: State,
    progress: RestoreProgress,
    report: RestoreReport,
    missing: BTreeSet<String>,
    notifier: Notifier,
    started: Instant,
}

impl std::fmt::Debug for RestoreTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreTask")
            .field("options", &self.options)
            .field("progress", &self.progress())
            .finish()
    }
}

impl RestoreTask {
    /// Restore an already-decoded schematic. Its version and anchor are still
    /// checked in the validating phase.
    pub fn new(
        schematic: Schematic,
        options: RestoreOptions,
        config: RestoreConfig,
        registry: Arc<SaverRegistry>,
        rules: EligibilityRules,
    ) -> Self {
        Self::with_source(Source::Parsed(schematic), options, config, registry, rules)
    }

    /// Restore from a persisted JSON document, decoded in the validating
    /// phase.
    pub fn from_json(
        document: String,
        options: RestoreOptions,
        config: RestoreConfig,
        registry: Arc<SaverRegistry>,
        rules: EligibilityRules,
    ) -> Self {
        Self::with_source(Source::Document(document), options, config, registry, rules)
    }

    fn with_source(
        source: Source,
        options: RestoreOptions,
        config: RestoreConfig,
        registry: Arc<SaverRegistry>,
        rules: EligibilityRules,
    ) -> Self {
        let notifier = Notifier::new(
            options.caller,
            config.slice.notify_interval(),
            config.message_chunk_chars,
        );
        Self {
            options,
            config,
            registry,
            rules,
            state: State::Validating(source),
            progress: RestoreProgress {
                phase: RestorePhase::Validating,
                to_clear: 0,
                destroyed: 0,
                loaded: 0,
                total: 0,
            },
            report: RestoreReport::default(),
            missing: BTreeSet::new(),
            notifier,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> RestorePhase {
        match self.state {
            State::Validating(_) | State::Planning(_) => RestorePhase::Validating,
            State::Clearing(_) => RestorePhase::Clearing,
            State::Spawning(_) => RestorePhase::Spawning,
            State::Finalizing => RestorePhase::Finalizing,
            State::Done => RestorePhase::Done,
            State::Aborted => RestorePhase::Aborted,
        }
    }

    pub fn progress(&self) -> RestoreProgress {
        RestoreProgress {
            phase: self.phase(),
            ..self.progress
        }
    }

    /// Whether the task has reached `Done` or `Aborted`.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done | State::Aborted)
    }

    /// The configured length of one slice.
    pub fn slice_budget(&self) -> Duration {
        self.config.slice.budget()
    }

    /// Run units of work until `budget` is used up or the task ends.
    pub fn step(
        &mut self,
        world: &mut World,
        prefs: &SessionPreferences,
        sink: &mut dyn NotificationSink,
        budget: &SliceBudget,
    ) -> StepOutcome {
        let slice_started = Instant::now();
        let slice = self.run_slice(world, prefs, sink, budget);
        self.report.diagnostics.record(slice_started.elapsed());
        match slice {
            Slice::Pending => StepOutcome::Pending(self.progress()),
            Slice::Finished => StepOutcome::Finished(self.report.clone()),
            Slice::Aborted(err) => StepOutcome::Aborted(err),
        }
    }

    fn run_slice(
        &mut self,
        world: &mut World,
        prefs: &SessionPreferences,
        sink: &mut dyn NotificationSink,
        budget: &SliceBudget,
    ) -> Slice {
        loop {
            let before = self.phase();
            self.state = match std::mem::replace(&mut self.state, State::Aborted) {
                State::Validating(source) => match self.validate(source, world, prefs) {
                    Ok(next) => next,
                    Err(err) => {
                        warn!(caller = %self.options.caller, error = %err, "restore rejected");
                        return Slice::Aborted(err);
                    }
                },
                State::Planning(planning) => self.plan_batch(planning, world, sink),
                State::Clearing(clearing) => self.clear_batch(clearing, world, prefs, sink),
                State::Spawning(spawning) => self.spawn_group(spawning, world, sink),
                State::Finalizing => {
                    self.finalize(world, sink);
                    State::Done
                }
                State::Done => {
                    self.state = State::Done;
                    return Slice::Finished;
                }
                State::Aborted => return Slice::Pending,
            };
            let after = self.phase();
            if after != before {
                debug!(from = ?before, to = ?after, "restore phase changed");
            }
            if after == RestorePhase::Done {
                return Slice::Finished;
            }
            if budget.exhausted() {
                return Slice::Pending;
            }
        }
    }

    // -- validating ---------------------------------------------------------

    fn validate(
        &mut self,
        source: Source,
        world: &World,
        prefs: &SessionPreferences,
    ) -> Result<State, SchematicError> {
        let schematic = match source {
            Source::Document(text) => Schematic::from_json_str(&text)?,
            Source::Parsed(schematic) => {
                if schematic.version != FORMAT_VERSION {
                    return Err(SchematicError::VersionUnsupported {
                        found: schematic.version,
                        expected: FORMAT_VERSION.to_owned(),
                    });
                }
                schematic
            }
        };
        let caller = self.options.caller;
        let margin = self.options.expand_clear.max(0.0);
        let clear_entire_area = prefs.clearing_entire_area(caller);

        let (translation, region, boxes) = match schematic.anchor()? {
            SchematicAnchor::Location(origin) => {
                let mut translation = self
                    .options
                    .new_center
                    .map_or(Vec3::ZERO, |center| center.sub(origin));
                if !prefs.placing_off_grid(caller) {
                    translation = Vec3::new(
                        snap(translation.x, self.config.snap_horizontal),
                        snap(translation.y, self.config.snap_vertical),
                        snap(translation.z, self.config.snap_horizontal),
                    );
                }
                let shift = grid_shift(translation);
                let relocate = |area: &Aabb| {
                    let mut area = area.translated(shift);
                    area.expand(margin);
                    area
                };
                let region = schematic
                    .bounding_box
                    .map(|hull| Region::Area(relocate(&hull)));
                let boxes = (!clear_entire_area)
                    .then(|| schematic.boxes.iter().map(relocate).collect::<Vec<_>>());
                (translation, region, boxes)
            }
            SchematicAnchor::Territory(index) => (Vec3::ZERO, Some(Region::Territory(index)), None),
        };
        let tile_shift = destination_tile_shift(&schematic, translation)?;

        let scan: Vec<EntityId> = match region {
            Some(_) => world.entities().collect(),
            None => Vec::new(),
        };
        debug!(
            caller = %caller,
            entities = schematic.entities.len(),
            scanning = scan.len(),
            ?translation,
            "restore validated"
        );
        self.progress.total = schematic.entities.len();

        Ok(State::Planning(Planning {
            plan: Plan {
                schematic,
                translation,
                tile_shift,
                protected: Vec::new(),
            },
            region,
            boxes,
            stage: PlanStage::Scanning,
            scan,
            candidates: Vec::new(),
            doomed: Vec::new(),
            cursor: 0,
        }))
    }

    /// One batch of clearing candidates. Reads the world, never writes it.
    fn plan_batch(
        &mut self,
        mut planning: Planning,
        world: &World,
        sink: &mut dyn NotificationSink,
    ) -> State {
        let batch = self.config.slice.plan_batch.max(1);
        match planning.stage {
            PlanStage::Scanning => {
                let end = (planning.cursor + batch).min(planning.scan.len());
                let radius = self.config.anchor_protect_radius * GRID_SCALE;
                for &entity in &planning.scan[planning.cursor..end] {
                    let inside = planning
                        .region
                        .as_ref()
                        .is_some_and(|region| region.holds(world, entity));
                    if !inside {
                        continue;
                    }
                    if world.has_component::<Anchor>(entity) {
                        if let Some(t) = world.get_component::<Translation>(entity) {
                            planning.plan.protected.push(Aabb::around(
                                to_grid(t.0),
                                radius,
                                self.config.anchor_protect_height,
                            ));
                        }
                    }
                    planning.candidates.push(entity);
                }
                planning.cursor = end;
                if end == planning.scan.len() {
                    planning.stage = PlanStage::Filtering;
                    planning.cursor = 0;
                    planning.scan = Vec::new();
                }
                State::Planning(planning)
            }
            PlanStage::Filtering => {
                let end = (planning.cursor + batch).min(planning.candidates.len());
                for &entity in &planning.candidates[planning.cursor..end] {
                    let doomed = self.rules.may_clear(world, entity)
                        && !planning
                            .plan
                            .protected
                            .iter()
                            .any(|area| world.is_in_box(entity, area))
                        && planning.boxes.as_ref().map_or(true, |boxes| {
                            boxes.iter().any(|area| world.is_in_box(entity, area))
                        });
                    if doomed {
                        planning.doomed.push(entity);
                    }
                }
                planning.cursor = end;
                if end < planning.candidates.len() {
                    return State::Planning(planning);
                }
                self.end_planning(planning, sink)
            }
        }
    }

    fn end_planning(&mut self, planning: Planning, sink: &mut dyn NotificationSink) -> State {
        info!(
            caller = %self.options.caller,
            candidates = planning.candidates.len(),
            to_clear = planning.doomed.len(),
            protected = planning.plan.protected.len(),
            "planned destination clearing"
        );
        self.progress.to_clear = planning.doomed.len();
        self.notifier.always(
            sink,
            &format!(
                "Now deleting {} entities before loading in the schematic",
                planning.doomed.len()
            ),
        );
        State::Clearing(Clearing {
            plan: planning.plan,
            doomed: planning.doomed,
            cursor: 0,
        })
    }

    // -- clearing -----------------------------------------------------------

    fn clear_batch(
        &mut self,
        mut clearing: Clearing,
        world: &mut World,
        prefs: &SessionPreferences,
        sink: &mut dyn NotificationSink,
    ) -> State {
        world.set_respawns_suppressed(true);
        let end = (clearing.cursor + self.config.slice.destroy_batch.max(1)).min(clearing.doomed.len());
        for &entity in &clearing.doomed[clearing.cursor..end] {
            if world.is_alive(entity) {
                self.progress.destroyed += world.despawn_with_attachments(entity);
            }
        }
        clearing.cursor = end;
        if clearing.cursor < clearing.doomed.len() {
            return State::Clearing(clearing);
        }

        self.report.destroyed = self.progress.destroyed;
        info!(destroyed = self.report.destroyed, "cleared destination");
        State::Spawning(self.begin_spawning(clearing.plan, world, prefs, sink))
    }

    // -- spawning -----------------------------------------------------------

    fn begin_spawning(
        &mut self,
        plan: Plan,
        world: &World,
        prefs: &SessionPreferences,
        sink: &mut dyn NotificationSink,
    ) -> Spawning {
        let deps: Vec<Vec<usize>> = plan
            .schematic
            .entities
            .iter()
            .enumerate()
            .map(|(slot, record)| {
                self.registry
                    .references(&record.components)
                    .into_iter()
                    .filter(|&index| index != slot + 1)
                    .map(|index| index - 1)
                    .collect()
            })
            .collect();
        let grouping = group_dependencies(&deps);
        debug!(
            entities = deps.len(),
            groups = grouping.len(),
            "grouped schematic entities"
        );

        let fallback = prefs.fallback_for(world, self.options.caller);
        self.notifier
            .always(sink, "Starting to load in the schematic");
        Spawning {
            created: CreatedEntities::with_len(plan.schematic.entities.len()),
            scheduler: GroupScheduler::new(grouping),
            plan,
            fallback,
            anchors: HashMap::from([(NO_TERRITORY, fallback)]),
            neutral_team: world.first_with::<NeutralTeam>(),
        }
    }

    fn spawn_group(
        &mut self,
        mut spawning: Spawning,
        world: &mut World,
        sink: &mut dyn NotificationSink,
    ) -> State {
        let Some(next) = spawning.scheduler.next() else {
            return self.end_spawning(&spawning);
        };
        let members = spawning
            .scheduler
            .grouping()
            .group(next.group)
            .map(|group| group.members.clone())
            .unwrap_or_default();
        if next.forced {
            debug!(
                group = next.group,
                "no group is ready; releasing the highest remaining one"
            );
        }

        match self.resolve_group(next.group, &members, &spawning.plan.schematic, world) {
            Ok(archetypes) => {
                for (&member, &archetype) in members.iter().zip(&archetypes) {
                    match spawning.spawn_member(world, member, archetype) {
                        Ok(Some(entity)) => spawning.created.set(member + 1, Some(entity)),
                        Ok(None) => self.report.collisions += 1,
                        Err(err) => warn!(entity = member + 1, error = %err, "failed to spawn"),
                    }
                }
                let warnings = spawning.apply_patches(world, &members, &self.registry);
                self.report.warnings.extend(warnings);
            }
            Err(warning) => {
                warn!(group = next.group, members = members.len(), %warning, "skipping group");
                self.report.skipped_groups += 1;
                self.report.warnings.push(warning);
            }
        }

        self.progress.loaded += members.len();
        let percent = self.progress.percent();
        if self
            .notifier
            .maybe(sink, &format!("Loading {percent:.1}% complete"))
        {
            info!(
                percent,
                elapsed_ms = self.started.elapsed().as_secs_f64() * 1e3,
                "restore progress"
            );
        }

        if spawning.scheduler.remaining() == 0 {
            return self.end_spawning(&spawning);
        }
        State::Spawning(spawning)
    }

    fn end_spawning(&mut self, spawning: &Spawning) -> State {
        self.report.created = spawning.created.created_count();
        State::Finalizing
    }

    /// The archetype for each member, or the reason the group is skipped.
    fn resolve_group(
        &mut self,
        group: usize,
        members: &[usize],
        schematic: &Schematic,
        world: &World,
    ) -> Result<Vec<ArchetypeId>, RestoreWarning> {
        let catalog = world.catalog();
        let mut archetypes = Vec::with_capacity(members.len());
        for &member in members {
            let wanted = &schematic.entities[member].archetype;
            let id = if catalog.contains(wanted.id) {
                wanted.id
            } else if let Some(id) = Some(wanted.name.as_str())
                .filter(|name| !name.is_empty())
                .and_then(|name| catalog.find_by_name(name))
            {
                debug!(from = %wanted.id, to = %id, name = %wanted.name, "remapped archetype by name");
                id
            } else {
                let name = if wanted.name.is_empty() {
                    wanted.id.to_string()
                } else {
                    wanted.name.clone()
                };
                self.missing.insert(name.clone());
                return Err(RestoreWarning::MissingArchetype {
                    group,
                    archetype: wanted.id,
                    name,
                });
            };

            if let Some(prefab) = catalog.lookup(id) {
                if let Some(&kind) = self
                    .rules
                    .incompatible_kinds
                    .iter()
                    .find(|&&kind| world.has_kind(prefab, kind))
                {
                    return Err(RestoreWarning::IncompatibleArchetype {
                        group,
                        archetype: id,
                        kind,
                    });
                }
            }
            archetypes.push(id);
        }
        Ok(archetypes)
    }

    // -- finalizing ---------------------------------------------------------

    fn finalize(&mut self, world: &mut World, sink: &mut dyn NotificationSink) {
        world.set_respawns_suppressed(false);
        self.report.missing_archetypes = self.missing.iter().cloned().collect();
        info!(
            created = self.report.created,
            destroyed = self.report.destroyed,
            collisions = self.report.collisions,
            skipped_groups = self.report.skipped_groups,
            warnings = self.report.warnings.len(),
            elapsed_ms = self.started.elapsed().as_secs_f64() * 1e3,
            "finished restoring schematic"
        );
        self.notifier.always(sink, FINISHED_MESSAGE);
        if !self.missing.is_empty() {
            self.notifier
                .listing(sink, MISSING_ARCHETYPES_HEADER, &self.missing);
        }
    }
}

/// The tile shift for `translation`, once every placed record is known to stay
/// on the grid after it.
fn destination_tile_shift(
    schematic: &Schematic,
    translation: Vec3,
) -> Result<GridCoord, SchematicError> {
    let off_grid = |reason: String| SchematicError::InvalidRegion { reason };
    let shift = checked_tile_offset(translation)
        .filter(|_| translation.is_finite())
        .ok_or_else(|| off_grid(format!("destination offset {translation:?} is off the grid")))?;
    for (slot, record) in schematic.entities.iter().enumerate() {
        let tile_fits = record
            .tile_position
            .map_or(true, |tile| tile.checked_offset(shift).is_some());
        let bounds_fit = record
            .tile_bounds
            .map_or(true, |bounds| bounds.checked_offset(shift).is_some());
        let position_fits = record
            .position
            .map_or(true, |position| position.add(translation).is_finite());
        if !(tile_fits && bounds_fit && position_fits) {
            return Err(off_grid(format!(
                "entity {} would leave the grid when shifted by {translation:?}",
                slot + 1
            )));
        }
    }
    Ok(shift)
}

fn snap(value: f32, step: f32) -> f32 {
    if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    }
}

// ---------------------------------------------------------------------------
// Spawning helpers
// ---------------------------------------------------------------------------

impl Spawning {
    /// Instantiate schematic entity `member` and give it its place and
    /// ownership. `None` when it collided with a protected anchor and was
    /// destroyed again.
    fn spawn_member(
        &mut self,
        world: &mut World,
        member: usize,
        archetype: ArchetypeId,
    ) -> Result<Option<EntityId>, WorldError> {
        let record = &self.plan.schematic.entities[member];
        let entity = world.instantiate(archetype)?;
        place(world, entity, record, self.plan.translation, self.plan.tile_shift)?;

        let territory = world.territory_index_of(entity);
        let fallback = self.fallback;
        let info = *self.anchors.entry(territory).or_insert_with(|| AnchorInfo {
            anchor: world.anchor_for_territory(territory).or(fallback.anchor),
            ..fallback
        });
        assign_ownership(world, entity, record, info, self.neutral_team)?;

        if territory == NO_TERRITORY && world.has_component::<TilePosition>(entity) {
            world.insert_component(entity, Immortal(true))?;
        }

        if self
            .plan
            .protected
            .iter()
            .any(|area| world.is_in_box(entity, area))
        {
            debug!(entity = member + 1, "spawned onto a protected anchor; destroying");
            world.despawn(entity)?;
            return Ok(None);
        }

        if let Some(blueprint) = world.get_component_mut::<Blueprint>(entity) {
            blueprint.entity = Some(entity);
        }
        Ok(Some(entity))
    }

    /// Apply each member's patches and removals.
    fn apply_patches(
        &self,
        world: &mut World,
        members: &[usize],
        registry: &SaverRegistry,
    ) -> Vec<RestoreWarning> {
        let mut warnings = Vec::new();
        for &member in members {
            let index = member + 1;
            let Some(entity) = self.created.get(index) else {
                continue;
            };
            let record = &self.plan.schematic.entities[member];
            for (&kind, patch) in &record.components {
                let Some(saver) = registry.get(kind) else {
                    debug!(entity = index, ?kind, "no saver registered; patch ignored");
                    continue;
                };
                let mut target = world
                    .component(entity, kind)
                    .cloned()
                    .unwrap_or_else(|| saver.default_component());
                let mut ctx = ApplyContext::new(&self.created, index);
                match saver.apply(&mut target, patch, &mut ctx) {
                    Ok(()) => {
                        if let Err(err) = world.set_component(entity, target) {
                            warn!(entity = index, error = %err, "failed to write patched component");
                        }
                    }
                    Err(source) => {
                        warn!(entity = index, error = %source, "malformed patch; kind left as spawned");
                        warnings.push(RestoreWarning::MalformedPatch {
                            entity: index,
                            source,
                        });
                    }
                }
                warnings.extend(ctx.into_warnings());
            }
            for &kind in &record.removals {
                if let Err(err) = world.remove_kind(entity, kind) {
                    warn!(entity = index, ?kind, error = %err, "failed to apply removal");
                }
            }
        }
        warnings
    }
}

/// Write the record's transform, shifted to the destination, and mark the
/// entity as restored.
fn place(
    world: &mut World,
    entity: EntityId,
    record: &EntityRecord,
    translation: Vec3,
    tile_shift: GridCoord,
) -> Result<(), WorldError> {
    world.insert_component(entity, SchematicSpawned)?;
    if let Some(position) = record.position {
        world.insert_component(entity, Translation(position.add(translation)))?;
    }
    if let Some(rotation) = record.rotation {
        world.insert_component(entity, Rotation(rotation))?;
    }
    if let Some(tile) = record.tile_position {
        world.insert_component(entity, TilePosition(tile.offset(tile_shift)))?;
    }
    if let Some(bounds) = record.tile_bounds {
        world.insert_component(entity, bounds.offset(tile_shift))?;
    }
    Ok(())
}

/// Hand the entity to the neutral team or to the anchor's team.
fn assign_ownership(
    world: &mut World,
    entity: EntityId,
    record: &EntityRecord,
    info: AnchorInfo,
    neutral_team: Option<EntityId>,
) -> Result<(), WorldError> {
    let neutral = (!info.owner_doors && world.has_component::<Door>(entity))
        || (!info.owner_containers && world.has_component::<Container>(entity));

    if neutral {
        if world.has_component::<AnchorLink>(entity) {
            world.insert_component(entity, AnchorLink(None))?;
        }
        join_team(world, entity, neutral_team, info.anchor)
    } else if let Some(anchor) = info.anchor {
        if world.has_component::<AnchorLink>(entity) {
            world.insert_component(entity, AnchorLink(Some(anchor)))?;
        }
        if record.keep_team {
            return Ok(());
        }
        let team = world.get_component::<TeamLink>(anchor).and_then(|link| link.0);
        join_team(world, entity, team, Some(anchor))
    } else {
        if world.has_component::<Dismantle>(entity) {
            world.insert_component(entity, Dismantle { allowed: false })?;
        }
        Ok(())
    }
}

fn join_team(
    world: &mut World,
    entity: EntityId,
    team: Option<EntityId>,
    anchor: Option<EntityId>,
) -> Result<(), WorldError> {
    let Some(team) = team else {
        return Ok(());
    };
    if world.has_component::<Team>(entity) {
        let value = world.get_component::<TeamData>(team).map_or(0, |data| data.value);
        world.insert_component(entity, Team { value, faction: -1 })?;
        let owner = anchor
            .and_then(|anchor| world.get_component::<Owner>(anchor))
            .copied()
            .unwrap_or_default();
        world.insert_component(entity, owner)?;
    }
    if world.has_component::<TeamLink>(entity) {
        world.insert_component(entity, TeamLink(Some(team)))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
