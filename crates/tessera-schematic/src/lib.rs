//! Tessera Schematic -- capture a region of the world into a portable
//! document and restore it elsewhere, spread over many short slices.
//!
//! Capture walks a region, keeps the entities the [`EligibilityRules`]
//! allow, and records each one as its archetype plus per-component patches.
//! Patches hold only what differs from the archetype. Entity references
//! inside patches become capture indices, so a schematic has no ties to the
//! world it came from.
//!
//! Restore is a [`RestoreTask`] state machine: validate, clear the target
//! area, spawn dependency groups in order, finalize. Each
//! [`step`](RestoreTask::step) does at most one slice of work, so a host can
//! interleave it with its own frame loop.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tessera_schematic::prelude::*;
//!
//! let mut world = World::new();
//! let wall = ArchetypeId(1);
//! world
//!     .register_archetype(wall, "Stone Wall", ComponentBundle::new().with(Health { value: 100.0, max: 100.0 }))
//!     .unwrap();
//! let e = world.instantiate(wall).unwrap();
//! world.insert_component(e, Translation(Vec3::ZERO)).unwrap();
//!
//! let registry = Arc::new(SaverRegistry::standard());
//! let (schematic, summary) =
//!     capture(&world, &CaptureRequest::radius(Vec3::ZERO, 4.0), &registry).unwrap();
//! assert_eq!(summary.entities, 1);
//!
//! let caller = world.spawn_bundle(ComponentBundle::new());
//! let mut task = RestoreTask::new(
//!     schematic,
//!     RestoreOptions::new(caller).at(Vec3::new(100.0, 0.0, 0.0)),
//!     RestoreConfig::default(),
//!     registry,
//!     EligibilityRules::default(),
//! );
//! let report = run_to_completion(&mut task, &mut world, &SessionPreferences::new(), &mut NullSink).unwrap();
//! assert_eq!(report.created, 1);
//! ```

#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod grouping;
pub mod mapper;
pub mod notify;
pub mod restore;
pub mod saver;
pub mod scheduler;
pub mod schematic;
pub mod service;
pub mod session;
pub mod store;

pub use tessera_world::bounds;

pub use capture::{capture, CaptureRequest, CaptureSummary, RegionSelector};
pub use config::{EligibilityRules, RestoreConfig, SchematicConfig, SliceConfig};
pub use error::{RestoreWarning, SaverError, SchematicError};
pub use restore::{RestoreOptions, RestoreReport, RestoreTask, StepOutcome};
pub use schematic::{Schematic, SchematicAnchor, FORMAT_VERSION};
pub use service::SchematicService;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage, world types included.
pub mod prelude {
    pub use tessera_world::prelude::*;

    pub use crate::capture::{capture, CaptureRequest, CaptureSummary, RegionSelector};
    pub use crate::config::{EligibilityRules, RestoreConfig, SchematicConfig, SliceConfig};
    pub use crate::error::{RestoreWarning, SaverError, SchematicError};
    pub use crate::grouping::{group_dependencies, GroupScheduler, Grouping};
    pub use crate::notify::{NotificationSink, NullSink};
    pub use crate::restore::{
        RestoreOptions, RestorePhase, RestoreProgress, RestoreReport, RestoreTask, StepOutcome,
    };
    pub use crate::saver::{ComponentSaver, SaverRegistry};
    pub use crate::scheduler::{run_to_completion, SliceBudget, SliceDiagnostics};
    pub use crate::schematic::{EntityRecord, Schematic, SchematicAnchor, FORMAT_VERSION};
    pub use crate::service::SchematicService;
    pub use crate::session::{AnchorInfo, SessionPreferences};
    pub use crate::store::SchematicStore;
}
