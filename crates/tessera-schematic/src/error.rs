//! Error and warning types for capture and restore.
//!
//! [`SchematicError`] aborts an operation before anything in the world has
//! been mutated. [`RestoreWarning`] describes a per-group degradation that the
//! restore records and carries on past.

use std::path::PathBuf;

use tessera_world::catalog::ArchetypeId;
use tessera_world::component::ComponentKind;
use tessera_world::entity::EntityId;

/// Errors that abort a capture or restore.
#[derive(Debug, thiserror::Error)]
pub enum SchematicError {
    /// No schematic with the given name exists in the store.
    #[error("Schematic '{name}' not found.")]
    NotFound { name: String },

    /// The persisted document could not be decoded.
    #[error("Schematic is malformed: {details}")]
    Format { details: String },

    /// The document's format version is not the one this engine reads.
    #[error("Schematic version {found} is not supported, expected {expected}.")]
    VersionUnsupported { found: String, expected: String },

    /// The capture region or the restore destination is unusable.
    #[error("Invalid region: {reason}")]
    InvalidRegion { reason: String },

    /// Schematic names must be a single non-empty path component.
    #[error("Invalid schematic name '{name}'.")]
    InvalidName { name: String },

    /// A captured entity's archetype is missing from the catalog.
    #[error("entity {entity} references archetype {archetype} which is not registered")]
    MissingArchetype {
        entity: EntityId,
        archetype: ArchetypeId,
    },

    /// A captured entity was not instantiated from any archetype.
    #[error("entity {entity} is not an archetype instance")]
    NotAnInstance { entity: EntityId },

    /// Reading or writing the schematic store failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SchematicError {
    pub(crate) fn format(err: impl std::fmt::Display) -> Self {
        SchematicError::Format {
            details: err.to_string(),
        }
    }
}

/// Per-group problems a restore works around instead of aborting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RestoreWarning {
    /// The archetype could not be resolved by id or by name; the group was
    /// skipped.
    #[error("group {group} skipped: archetype {archetype} ('{name}') is missing")]
    MissingArchetype {
        group: usize,
        archetype: ArchetypeId,
        name: String,
    },

    /// The archetype carries a component that must not be spawned this way;
    /// the group was skipped.
    #[error("group {group} skipped: archetype {archetype} carries incompatible {kind:?}")]
    IncompatibleArchetype {
        group: usize,
        archetype: ArchetypeId,
        kind: ComponentKind,
    },

    /// A reference pointed at an entity that was never created; it was left
    /// empty.
    #[error("entity {entity} {kind:?} references index {index} which was never created")]
    UnresolvedDependency {
        entity: usize,
        kind: ComponentKind,
        index: usize,
    },

    /// A patch payload could not be decoded; that kind was left at its
    /// default.
    #[error("entity {entity}: {source}")]
    MalformedPatch {
        entity: usize,
        #[source]
        source: SaverError,
    },
}

/// A kind's patch payload failed to decode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed {kind:?} patch: {details}")]
pub struct SaverError {
    pub kind: ComponentKind,
    pub details: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
