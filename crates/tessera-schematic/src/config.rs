//! Configuration for the schematic engine.
//!
//! Every struct has a `Default` matching the reference behaviour and
//! deserializes with `#[serde(default)]`, so a host config file only needs to
//! name the values it overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tessera_world::catalog::ArchetypeId;
use tessera_world::component::ComponentKind;

use crate::error::SchematicError;

// ---------------------------------------------------------------------------
// SliceConfig
// ---------------------------------------------------------------------------

/// Cooperative slicing of a restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Wall-clock budget of one slice, in milliseconds.
    pub budget_ms: u64,
    /// Minimum gap between rate-limited progress messages, in milliseconds.
    pub notify_interval_ms: u64,
    /// Entities destroyed between budget checks while clearing.
    pub destroy_batch: usize,
    /// Entities examined between budget checks while planning the clearing.
    pub plan_batch: usize,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            budget_ms: 50,
            notify_interval_ms: 2_500,
            destroy_batch: 50,
            plan_batch: 200,
        }
    }
}

impl SliceConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// RestoreConfig
// ---------------------------------------------------------------------------

/// Tunables for restoring a schematic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub slice: SliceConfig,
    /// Horizontal half-size, in world units, of the no-destroy box kept
    /// around each anchor in the destination.
    pub anchor_protect_radius: f32,
    /// Height of the anchor protection box.
    pub anchor_protect_height: f32,
    /// Horizontal step translations snap to.
    pub snap_horizontal: f32,
    /// Vertical step translations snap to.
    pub snap_vertical: f32,
    /// Longest message sent to the caller in one notification.
    pub message_chunk_chars: usize,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            slice: SliceConfig::default(),
            anchor_protect_radius: 2.5,
            anchor_protect_height: 0.1,
            snap_horizontal: 5.0,
            snap_vertical: 1.0,
            message_chunk_chars: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// EligibilityRules
// ---------------------------------------------------------------------------

/// Which entities capture may record and clearing may destroy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityRules {
    /// Archetype-name prefixes that are allowed. Empty allows every name.
    pub allowed_prefixes: Vec<String>,
    /// Archetypes never captured or cleared, whatever their name.
    pub denied_archetypes: Vec<ArchetypeId>,
    /// Entities carrying any of these kinds are never captured or cleared.
    pub excluded_kinds: Vec<ComponentKind>,
    /// Archetypes carrying any of these kinds are skipped at restore.
    pub incompatible_kinds: Vec<ComponentKind>,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            allowed_prefixes: Vec::new(),
            denied_archetypes: Vec::new(),
            excluded_kinds: vec![ComponentKind::Anchor, ComponentKind::Portal],
            incompatible_kinds: vec![ComponentKind::ConsumeOnEmpty, ComponentKind::Portal],
        }
    }
}

// ---------------------------------------------------------------------------
// SchematicConfig
// ---------------------------------------------------------------------------

/// Top-level configuration of a [`SchematicService`](crate::service::SchematicService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchematicConfig {
    /// Directory holding `<name>.schematic` files.
    pub directory: PathBuf,
    pub restore: RestoreConfig,
    pub eligibility: EligibilityRules,
}

impl Default for SchematicConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("schematics"),
            restore: RestoreConfig::default(),
            eligibility: EligibilityRules::default(),
        }
    }
}

impl SchematicConfig {
    /// Load from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SchematicError> {
        serde_json::from_str(json).map_err(SchematicError::format)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = RestoreConfig::default();
        assert_eq!(config.slice.budget(), Duration::from_millis(50));
        assert_eq!(config.slice.notify_interval(), Duration::from_millis(2_500));
        assert_eq!(config.slice.destroy_batch, 50);
        assert_eq!(config.slice.plan_batch, 200);
        assert_eq!(config.message_chunk_chars, 500);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = SchematicConfig::from_json_str(
            r#"{ "directory": "/tmp/s", "restore": { "slice": { "budget_ms": 5 } },
                 "eligibility": { "allowed_prefixes": ["TM_"] } }"#,
        )
        .unwrap();
        assert_eq!(config.directory, PathBuf::from("/tmp/s"));
        assert_eq!(config.restore.slice.budget_ms, 5);
        assert_eq!(config.restore.slice.destroy_batch, 50);
        assert_eq!(config.restore.snap_horizontal, 5.0);
        assert_eq!(config.eligibility.allowed_prefixes, vec!["TM_".to_owned()]);
        assert!(config
            .eligibility
            .excluded_kinds
            .contains(&ComponentKind::Anchor));
    }

    #[test]
    fn bad_config_is_format_error() {
        assert!(matches!(
            SchematicConfig::from_json_str(r#"{ "restore": 3 }"#),
            Err(SchematicError::Format { .. })
        ));
    }
}
