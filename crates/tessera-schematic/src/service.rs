//! The host-facing façade: capture to the store, list, and restore.

use std::sync::Arc;

use tracing::info;

use tessera_world::world::World;

use crate::capture::{capture, CaptureRequest, CaptureSummary, RegionSelector};
use crate::config::{EligibilityRules, RestoreConfig, SchematicConfig};
use crate::error::SchematicError;
use crate::notify::NotificationSink;
use crate::restore::{RestoreOptions, RestoreReport, RestoreTask};
use crate::saver::SaverRegistry;
use crate::scheduler::run_to_completion;
use crate::session::SessionPreferences;
use crate::store::SchematicStore;

/// Store, saver table, rules, config and caller preferences in one place.
#[derive(Debug)]
pub struct SchematicService {
    store: SchematicStore,
    registry: Arc<SaverRegistry>,
    rules: EligibilityRules,
    config: RestoreConfig,
    prefs: SessionPreferences,
}

impl SchematicService {
    /// A service with the built-in savers.
    pub fn new(config: SchematicConfig) -> Self {
        Self::with_registry(config, SaverRegistry::standard())
    }

    pub fn with_registry(config: SchematicConfig, registry: SaverRegistry) -> Self {
        Self {
            store: SchematicStore::new(config.directory),
            registry: Arc::new(registry),
            rules: config.eligibility,
            config: config.restore,
            prefs: SessionPreferences::new(),
        }
    }

    pub fn store(&self) -> &SchematicStore {
        &self.store
    }

    pub fn registry(&self) -> &SaverRegistry {
        &self.registry
    }

    pub fn prefs(&self) -> &SessionPreferences {
        &self.prefs
    }

    pub fn prefs_mut(&mut self) -> &mut SessionPreferences {
        &mut self.prefs
    }

    /// A capture request for `region` using the configured eligibility
    /// rules.
    pub fn request(&self, region: RegionSelector) -> CaptureRequest {
        CaptureRequest::new(region).with_rules(self.rules.clone())
    }

    /// Capture and store under `name`. The name is checked before capturing.
    pub fn save(
        &self,
        world: &World,
        name: &str,
        request: &CaptureRequest,
    ) -> Result<CaptureSummary, SchematicError> {
        self.store.path_for(name)?;
        let (schematic, summary) = capture(world, request, &self.registry)?;
        let path = self.store.save(name, &schematic)?;
        info!(name, path = %path.display(), entities = summary.entities, "saved schematic");
        Ok(summary)
    }

    pub fn list(&self) -> Result<Vec<String>, SchematicError> {
        self.store.list()
    }

    /// Start restoring `name`. A missing schematic fails here; decoding and
    /// version checks happen in the task's first step.
    pub fn begin_restore(
        &self,
        name: &str,
        options: RestoreOptions,
    ) -> Result<RestoreTask, SchematicError> {
        let document = self.store.read_text(name)?;
        info!(name, caller = %options.caller, "loading schematic");
        Ok(RestoreTask::from_json(
            document,
            options,
            self.config.clone(),
            Arc::clone(&self.registry),
            self.rules.clone(),
        ))
    }

    /// Restore `name` in one go, slice after slice.
    pub fn restore(
        &self,
        world: &mut World,
        name: &str,
        options: RestoreOptions,
        sink: &mut dyn NotificationSink,
    ) -> Result<RestoreReport, SchematicError> {
        let mut task = self.begin_restore(name, options)?;
        run_to_completion(&mut task, world, &self.prefs, sink)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
