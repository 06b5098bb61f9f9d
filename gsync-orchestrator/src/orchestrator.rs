use std::sync::Arc;

use tracing::info;

use gsync_core::{FleetConfig, FleetError, Result};
use gsync_runtime::{ComposeTool, ContainerRuntime};

use crate::browser::{self, DirectoryListing};
use crate::lifecycle::{LifecycleDriver, OperationReport, RebuildEvent, RebuildSummary, STOP_GRACE};
use crate::manifest;
use crate::profile::{validate_profile_name_for, ProfileConfig};
use crate::registry::{self, ContainerObservation, ContainerStats, ProfileSummary};
use crate::status::{KeywordMatcher, LogMatcher};
use crate::store::{self, ProfileMetadata};

/// Entry point used by the HTTP layer. Blocking; call from a worker thread.
pub struct Orchestrator {
    fleet: Arc<FleetConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    driver: LifecycleDriver,
    matcher: Arc<dyn LogMatcher>,
}

impl Orchestrator {
    pub fn new(
        fleet: FleetConfig,
        runtime: Arc<dyn ContainerRuntime>,
        compose: Arc<dyn ComposeTool>,
    ) -> Self {
        let fleet = Arc::new(fleet);
        let matcher = Arc::new(KeywordMatcher::new(fleet.log_tail_lines));
        Self {
            driver: LifecycleDriver::new(fleet.clone(), runtime.clone(), compose),
            fleet,
            runtime,
            matcher,
        }
    }

    /// Replace the log heuristic used for `sync_status`.
    pub fn with_matcher(mut self, matcher: Arc<dyn LogMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn fleet(&self) -> &FleetConfig {
        &self.fleet
    }

    pub fn driver(&self) -> &LifecycleDriver {
        &self.driver
    }

    pub fn list_running(&self) -> Result<Vec<ContainerObservation>> {
        registry::list_running(&self.fleet, self.runtime.as_ref(), self.matcher.as_ref())
    }

    pub fn list_available(&self) -> Result<Vec<ProfileSummary>> {
        registry::list_available(&self.fleet, self.runtime.as_ref())
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileSummary>> {
        registry::list_profiles(&self.fleet)
    }

    pub fn container_stats(&self) -> Result<ContainerStats> {
        registry::container_stats(&self.fleet, self.runtime.as_ref())
    }

    pub fn container_logs(&self, container: &str, lines: usize) -> Result<String> {
        self.runtime.logs_tail(container, lines)
    }

    /// Blocks until the log stream ends or `on_line` returns false.
    pub fn follow_container_logs(
        &self,
        container: &str,
        on_line: &mut dyn FnMut(&str) -> bool,
    ) -> Result<()> {
        self.runtime.follow_logs(container, on_line)
    }

    pub fn start_container(&self, container: &str) -> Result<()> {
        self.driver
            .with_container_lock(container, |runtime| runtime.start(container))
    }

    pub fn stop_container(&self, container: &str) -> Result<()> {
        self.driver
            .with_container_lock(container, |runtime| runtime.stop(container, STOP_GRACE))
    }

    pub fn restart_container(&self, container: &str) -> Result<()> {
        self.driver
            .with_container_lock(container, |runtime| runtime.restart(container))
    }

    pub fn create_profile(&self, name: &str, display_name: Option<&str>) -> Result<ProfileMetadata> {
        let _guard = self.driver.locks().acquire(name);
        store::create_profile(&self.fleet, name, display_name)
    }

    pub fn rename_profile(&self, name: &str, display_name: &str) -> Result<ProfileMetadata> {
        let _guard = self.driver.locks().acquire(name);
        store::rename_profile(&self.fleet, name, display_name)
    }

    pub fn load_metadata(&self, name: &str) -> Result<ProfileMetadata> {
        validate_profile_name_for(&self.fleet, name)?;
        if !store::profile_exists(&self.fleet, name) {
            return Err(FleetError::NotFound(format!("profile '{name}'")));
        }
        Ok(store::load_metadata(&self.fleet, name))
    }

    /// Stored config; `ManifestMissing` for a profile never configured.
    pub fn load_config(&self, name: &str) -> Result<ProfileConfig> {
        validate_profile_name_for(&self.fleet, name)?;
        manifest::read_manifest(&self.fleet, name)
    }

    pub fn default_config(&self) -> ProfileConfig {
        ProfileConfig::defaults_for(&self.fleet)
    }

    /// Render and persist the manifest. The running container is untouched
    /// until the profile is recreated.
    pub fn save_config(&self, name: &str, config: &ProfileConfig) -> Result<String> {
        validate_profile_name_for(&self.fleet, name)?;
        let _guard = self.driver.locks().acquire(name);
        if !store::profile_exists(&self.fleet, name) {
            return Err(FleetError::NotFound(format!("profile '{name}'")));
        }
        let text = manifest::generate(&self.fleet, name, config)?;
        info!(profile = %name, "configuration saved");
        Ok(text)
    }

    pub fn start_profile(&self, name: &str) -> Result<String> {
        self.driver.start(name)
    }

    pub fn stop_profile(&self, name: &str) -> Result<String> {
        self.driver.stop(name)
    }

    pub fn recreate_profile(&self, name: &str) -> Result<String> {
        self.driver.recreate(name)
    }

    pub fn delete_profile(&self, name: &str, keep_files: bool) -> Result<OperationReport> {
        self.driver.delete(name, keep_files)
    }

    /// `Conflict` while another rebuild is in progress.
    pub fn rebuild(&self, emit: &mut dyn FnMut(RebuildEvent)) -> Result<RebuildSummary> {
        self.driver.rebuild_and_recreate_all(emit)
    }

    pub fn browse(&self, user_path: &str) -> Result<DirectoryListing> {
        browser::list_directory(&self.fleet.host_mount_root, user_path)
    }
}
