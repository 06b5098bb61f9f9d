//! Multi-step lifecycle transitions against the container runtime.
//!
//! Every operation on a profile holds that profile's lock from first to last
//! step. Teardown treats "not found" as done; `delete` and the rebuild collect
//! per-step outcomes instead of stopping at the first failure.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use gsync_core::{FleetConfig, FleetError, Result};
use gsync_runtime::{ApplyMode, ComposeTool, ContainerRuntime};

use crate::profile::validate_profile_name_for;

pub mod locks;
pub mod progress;
mod rebuild;

pub use locks::{ProfileGuard, ProfileLocks, REBUILD_KEY};
pub use progress::{ProgressFrame, RebuildEvent};
pub use rebuild::RebuildSummary;

/// Grace period given to a container before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Partial,
    Failed,
}

/// Outcome of a multi-step operation, one message per step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub status: ReportStatus,
    pub success: Vec<String>,
    pub errors: Vec<String>,
}

impl OperationReport {
    pub fn new() -> Self {
        Self {
            status: ReportStatus::Success,
            success: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn succeeded(&mut self, message: impl Into<String>) {
        self.success.push(message.into());
        self.refresh();
    }

    pub fn failed(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.refresh();
    }

    fn refresh(&mut self) {
        self.status = match (self.success.is_empty(), self.errors.is_empty()) {
            (_, true) => ReportStatus::Success,
            (false, false) => ReportStatus::Partial,
            (true, false) => ReportStatus::Failed,
        };
    }
}

impl Default for OperationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to a container on stop+remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Removed,
    Absent,
}

pub struct LifecycleDriver {
    fleet: Arc<FleetConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    compose: Arc<dyn ComposeTool>,
    locks: ProfileLocks,
}

impl LifecycleDriver {
    pub fn new(
        fleet: Arc<FleetConfig>,
        runtime: Arc<dyn ContainerRuntime>,
        compose: Arc<dyn ComposeTool>,
    ) -> Self {
        Self {
            fleet,
            runtime,
            compose,
            locks: ProfileLocks::new(),
        }
    }

    pub fn locks(&self) -> &ProfileLocks {
        &self.locks
    }

    /// Stop then remove `container`. Absence at either step counts as done.
    pub(crate) fn stop_and_remove(&self, container: &str) -> Result<Teardown> {
        match self.runtime.stop(container, STOP_GRACE) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(Teardown::Absent),
            Err(e) => return Err(e),
        }
        match self.runtime.remove(container, true) {
            Ok(()) => Ok(Teardown::Removed),
            Err(e) if e.is_not_found() => Ok(Teardown::Absent),
            Err(e) => Err(e),
        }
    }

    /// Bring the profile up from its manifest, rebuilding the image if its
    /// definition changed.
    pub fn start(&self, profile: &str) -> Result<String> {
        validate_profile_name_for(&self.fleet, profile)?;
        let _guard = self.locks.acquire(profile);

        let manifest = self.fleet.manifest_path(profile);
        if !manifest.is_file() {
            return Err(FleetError::ManifestMissing(profile.to_string()));
        }
        info!(profile = %profile, "starting profile");
        self.compose.up(&manifest, ApplyMode::Build)
    }

    /// Stop and remove the profile's container. Idempotent.
    pub fn stop(&self, profile: &str) -> Result<String> {
        validate_profile_name_for(&self.fleet, profile)?;
        let _guard = self.locks.acquire(profile);

        let container = self.fleet.container_name(profile);
        info!(profile = %profile, container = %container, "stopping profile");
        Ok(match self.stop_and_remove(&container)? {
            Teardown::Removed => format!("Container {container} stopped and removed"),
            Teardown::Absent => format!("Container {container} was not running"),
        })
    }

    /// Replace the profile's container with one built from the current
    /// manifest, leaving every other service alone.
    pub fn recreate(&self, profile: &str) -> Result<String> {
        validate_profile_name_for(&self.fleet, profile)?;
        let _guard = self.locks.acquire(profile);

        let manifest = self.fleet.manifest_path(profile);
        if !manifest.is_file() {
            return Err(FleetError::ManifestMissing(profile.to_string()));
        }
        let container = self.fleet.container_name(profile);
        info!(profile = %profile, container = %container, "recreating profile");
        self.stop_and_remove(&container)?;
        self.compose.up(&manifest, ApplyMode::NoRecreate)
    }

    /// Remove the container and, unless `keep_files`, the manifest and the
    /// working directory. Each step is attempted regardless of the others.
    pub fn delete(&self, profile: &str, keep_files: bool) -> Result<OperationReport> {
        validate_profile_name_for(&self.fleet, profile)?;
        let _guard = self.locks.acquire(profile);

        let container = self.fleet.container_name(profile);
        let manifest = self.fleet.manifest_path(profile);
        let dir = self.fleet.profile_dir(profile);
        let mut report = OperationReport::new();
        let mut found = false;

        match self.stop_and_remove(&container) {
            Ok(Teardown::Removed) => {
                found = true;
                report.succeeded(format!("Container {container} stopped and removed"));
            }
            Ok(Teardown::Absent) => {
                report.succeeded(format!("Container {container} was not present"));
            }
            Err(e) => {
                found = true;
                report.failed(format!("Failed to remove container {container}: {e}"));
            }
        }

        if !keep_files {
            match fs::remove_file(&manifest) {
                Ok(()) => {
                    found = true;
                    report.succeeded(format!("Removed manifest {}", manifest.display()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    found = true;
                    report.failed(format!("Failed to remove manifest {}: {e}", manifest.display()));
                }
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    found = true;
                    report.succeeded(format!("Removed profile directory {}", dir.display()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    found = true;
                    report.failed(format!(
                        "Failed to remove profile directory {}: {e}",
                        dir.display()
                    ));
                }
            }
        } else {
            found = found || dir.exists() || manifest.exists();
        }

        if !found {
            return Err(FleetError::NotFound(format!("profile '{profile}'")));
        }
        if report.errors.is_empty() {
            info!(profile = %profile, keep_files, "profile deleted");
        } else {
            warn!(profile = %profile, errors = report.errors.len(), "profile partially deleted");
        }
        Ok(report)
    }

    /// Run `op` on a container, holding the owning profile's lock when the
    /// name maps to one.
    pub fn with_container_lock<T>(
        &self,
        container: &str,
        op: impl FnOnce(&dyn ContainerRuntime) -> Result<T>,
    ) -> Result<T> {
        let details = self.runtime.inspect(container)?;
        let _guard = self
            .fleet
            .profile_from_container(&details.name)
            .map(|profile| self.locks.acquire(profile));
        op(self.runtime.as_ref())
    }
}
