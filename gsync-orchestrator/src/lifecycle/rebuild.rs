//! Rebuild the worker image from scratch and recreate every profile on it.

use serde::Serialize;
use tracing::{error, info, warn};

use gsync_core::{FleetError, Result};
use gsync_runtime::ApplyMode;

use super::{LifecycleDriver, RebuildEvent, Teardown, REBUILD_KEY};
use crate::profile::validate_profile_name_for;

/// Counts reported by the final `complete` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub total: usize,
    pub recreated: usize,
    pub errors: usize,
    /// The build failed and no container was touched.
    pub aborted: bool,
}

/// Repository part of an image reference (`gphotos-sync:latest` -> `gphotos-sync`).
fn repository_of(image: &str) -> &str {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => repo,
        _ => image,
    }
}

impl LifecycleDriver {
    /// Remove old images, build without cache, then recreate profiles one at
    /// a time. Progress is delivered to `emit` as it happens; `emit` may
    /// discard events, the pipeline runs to completion either way.
    ///
    /// Fails with `Conflict`, before emitting anything, while another rebuild
    /// holds the fleet-wide key.
    pub fn rebuild_and_recreate_all(
        &self,
        emit: &mut dyn FnMut(RebuildEvent),
    ) -> Result<RebuildSummary> {
        let Some(_rebuild) = self.locks.try_acquire(REBUILD_KEY) else {
            return Err(FleetError::Conflict("a rebuild is already running".into()));
        };
        let mut summary = RebuildSummary::default();

        self.purge_images(emit);

        if let Err(e) = self.build_image(emit) {
            error!(error = %e, "image build failed, rebuild aborted");
            emit(RebuildEvent::error(format!("Image build failed: {e}")));
            summary.aborted = true;
            return Ok(summary);
        }

        emit(RebuildEvent::status("Looking for profile containers..."));
        let prefix = format!("{}-", self.fleet.container_prefix);
        let containers = match self.runtime.list_containers(&prefix, true) {
            Ok(containers) => containers,
            Err(e) => {
                emit(RebuildEvent::error(format!("Could not list containers: {e}")));
                summary.errors = 1;
                emit(complete(&summary));
                return Ok(summary);
            }
        };

        let mut profiles: Vec<String> = Vec::new();
        for container in &containers {
            match self.fleet.profile_from_container(&container.name) {
                Some(profile) if validate_profile_name_for(&self.fleet, profile).is_ok() => {
                    profiles.push(profile.to_string())
                }
                _ => emit(RebuildEvent::warning(format!(
                    "Skipping unmanaged container {}",
                    container.name
                ))),
            }
        }
        profiles.sort();
        profiles.dedup();

        if profiles.is_empty() {
            emit(complete(&summary));
            return Ok(summary);
        }

        summary.total = profiles.len();
        for (index, profile) in profiles.iter().enumerate() {
            emit(RebuildEvent::status(format!(
                "Recreating {profile} ({}/{})",
                index + 1,
                summary.total
            )));
            match self.recreate_on_new_image(profile, emit) {
                Ok(()) => {
                    summary.recreated += 1;
                    emit(RebuildEvent::log(format!("Profile {profile} recreated")));
                }
                Err(e) => {
                    summary.errors += 1;
                    warn!(profile = %profile, error = %e, "recreate after rebuild failed");
                    emit(RebuildEvent::error(format!("Failed to recreate {profile}: {e}")));
                }
            }
        }

        info!(
            total = summary.total,
            recreated = summary.recreated,
            errors = summary.errors,
            "rebuild finished"
        );
        emit(complete(&summary));
        Ok(summary)
    }

    fn purge_images(&self, emit: &mut dyn FnMut(RebuildEvent)) {
        let repository = repository_of(&self.fleet.image);
        emit(RebuildEvent::status(format!("Removing existing {repository} images...")));

        match self.runtime.list_images(repository) {
            Ok(images) => {
                for image in images {
                    let reference = image.reference();
                    match self.runtime.remove_image(&reference, true) {
                        Ok(()) => emit(RebuildEvent::log(format!("Removed image {reference}"))),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => emit(RebuildEvent::warning(format!(
                            "Could not remove image {reference}: {e}"
                        ))),
                    }
                }
            }
            Err(e) => emit(RebuildEvent::warning(format!("Could not list images: {e}"))),
        }

        emit(RebuildEvent::status("Pruning dangling images..."));
        match self.runtime.prune_dangling_images() {
            Ok(output) => {
                for line in output.lines().filter(|l| !l.trim().is_empty()) {
                    emit(RebuildEvent::log(line));
                }
            }
            Err(e) => emit(RebuildEvent::warning(format!("Prune failed: {e}"))),
        }
    }

    fn build_image(&self, emit: &mut dyn FnMut(RebuildEvent)) -> Result<()> {
        emit(RebuildEvent::status(format!(
            "Building {} without cache...",
            self.fleet.image
        )));
        self.runtime.build_image(
            &self.fleet.build_context,
            &self.fleet.image,
            true,
            &mut |line: &str| emit(RebuildEvent::log(line)),
        )?;
        emit(RebuildEvent::status("Image built"));
        Ok(())
    }

    fn recreate_on_new_image(&self, profile: &str, emit: &mut dyn FnMut(RebuildEvent)) -> Result<()> {
        let _guard = self.locks.acquire(profile);
        let container = self.fleet.container_name(profile);
        let manifest = self.fleet.manifest_path(profile);
        if !manifest.is_file() {
            return Err(FleetError::ManifestMissing(profile.to_string()));
        }

        if self.stop_and_remove(&container)? == Teardown::Removed {
            emit(RebuildEvent::log(format!("Removed container {container}")));
        }

        match self.runtime.remove_image(&container, true) {
            Ok(()) => emit(RebuildEvent::log(format!("Removed image {container}"))),
            Err(e) if e.is_not_found() => {}
            Err(e) => emit(RebuildEvent::warning(format!(
                "Could not remove image {container}: {e}"
            ))),
        }

        let output = self.compose.up(&manifest, ApplyMode::NoPull)?;
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            emit(RebuildEvent::log(line));
        }
        Ok(())
    }
}

fn complete(summary: &RebuildSummary) -> RebuildEvent {
    let message = if summary.total == 0 {
        "Image rebuilt; no profile containers to recreate".to_string()
    } else {
        format!(
            "Recreated {} of {} profiles ({} errors)",
            summary.recreated, summary.total, summary.errors
        )
    };
    RebuildEvent::Complete {
        message,
        total: summary.total,
        recreated: summary.recreated,
        errors: summary.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_of() {
        assert_eq!(repository_of("gphotos-sync:latest"), "gphotos-sync");
        assert_eq!(repository_of("gphotos-sync"), "gphotos-sync");
        assert_eq!(repository_of("localhost:5000/gphotos-sync"), "localhost:5000/gphotos-sync");
        assert_eq!(repository_of("localhost:5000/gphotos-sync:v2"), "localhost:5000/gphotos-sync");
    }
}
