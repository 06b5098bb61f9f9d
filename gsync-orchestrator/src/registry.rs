//! Profiles on disk cross-referenced with containers in the runtime.
//!
//! Nothing here is cached: every call re-reads the workspace and re-queries
//! the runtime.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use gsync_core::{FleetConfig, Result};
use gsync_runtime::{ContainerDetails, ContainerRuntime, ContainerSummary};

use crate::manifest::config_from_env;
use crate::profile::ProfileConfig;
use crate::schedule::{self, NextRun};
use crate::status::{infer_sync_status, LogMatcher, SyncStatus};
use crate::store;

/// Profile name reported for containers whose name does not map to one.
pub const UNMANAGED_PROFILE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub has_compose: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerObservation {
    pub id: String,
    pub name: String,
    pub profile: String,
    pub display_name: String,
    pub status: String,
    pub state: String,
    pub running: bool,
    pub created: String,
    #[serde(flatten)]
    pub config: ProfileConfig,
    pub next_run: String,
    pub time_until: String,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

/// Every profile on disk, ordered by display name.
pub fn list_profiles(fleet: &FleetConfig) -> Result<Vec<ProfileSummary>> {
    let mut profiles: Vec<ProfileSummary> = store::profile_names(fleet)?
        .into_iter()
        .map(|name| {
            let meta = store::load_metadata(fleet, &name);
            ProfileSummary {
                has_compose: fleet.manifest_path(&name).is_file(),
                name,
                display_name: meta.display_name,
                created_at: meta.created_at,
            }
        })
        .collect();
    profiles.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.name.cmp(&b.name)));
    Ok(profiles)
}

/// Drop every profile whose container name is in `running`. Order is kept.
pub fn available_profiles(
    fleet: &FleetConfig,
    profiles: Vec<ProfileSummary>,
    running: &HashSet<String>,
) -> Vec<ProfileSummary> {
    profiles
        .into_iter()
        .filter(|p| !running.contains(&fleet.container_name(&p.name)))
        .collect()
}

/// Profiles on disk without a running container.
pub fn list_available(fleet: &FleetConfig, runtime: &dyn ContainerRuntime) -> Result<Vec<ProfileSummary>> {
    let profiles = list_profiles(fleet)?;
    let running: HashSet<String> = runtime
        .list_containers(&fleet.container_prefix, false)?
        .into_iter()
        .filter(ContainerSummary::is_running)
        .map(|c| c.name)
        .collect();
    Ok(available_profiles(fleet, profiles, &running))
}

/// Next-run prediction for an observed config.
pub fn next_run_for(config: &ProfileConfig, now: DateTime<Utc>) -> NextRun {
    if !config.enable_cron {
        NextRun::Disabled
    } else if config.cron_schedule.is_empty() {
        NextRun::Unavailable
    } else {
        schedule::predict(&config.cron_schedule, &config.timezone, now)
    }
}

/// Project a container into an observation. A container that vanished
/// between listing and inspection is reported from its listing alone.
pub fn observe(
    fleet: &FleetConfig,
    runtime: &dyn ContainerRuntime,
    matcher: &dyn LogMatcher,
    summary: &ContainerSummary,
    now: DateTime<Utc>,
) -> ContainerObservation {
    let details = match runtime.inspect(&summary.id) {
        Ok(details) => details,
        Err(e) => {
            debug!(container = %summary.name, error = %e, "inspect failed, using listing");
            ContainerDetails {
                id: summary.id.clone(),
                name: summary.name.clone(),
                state: summary.state.clone(),
                running: summary.is_running(),
                created: summary.created.clone(),
                image: String::new(),
                env: Vec::new(),
                command: Vec::new(),
            }
        }
    };

    let profile = fleet
        .profile_from_container(&details.name)
        .unwrap_or(UNMANAGED_PROFILE)
        .to_string();
    let meta = (profile != UNMANAGED_PROFILE).then(|| store::load_metadata(fleet, &profile));

    let mut config = config_from_env(fleet, &details.env_map(), &details.command);
    if let Some(meta) = &meta {
        config.photo_dir = meta.photo_dir.clone();
    }

    let next = next_run_for(&config, now);
    let logs = if details.running {
        runtime.logs_tail(&details.name, fleet.log_tail_lines).ok()
    } else {
        None
    };
    let sync_status = infer_sync_status(details.running, logs.as_deref(), matcher);

    ContainerObservation {
        id: details.id.chars().take(12).collect(),
        name: details.name,
        display_name: meta.map(|m| m.display_name).unwrap_or_else(|| profile.clone()),
        profile,
        status: summary.status.clone(),
        state: details.state,
        running: details.running,
        created: details.created,
        config,
        next_run: next.next_run_display(),
        time_until: next.time_until_display(),
        sync_status,
    }
}

/// Every container under the managed prefix, running or not.
pub fn list_running(
    fleet: &FleetConfig,
    runtime: &dyn ContainerRuntime,
    matcher: &dyn LogMatcher,
) -> Result<Vec<ContainerObservation>> {
    let now = Utc::now();
    let containers = runtime.list_containers(&fleet.container_prefix, true)?;
    Ok(containers
        .iter()
        .map(|summary| observe(fleet, runtime, matcher, summary, now))
        .collect())
}

pub fn container_stats(fleet: &FleetConfig, runtime: &dyn ContainerRuntime) -> Result<ContainerStats> {
    let containers = runtime.list_containers(&fleet.container_prefix, true)?;
    let running = containers.iter().filter(|c| c.is_running()).count();
    Ok(ContainerStats {
        total: containers.len(),
        running,
        stopped: containers.len() - running,
    })
}
