//! On-disk profile store: working directories and their metadata sidecars.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gsync_core::{FleetConfig, FleetError, Result};

use crate::profile::validate_profile_name_for;

pub const METADATA_FILE: &str = "profile.json";

/// Sidecar record stored as `<profile_dir>/profile.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub photo_dir: String,
}

impl ProfileMetadata {
    pub fn new(name: &str, display_name: Option<&str>) -> Self {
        let display_name = display_name
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(name);
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            created_at: Utc::now(),
            photo_dir: String::new(),
        }
    }
}

pub fn metadata_path(fleet: &FleetConfig, name: &str) -> PathBuf {
    fleet.profile_dir(name).join(METADATA_FILE)
}

/// Write `contents` next to `target` and rename it into place, so readers see
/// either the old file or the new one.
pub(crate) fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        FleetError::Validation(format!("'{}' has no parent directory", target.display()))
    })?;

    let temp_file = tempfile::Builder::new()
        .prefix(".gsync-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp_file.as_file().write_all(contents)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Read the sidecar, or `None` when the profile has none.
pub fn read_metadata(fleet: &FleetConfig, name: &str) -> Result<Option<ProfileMetadata>> {
    let path = metadata_path(fleet, name);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Sidecar for `name`, synthesised with `display_name = name` when absent or unreadable.
pub fn load_metadata(fleet: &FleetConfig, name: &str) -> ProfileMetadata {
    match read_metadata(fleet, name) {
        Ok(Some(meta)) => meta,
        Ok(None) => fallback_metadata(fleet, name),
        Err(e) => {
            warn!(profile = %name, error = %e, "unreadable profile metadata, using defaults");
            fallback_metadata(fleet, name)
        }
    }
}

fn fallback_metadata(fleet: &FleetConfig, name: &str) -> ProfileMetadata {
    let created_at = fs::metadata(fleet.profile_dir(name))
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    ProfileMetadata {
        created_at,
        ..ProfileMetadata::new(name, None)
    }
}

pub fn save_metadata(fleet: &FleetConfig, meta: &ProfileMetadata) -> Result<()> {
    let dir = fleet.profile_dir(&meta.name);
    fs::create_dir_all(&dir)?;
    let body = serde_json::to_string_pretty(meta)?;
    write_atomic(&dir.join(METADATA_FILE), body.as_bytes())
}

pub fn profile_exists(fleet: &FleetConfig, name: &str) -> bool {
    fleet.profile_dir(name).is_dir() || fleet.manifest_path(name).is_file()
}

/// Create the working directory, default photo directory and sidecar for `name`.
pub fn create_profile(
    fleet: &FleetConfig,
    name: &str,
    display_name: Option<&str>,
) -> Result<ProfileMetadata> {
    validate_profile_name_for(fleet, name)?;
    let dir = fleet.profile_dir(name);
    if dir.exists() {
        return Err(FleetError::Conflict(format!("profile '{name}'")));
    }

    fs::create_dir_all(&fleet.workspace_root)?;
    // create_dir (not _all) so a concurrent create of the same name loses cleanly
    fs::create_dir(&dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => FleetError::Conflict(format!("profile '{name}'")),
        _ => e.into(),
    })?;
    let photos = fleet.default_photo_dir(name);
    fs::create_dir_all(&photos)?;

    for path in [&dir, &photos] {
        hand_over(path, fleet.default_puid, fleet.default_pgid);
    }

    let meta = ProfileMetadata::new(name, display_name);
    save_metadata(fleet, &meta)?;
    info!(profile = %name, display_name = %meta.display_name, "profile created");
    Ok(meta)
}

/// Change only the display name of an existing profile.
pub fn rename_profile(fleet: &FleetConfig, name: &str, display_name: &str) -> Result<ProfileMetadata> {
    validate_profile_name_for(fleet, name)?;
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(FleetError::Validation("display name must not be empty".into()));
    }
    if !profile_exists(fleet, name) {
        return Err(FleetError::NotFound(format!("profile '{name}'")));
    }

    let mut meta = load_metadata(fleet, name);
    meta.display_name = display_name.to_string();
    save_metadata(fleet, &meta)?;
    Ok(meta)
}

/// Record the resolved photo directory after a manifest write.
pub fn record_photo_dir(fleet: &FleetConfig, name: &str, photo_dir: &str) -> Result<()> {
    let mut meta = load_metadata(fleet, name);
    if meta.photo_dir == photo_dir && metadata_path(fleet, name).is_file() {
        return Ok(());
    }
    meta.photo_dir = photo_dir.to_string();
    save_metadata(fleet, &meta)
}

/// Names of every profile on disk: subdirectories with a valid name that hold
/// a sidecar or have a manifest. Sorted by name.
pub fn profile_names(fleet: &FleetConfig) -> Result<Vec<String>> {
    let entries = match fs::read_dir(&fleet.workspace_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if validate_profile_name_for(fleet, &name).is_err() {
            continue;
        }
        if entry.path().join(METADATA_FILE).is_file() || fleet.manifest_path(&name).is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(unix)]
fn hand_over(path: &Path, uid: u32, gid: u32) {
    if let Err(e) = std::os::unix::fs::chown(path, Some(uid), Some(gid)) {
        debug!(path = %path.display(), uid, gid, error = %e, "could not change ownership");
    }
}

#[cfg(not(unix))]
fn hand_over(_path: &Path, _uid: u32, _gid: u32) {}
