//! Directory browsing confined to the host mount root.
//!
//! Callers see logical paths rooted at `/`; the real mount root never leaves
//! this module.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use gsync_core::{FleetError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    pub unreadable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    pub path: String,
    pub parent: Option<String>,
    pub entries: Vec<DirectoryEntry>,
    pub files_count: usize,
}

/// Components of `user_path` after resolving `.` and `..` lexically. `..`
/// never climbs above the root.
pub fn normalize_logical(user_path: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    for segment in user_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other.to_string()),
        }
    }
    parts
}

fn logical_path(parts: &[String]) -> String {
    format!("/{}", parts.join("/"))
}

fn permission_denied(e: &std::io::Error) -> bool {
    e.kind() == IoErrorKind::PermissionDenied
}

/// Subdirectories of `user_path` under `mount_root`, sorted by name, plus
/// the number of plain files. Unreadable subdirectories are kept and flagged.
pub fn list_directory(mount_root: &Path, user_path: &str) -> Result<DirectoryListing> {
    let root = fs::canonicalize(mount_root).map_err(|e| {
        FleetError::NotFound(format!("mount root {}: {e}", mount_root.display()))
    })?;
    let parts = normalize_logical(user_path);
    let logical = logical_path(&parts);

    let mapped: PathBuf = parts.iter().fold(root.clone(), |acc, p| acc.join(p));
    let real = match fs::canonicalize(&mapped) {
        Ok(real) => real,
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            return Err(FleetError::NotFound(format!("directory '{logical}'")))
        }
        Err(e) => return Err(e.into()),
    };
    // a symlink inside the tree may still point out of it
    if !real.starts_with(&root) {
        return Err(FleetError::NotFound(format!("directory '{logical}'")));
    }
    if !real.is_dir() {
        return Err(FleetError::Validation(format!("'{logical}' is not a directory")));
    }

    let mut entries = Vec::new();
    let mut files_count = 0;
    for entry in fs::read_dir(&real)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %logical, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let entry_path = entry.path();

        let metadata = match fs::metadata(&entry_path) {
            Ok(metadata) => metadata,
            Err(e) if permission_denied(&e) => {
                entries.push(DirectoryEntry {
                    path: logical_path(&[parts.clone(), vec![name.clone()]].concat()),
                    name,
                    unreadable: true,
                });
                continue;
            }
            // dangling symlink and the like
            Err(_) => continue,
        };
        if !metadata.is_dir() {
            files_count += 1;
            continue;
        }

        match fs::canonicalize(&entry_path) {
            Ok(target) if target.starts_with(&root) => {}
            Ok(_) => continue,
            Err(e) if permission_denied(&e) => {}
            Err(_) => continue,
        }

        let unreadable = matches!(fs::read_dir(&entry_path), Err(ref e) if permission_denied(e));
        entries.push(DirectoryEntry {
            path: logical_path(&[parts.clone(), vec![name.clone()]].concat()),
            name,
            unreadable,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let parent = (!parts.is_empty()).then(|| logical_path(&parts[..parts.len() - 1]));

    Ok(DirectoryListing {
        path: logical,
        parent,
        entries,
        files_count,
    })
}
