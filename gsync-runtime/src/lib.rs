//! The two external collaborators the orchestrator drives: a container runtime
//! (list, inspect, start/stop/remove, images, logs) and a declarative apply tool
//! scoped to one manifest file.
//!
//! Both are blocking traits. [`docker`] implements them on top of the Docker CLI;
//! the `test-helpers` feature adds in-memory doubles in [`mock`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gsync_core::Result;

pub mod docker;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use docker::{DockerCompose, DockerRuntime};

/// One row of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    /// Human status as reported by the runtime ("Up 3 hours", "Exited (0) 2 days ago").
    pub status: String,
    /// Machine state ("running", "exited", "created", ...).
    pub state: String,
    pub created: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Full view of a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub state: String,
    pub running: bool,
    pub created: String,
    pub image: String,
    pub env: Vec<String>,
    pub command: Vec<String>,
}

impl ContainerDetails {
    /// `KEY=value` entries split into a map. Entries without `=` are dropped.
    pub fn env_map(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub repository: String,
    pub tag: String,
}

impl ImageSummary {
    /// `repository:tag`, or the image id for untagged images.
    pub fn reference(&self) -> String {
        if self.repository.is_empty() || self.repository == "<none>" {
            self.id.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }
}

/// Imperative container runtime operations.
///
/// Absent containers and images surface as `FleetError::NotFound` so callers can
/// treat teardown of something already gone as success.
pub trait ContainerRuntime: Send + Sync {
    fn list_containers(&self, name_prefix: &str, include_stopped: bool)
        -> Result<Vec<ContainerSummary>>;

    fn inspect(&self, name_or_id: &str) -> Result<ContainerDetails>;

    fn start(&self, name_or_id: &str) -> Result<()>;

    fn restart(&self, name_or_id: &str) -> Result<()>;

    fn stop(&self, name_or_id: &str, timeout: Duration) -> Result<()>;

    fn remove(&self, name_or_id: &str, force: bool) -> Result<()>;

    /// Build `tag` from `context`, handing each output line to `on_line` as it arrives.
    fn build_image(
        &self,
        context: &Path,
        tag: &str,
        no_cache: bool,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<()>;

    /// Images whose repository contains `name_fragment`.
    fn list_images(&self, name_fragment: &str) -> Result<Vec<ImageSummary>>;

    fn remove_image(&self, reference: &str, force: bool) -> Result<()>;

    /// Remove dangling images, returning the runtime's summary text.
    fn prune_dangling_images(&self) -> Result<String>;

    /// The last `lines` lines of output, timestamped.
    fn logs_tail(&self, name_or_id: &str, lines: usize) -> Result<String>;

    /// Follow the log stream. Returns when the stream ends or `on_line` returns `false`.
    fn follow_logs(&self, name_or_id: &str, on_line: &mut dyn FnMut(&str) -> bool) -> Result<()>;
}

/// How a declarative apply treats existing containers and images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Rebuild the image when its definition changed.
    Build,
    /// Leave containers whose definition is unchanged alone.
    NoRecreate,
    /// Never pull; use the local image.
    NoPull,
}

impl ApplyMode {
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            ApplyMode::Build => &["--build"],
            ApplyMode::NoRecreate => &["--no-recreate"],
            ApplyMode::NoPull => &["--pull", "never"],
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyMode::Build => "build",
            ApplyMode::NoRecreate => "no-recreate",
            ApplyMode::NoPull => "no-pull",
        };
        f.write_str(name)
    }
}

/// Declarative apply scoped to a single manifest file.
pub trait ComposeTool: Send + Sync {
    /// Bring the manifest's services up in the background. Returns captured output.
    fn up(&self, manifest: &Path, mode: ApplyMode) -> Result<String>;

    fn down(&self, manifest: &Path) -> Result<String>;
}
