//! In-memory runtime and compose doubles.
//!
//! Every call is appended to a call log (`"stop:gphotos-sync-alpha"`), and any
//! call can be made to fail with [`MockRuntime::fail`] keyed by the same
//! `"op:target"` string.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use gsync_core::{FleetError, Result};

use crate::{ApplyMode, ComposeTool, ContainerDetails, ContainerRuntime, ContainerSummary, ImageSummary};

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub env: Vec<String>,
    pub command: Vec<String>,
    pub created: String,
}

impl MockContainer {
    pub fn new(name: &str, running: bool) -> Self {
        Self {
            id: format!("{:0<64}", name.bytes().map(|b| format!("{b:02x}")).collect::<String>())
                .chars()
                .take(64)
                .collect(),
            name: name.to_string(),
            running,
            env: Vec::new(),
            command: Vec::new(),
            created: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    pub fn with_env(mut self, env: &[&str]) -> Self {
        self.env = env.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_command(mut self, command: &[&str]) -> Self {
        self.command = command.iter().map(|c| c.to_string()).collect();
        self
    }

    fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: if self.running { "Up 1 hour" } else { "Exited (0) 1 hour ago" }.to_string(),
            state: if self.running { "running" } else { "exited" }.to_string(),
            created: self.created.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Runtime(String),
    Timeout,
}

#[derive(Debug, Default)]
struct MockState {
    containers: BTreeMap<String, MockContainer>,
    images: Vec<ImageSummary>,
    logs: HashMap<String, String>,
    build_output: Vec<String>,
    failures: HashMap<String, Failure>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_container(&self, container: MockContainer) {
        self.state()
            .containers
            .insert(container.name.clone(), container);
    }

    pub fn add_image(&self, repository: &str, tag: &str) {
        let mut state = self.state();
        let id = format!("sha256:{:04}", state.images.len());
        state.images.push(ImageSummary {
            id,
            repository: repository.to_string(),
            tag: tag.to_string(),
        });
    }

    pub fn set_logs(&self, name: &str, logs: &str) {
        self.state().logs.insert(name.to_string(), logs.to_string());
    }

    pub fn set_build_output(&self, lines: &[&str]) {
        self.state().build_output = lines.iter().map(|l| l.to_string()).collect();
    }

    /// Make `op:target` fail with a runtime error carrying `message`.
    pub fn fail(&self, call: &str, message: &str) {
        self.state()
            .failures
            .insert(call.to_string(), Failure::Runtime(message.to_string()));
    }

    /// Make `op:target` fail with a timeout.
    pub fn fail_with_timeout(&self, call: &str) {
        self.state().failures.insert(call.to_string(), Failure::Timeout);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        self.state().containers.get(name).cloned()
    }

    pub fn image_references(&self) -> Vec<String> {
        self.state().images.iter().map(ImageSummary::reference).collect()
    }

    /// Record `call` and return the configured failure for it, if any.
    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state();
        let failure = state.failures.get(&call).cloned();
        state.calls.push(call.clone());
        match failure {
            None => Ok(()),
            Some(Failure::Runtime(message)) => Err(FleetError::runtime(call, message)),
            Some(Failure::Timeout) => Err(FleetError::Timeout {
                command: call,
                after: Duration::from_secs(30),
            }),
        }
    }

    fn find_key(state: &MockState, name_or_id: &str) -> Option<String> {
        state
            .containers
            .values()
            .find(|c| c.name == name_or_id || c.id.starts_with(name_or_id))
            .map(|c| c.name.clone())
    }

    fn with_container<T>(
        &self,
        name_or_id: &str,
        f: impl FnOnce(&mut MockState, String) -> T,
    ) -> Result<T> {
        let mut state = self.state();
        let key = Self::find_key(&state, name_or_id)
            .ok_or_else(|| FleetError::NotFound(format!("No such container: {name_or_id}")))?;
        Ok(f(&mut state, key))
    }
}

impl ContainerRuntime for MockRuntime {
    fn list_containers(
        &self,
        name_prefix: &str,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>> {
        self.record(format!("list:{name_prefix}"))?;
        Ok(self
            .state()
            .containers
            .values()
            .filter(|c| c.name.starts_with(name_prefix))
            .filter(|c| include_stopped || c.running)
            .map(MockContainer::summary)
            .collect())
    }

    fn inspect(&self, name_or_id: &str) -> Result<ContainerDetails> {
        self.record(format!("inspect:{name_or_id}"))?;
        self.with_container(name_or_id, |state, key| {
            let c = &state.containers[&key];
            ContainerDetails {
                id: c.id.clone(),
                name: c.name.clone(),
                state: if c.running { "running" } else { "exited" }.to_string(),
                running: c.running,
                created: c.created.clone(),
                image: "gphotos-sync:latest".to_string(),
                env: c.env.clone(),
                command: c.command.clone(),
            }
        })
    }

    fn start(&self, name_or_id: &str) -> Result<()> {
        self.record(format!("start:{name_or_id}"))?;
        self.with_container(name_or_id, |state, key| {
            if let Some(c) = state.containers.get_mut(&key) {
                c.running = true;
            }
        })
    }

    fn restart(&self, name_or_id: &str) -> Result<()> {
        self.record(format!("restart:{name_or_id}"))?;
        self.with_container(name_or_id, |state, key| {
            if let Some(c) = state.containers.get_mut(&key) {
                c.running = true;
            }
        })
    }

    fn stop(&self, name_or_id: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("stop:{name_or_id}"))?;
        self.with_container(name_or_id, |state, key| {
            if let Some(c) = state.containers.get_mut(&key) {
                c.running = false;
            }
        })
    }

    fn remove(&self, name_or_id: &str, _force: bool) -> Result<()> {
        self.record(format!("remove:{name_or_id}"))?;
        self.with_container(name_or_id, |state, key| {
            state.containers.remove(&key);
        })
    }

    fn build_image(
        &self,
        _context: &Path,
        tag: &str,
        _no_cache: bool,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let lines = self.state().build_output.clone();
        for line in &lines {
            on_line(line);
        }
        self.record(format!("build:{tag}"))?;
        let (repository, image_tag) = tag.split_once(':').unwrap_or((tag, "latest"));
        self.add_image(repository, image_tag);
        Ok(())
    }

    fn list_images(&self, name_fragment: &str) -> Result<Vec<ImageSummary>> {
        self.record(format!("images:{name_fragment}"))?;
        Ok(self
            .state()
            .images
            .iter()
            .filter(|image| image.repository.contains(name_fragment))
            .cloned()
            .collect())
    }

    fn remove_image(&self, reference: &str, _force: bool) -> Result<()> {
        self.record(format!("rmi:{reference}"))?;
        let mut state = self.state();
        let before = state.images.len();
        state
            .images
            .retain(|image| image.reference() != reference && image.repository != reference);
        if state.images.len() == before {
            return Err(FleetError::NotFound(format!("No such image: {reference}")));
        }
        Ok(())
    }

    fn prune_dangling_images(&self) -> Result<String> {
        self.record("prune:images".to_string())?;
        let mut state = self.state();
        let before = state.images.len();
        state.images.retain(|image| image.repository != "<none>");
        Ok(format!(
            "Total reclaimed space: {} images",
            before - state.images.len()
        ))
    }

    fn logs_tail(&self, name_or_id: &str, lines: usize) -> Result<String> {
        self.record(format!("logs:{name_or_id}"))?;
        let key = Self::find_key(&self.state(), name_or_id)
            .ok_or_else(|| FleetError::NotFound(format!("No such container: {name_or_id}")))?;
        let logs = self.state().logs.get(&key).cloned().unwrap_or_default();
        let all: Vec<&str> = logs.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].join("\n"))
    }

    fn follow_logs(&self, name_or_id: &str, on_line: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        let logs = self.logs_tail(name_or_id, usize::MAX)?;
        for line in logs.lines() {
            if !on_line(line) {
                break;
            }
        }
        Ok(())
    }
}

/// Compose double that materialises a running container in the paired
/// [`MockRuntime`] on `up`, named after the manifest's profile.
#[derive(Debug)]
pub struct MockCompose {
    runtime: Arc<MockRuntime>,
    container_prefix: String,
}

impl MockCompose {
    pub fn new(runtime: Arc<MockRuntime>, container_prefix: &str) -> Self {
        Self {
            runtime,
            container_prefix: container_prefix.to_string(),
        }
    }

    fn profile_of(manifest: &Path) -> String {
        manifest
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("docker-compose."))
            .and_then(|n| n.strip_suffix(".yml"))
            .unwrap_or("unknown")
            .to_string()
    }
}

impl ComposeTool for MockCompose {
    fn up(&self, manifest: &Path, mode: ApplyMode) -> Result<String> {
        let profile = Self::profile_of(manifest);
        self.runtime.record(format!("up:{profile}:{mode}"))?;
        let name = format!("{}-{}", self.container_prefix, profile);
        let exists = self.runtime.container(&name).is_some();
        if !(exists && mode == ApplyMode::NoRecreate) {
            self.runtime.add_container(MockContainer::new(&name, true));
        }
        Ok(format!("Container {name} Started"))
    }

    fn down(&self, manifest: &Path) -> Result<String> {
        let profile = Self::profile_of(manifest);
        self.runtime.record(format!("down:{profile}"))?;
        let name = format!("{}-{}", self.container_prefix, profile);
        self.runtime.state().containers.remove(&name);
        Ok(format!("Container {name} Removed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_and_injects_failures() {
        let runtime = MockRuntime::new();
        runtime.add_container(MockContainer::new("gphotos-sync-alpha", true));
        runtime.fail("remove:gphotos-sync-alpha", "device busy");

        runtime
            .stop("gphotos-sync-alpha", Duration::from_secs(10))
            .unwrap();
        let err = runtime.remove("gphotos-sync-alpha", true).unwrap_err();
        assert!(err.to_string().contains("device busy"));
        assert!(runtime.container("gphotos-sync-alpha").is_some());
        assert_eq!(
            runtime.calls(),
            vec!["stop:gphotos-sync-alpha", "remove:gphotos-sync-alpha"]
        );
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let runtime = MockRuntime::new();
        let err = runtime.remove("gphotos-sync-ghost", true).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_compose_up_creates_container() {
        let runtime = Arc::new(MockRuntime::new());
        let compose = MockCompose::new(runtime.clone(), "gphotos-sync");
        compose
            .up(Path::new("/ws/docker-compose.alpha.yml"), ApplyMode::Build)
            .unwrap();
        assert!(runtime.container("gphotos-sync-alpha").unwrap().running);
        assert_eq!(runtime.calls(), vec!["up:alpha:build"]);
    }

    #[test]
    fn test_logs_tail_is_bounded() {
        let runtime = MockRuntime::new();
        runtime.add_container(MockContainer::new("gphotos-sync-alpha", true));
        runtime.set_logs("gphotos-sync-alpha", "one\ntwo\nthree");
        assert_eq!(runtime.logs_tail("gphotos-sync-alpha", 2).unwrap(), "two\nthree");
    }
}
