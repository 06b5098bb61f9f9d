//! Docker CLI implementation of [`ContainerRuntime`] and [`ComposeTool`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use gsync_core::command_stream::is_tool_installed;
use gsync_core::{FleetConfig, FleetError, Result};

use crate::{ContainerDetails, ContainerRuntime, ContainerSummary, ImageSummary};

pub mod command;
pub mod compose;

pub use command::DockerCommand;
pub use compose::{ComposeCommand, DockerCompose};

/// Row of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
}

/// Row of `docker images --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct ImageRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Repository", default)]
    repository: String,
    #[serde(rename = "Tag", default)]
    tag: String,
}

/// Subset of `docker inspect` output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    name: String,
    created: String,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    running: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    image: String,
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    cmd: Option<Vec<String>>,
}

impl From<InspectEntry> for ContainerDetails {
    fn from(entry: InspectEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.trim_start_matches('/').to_string(),
            state: entry.state.status,
            running: entry.state.running,
            created: entry.created,
            image: entry.config.image,
            env: entry.config.env.unwrap_or_default(),
            command: entry.config.cmd.unwrap_or_default(),
        }
    }
}

fn parse_json_lines<T: for<'de> Deserialize<'de>>(output: &str) -> Result<Vec<T>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(FleetError::from))
        .collect()
}

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    executable: String,
    timeout: Duration,
    long_timeout: Duration,
}

impl DockerRuntime {
    pub fn new(config: &FleetConfig) -> Result<Self> {
        if !is_tool_installed(&config.docker_executable) {
            return Err(FleetError::runtime(
                "docker lookup",
                format!("'{}' was not found in PATH", config.docker_executable),
            ));
        }
        Ok(Self {
            executable: config.docker_executable.clone(),
            timeout: config.command_timeout(),
            long_timeout: config.long_command_timeout(),
        })
    }

    fn command(&self) -> DockerCommand<'_> {
        DockerCommand::new(&self.executable, self.timeout)
    }

    fn long_command(&self) -> DockerCommand<'_> {
        DockerCommand::new(&self.executable, self.long_timeout)
    }
}

impl ContainerRuntime for DockerRuntime {
    fn list_containers(
        &self,
        name_prefix: &str,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>> {
        let mut cmd = self.command().subcommand("ps");
        if include_stopped {
            cmd = cmd.arg("-a");
        }
        let output = cmd
            .args(["--no-trunc", "--filter"])
            .arg(format!("name={name_prefix}"))
            .args(["--format", "{{json .}}"])
            .execute_with_output()?;

        // The name filter is a substring match; keep only true prefix matches.
        let rows: Vec<PsRow> = parse_json_lines(&output)?;
        Ok(rows
            .into_iter()
            .filter(|row| row.names.starts_with(name_prefix))
            .map(|row| ContainerSummary {
                id: row.id,
                name: row.names,
                status: row.status,
                state: row.state,
                created: row.created_at,
            })
            .collect())
    }

    fn inspect(&self, name_or_id: &str) -> Result<ContainerDetails> {
        let output = self
            .command()
            .subcommand("inspect")
            .args(["--type", "container", name_or_id])
            .execute_with_output()?;

        let entries: Vec<InspectEntry> = serde_json::from_str(&output)?;
        entries
            .into_iter()
            .next()
            .map(ContainerDetails::from)
            .ok_or_else(|| FleetError::NotFound(format!("container '{name_or_id}'")))
    }

    fn start(&self, name_or_id: &str) -> Result<()> {
        self.command().subcommand("start").arg(name_or_id).execute()
    }

    fn restart(&self, name_or_id: &str) -> Result<()> {
        self.command().subcommand("restart").arg(name_or_id).execute()
    }

    fn stop(&self, name_or_id: &str, timeout: Duration) -> Result<()> {
        DockerCommand::new(&self.executable, self.timeout + timeout)
            .subcommand("stop")
            .args(["-t".to_string(), timeout.as_secs().to_string()])
            .arg(name_or_id)
            .execute()
    }

    fn remove(&self, name_or_id: &str, force: bool) -> Result<()> {
        let mut cmd = self.command().subcommand("rm");
        if force {
            cmd = cmd.arg("-f");
        }
        cmd.arg(name_or_id).execute()
    }

    fn build_image(
        &self,
        context: &Path,
        tag: &str,
        no_cache: bool,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<()> {
        info!(tag, context = %context.display(), no_cache, "building image");
        let mut cmd = self.long_command().subcommand("build");
        if no_cache {
            cmd = cmd.arg("--no-cache");
        }
        cmd.args(["-t", tag])
            .arg(context.to_string_lossy())
            .stream(
                &mut |line| {
                    on_line(line);
                    true
                },
                true,
            )
    }

    fn list_images(&self, name_fragment: &str) -> Result<Vec<ImageSummary>> {
        let output = self
            .command()
            .subcommand("images")
            .args(["--no-trunc", "--format", "{{json .}}"])
            .execute_with_output()?;

        let rows: Vec<ImageRow> = parse_json_lines(&output)?;
        Ok(rows
            .into_iter()
            .filter(|row| row.repository.contains(name_fragment))
            .map(|row| ImageSummary {
                id: row.id,
                repository: row.repository,
                tag: row.tag,
            })
            .collect())
    }

    fn remove_image(&self, reference: &str, force: bool) -> Result<()> {
        let mut cmd = self.command().subcommand("rmi");
        if force {
            cmd = cmd.arg("-f");
        }
        cmd.arg(reference).execute()
    }

    fn prune_dangling_images(&self) -> Result<String> {
        self.long_command()
            .subcommand("image")
            .args(["prune", "-f"])
            .execute_with_output()
    }

    fn logs_tail(&self, name_or_id: &str, lines: usize) -> Result<String> {
        let output = self
            .command()
            .subcommand("logs")
            .args(["--tail".to_string(), lines.to_string()])
            .arg("--timestamps")
            .arg(name_or_id)
            .execute_raw()?;

        if !output.success {
            return Err(command::classify_failure(
                &format!("{} logs {}", self.executable, name_or_id),
                &output,
            ));
        }
        // The container's stderr arrives on our stderr; keep both.
        let mut text = output.stdout;
        text.push_str(&output.stderr);
        Ok(text)
    }

    fn follow_logs(&self, name_or_id: &str, on_line: &mut dyn FnMut(&str) -> bool) -> Result<()> {
        debug!(container = name_or_id, "following logs");
        self.command()
            .subcommand("logs")
            .args(["--follow", "--timestamps", "--tail", "100"])
            .arg(name_or_id)
            .stream(on_line, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_rows() {
        let output = r#"{"ID":"0123456789abcdef","Names":"gphotos-sync-alpha","Status":"Up 2 hours","State":"running","CreatedAt":"2024-01-01 10:00:00 +0000 UTC","Image":"gphotos-sync:latest"}
{"ID":"fedcba9876543210","Names":"gphotos-sync-beta","Status":"Exited (0) 1 day ago","State":"exited","CreatedAt":"2024-01-02 10:00:00 +0000 UTC"}
"#;
        let rows: Vec<PsRow> = parse_json_lines(output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].names, "gphotos-sync-alpha");
        assert_eq!(rows[1].state, "exited");
    }

    #[test]
    fn test_inspect_entry_conversion() {
        let output = r#"[{
            "Id": "0123456789abcdef",
            "Name": "/gphotos-sync-alpha",
            "Created": "2024-01-01T10:00:00.000000000Z",
            "State": {"Status": "running", "Running": true, "Pid": 42},
            "Config": {
                "Image": "gphotos-sync:latest",
                "Env": ["TZ=UTC", "CRON_SCHEDULE=0 3 * * *"],
                "Cmd": null
            }
        }]"#;
        let entries: Vec<InspectEntry> = serde_json::from_str(output).unwrap();
        let details: ContainerDetails = entries.into_iter().next().unwrap().into();
        assert_eq!(details.name, "gphotos-sync-alpha");
        assert!(details.running);
        assert!(details.command.is_empty());
        assert_eq!(details.env_map()["TZ"], "UTC");
    }

    #[test]
    fn test_parse_image_rows() {
        let output = r#"{"ID":"sha256:aaa","Repository":"gphotos-sync","Tag":"latest"}"#;
        let rows: Vec<ImageRow> = parse_json_lines(output).unwrap();
        assert_eq!(rows[0].repository, "gphotos-sync");
        assert_eq!(rows[0].tag, "latest");
    }
}
