use std::path::Path;
use std::time::Duration;

use tracing::info;

use gsync_core::{FleetConfig, FleetError, Result};

use super::command::DockerCommand;
use crate::{ApplyMode, ComposeTool};

pub struct ComposeCommand;

impl ComposeCommand {
    /// Build `docker compose -f <manifest> <subcommand> ...` arguments.
    pub fn build_args(
        manifest: &Path,
        subcommand: &str,
        extra_args: &[&str],
    ) -> Result<Vec<String>> {
        let manifest = manifest.to_str().ok_or_else(|| {
            FleetError::Validation(format!(
                "manifest path is not valid UTF-8: {}",
                manifest.display()
            ))
        })?;

        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            manifest.to_string(),
            subcommand.to_string(),
        ];
        args.extend(extra_args.iter().map(|s| s.to_string()));
        Ok(args)
    }
}

/// `docker compose`, one manifest per call.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    executable: String,
    timeout: Duration,
}

impl DockerCompose {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            executable: config.docker_executable.clone(),
            timeout: config.long_command_timeout(),
        }
    }

    fn run(&self, args: Vec<String>) -> Result<String> {
        let output = DockerCommand::new(&self.executable, self.timeout)
            .args(args)
            .execute_raw()?;
        if output.success {
            // compose reports progress on stderr
            Ok(format!("{}{}", output.stdout, output.stderr))
        } else {
            Err(FleetError::runtime("docker compose", output.diagnostic()))
        }
    }
}

impl ComposeTool for DockerCompose {
    fn up(&self, manifest: &Path, mode: ApplyMode) -> Result<String> {
        info!(manifest = %manifest.display(), %mode, "compose up");
        let mut extra = vec!["-d"];
        extra.extend_from_slice(mode.flags());
        self.run(ComposeCommand::build_args(manifest, "up", &extra)?)
    }

    fn down(&self, manifest: &Path) -> Result<String> {
        info!(manifest = %manifest.display(), "compose down");
        self.run(ComposeCommand::build_args(manifest, "down", &[])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_args_scopes_to_manifest() {
        let manifest = PathBuf::from("/workspace/docker-compose.alpha.yml");
        let args = ComposeCommand::build_args(&manifest, "up", &["-d", "--no-recreate"]).unwrap();
        assert_eq!(
            args,
            vec![
                "compose",
                "-f",
                "/workspace/docker-compose.alpha.yml",
                "up",
                "-d",
                "--no-recreate"
            ]
        );
    }
}
