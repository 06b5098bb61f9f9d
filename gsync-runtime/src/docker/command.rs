//! Docker command builder.
//!
//! Every invocation runs with a timeout and classifies failures: "no such
//! container/image" becomes `NotFound`, everything else `RuntimeFailure` carrying
//! the CLI's own diagnostic text.

use std::time::Duration;

use gsync_core::command_stream::{run_with_timeout, stream_lines, CommandOutput};
use gsync_core::{FleetError, Result};
use tracing::debug;

const NOT_FOUND_MARKERS: &[&str] = &["No such container", "No such image", "No such object"];

/// Builder for Docker commands with fluent interface and consistent error handling.
#[derive(Debug, Clone)]
pub struct DockerCommand<'a> {
    executable: &'a str,
    subcommand: Option<String>,
    args: Vec<String>,
    timeout: Duration,
}

impl<'a> DockerCommand<'a> {
    pub fn new(executable: &'a str, timeout: Duration) -> Self {
        Self {
            executable,
            subcommand: None,
            args: Vec::new(),
            timeout,
        }
    }

    /// Set the Docker subcommand (e.g., "ps", "inspect", "compose").
    pub fn subcommand<S: Into<String>>(mut self, cmd: S) -> Self {
        self.subcommand = Some(cmd.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        if let Some(subcommand) = &self.subcommand {
            argv.push(subcommand.clone());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    fn describe(&self) -> String {
        format!("{} {}", self.executable, self.argv().join(" "))
    }

    /// Run and return the raw output, whatever the exit status.
    pub fn execute_raw(self) -> Result<CommandOutput> {
        let argv = self.argv();
        run_with_timeout(self.executable, &argv, self.timeout)
    }

    /// Run and return stdout, mapping a non-zero exit to an error.
    pub fn execute_with_output(self) -> Result<String> {
        let description = self.describe();
        let output = self.execute_raw()?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify_failure(&description, &output))
        }
    }

    pub fn execute(self) -> Result<()> {
        self.execute_with_output().map(|_| ())
    }

    /// Run, delivering merged stdout/stderr lines to `on_line` as they are produced.
    pub fn stream(self, on_line: &mut dyn FnMut(&str) -> bool, bounded: bool) -> Result<()> {
        let description = self.describe();
        let argv = self.argv();
        let timeout = bounded.then_some(self.timeout);

        let mut tail: Vec<String> = Vec::new();
        let output = stream_lines(self.executable, &argv, timeout, &mut |line| {
            if tail.len() == 20 {
                tail.remove(0);
            }
            tail.push(line.to_string());
            on_line(line)
        })?;

        if output.success {
            Ok(())
        } else {
            let failure = CommandOutput {
                stdout: tail.join("\n"),
                ..output
            };
            Err(classify_failure(&description, &failure))
        }
    }
}

pub(crate) fn classify_failure(description: &str, output: &CommandOutput) -> FleetError {
    let diagnostic = output.diagnostic();
    debug!(command = %description, code = ?output.code, "docker command failed");
    if NOT_FOUND_MARKERS.iter().any(|marker| diagnostic.contains(marker)) {
        FleetError::NotFound(diagnostic.to_string())
    } else {
        FleetError::runtime(description, diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsync_core::ErrorKind;

    #[test]
    fn test_docker_command_builder() {
        let cmd = DockerCommand::new("docker", Duration::from_secs(5))
            .subcommand("ps")
            .arg("-a")
            .args(["--format", "{{json .}}"]);

        assert_eq!(cmd.argv(), vec!["ps", "-a", "--format", "{{json .}}"]);
        assert_eq!(cmd.describe(), "docker ps -a --format {{json .}}");
    }

    #[test]
    fn test_classify_not_found() {
        let output = CommandOutput {
            stderr: "Error response from daemon: No such container: gphotos-sync-alpha".into(),
            code: Some(1),
            ..Default::default()
        };
        let err = classify_failure("docker rm gphotos-sync-alpha", &output);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_classify_runtime_failure_keeps_diagnostic() {
        let output = CommandOutput {
            stderr: "permission denied while trying to connect to the Docker daemon".into(),
            code: Some(1),
            ..Default::default()
        };
        let err = classify_failure("docker ps", &output);
        assert_eq!(err.kind(), ErrorKind::RuntimeFailure);
        assert!(err.to_string().contains("permission denied"));
        assert!(err.to_string().contains("docker ps"));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_with_output_against_real_process() {
        let out = DockerCommand::new("echo", Duration::from_secs(5))
            .arg("hello")
            .execute_with_output()
            .unwrap();
        assert_eq!(out.trim(), "hello");

        let err = DockerCommand::new("sh", Duration::from_secs(5))
            .args(["-c", "echo 'No such container: x' >&2; exit 1"])
            .execute()
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
