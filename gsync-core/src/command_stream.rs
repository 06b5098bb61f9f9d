// Standard library
use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

// External crates
use duct::cmd;
use tracing::debug;
use which::which;

// Internal imports
use crate::error::{FleetError, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Stderr if there is any, otherwise stdout. Used for failure diagnostics.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

fn describe<A: AsRef<OsStr>>(command: &str, args: &[A]) -> String {
    let mut full = command.to_string();
    for arg in args {
        full.push(' ');
        full.push_str(&arg.as_ref().to_string_lossy());
    }
    full
}

/// Run a command to completion, capturing stdout and stderr.
///
/// A non-zero exit is not an error here; callers inspect [`CommandOutput::success`]
/// because some failures (missing container) are expected outcomes. Exceeding
/// `timeout` kills the child and returns [`FleetError::Timeout`].
pub fn run_with_timeout<A: AsRef<OsStr>>(
    command: &str,
    args: &[A],
    timeout: Duration,
) -> Result<CommandOutput> {
    let full_command = describe(command, args);
    debug!(command = %full_command, "running command");

    let handle = cmd(command, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .start()
        .map_err(|e| FleetError::runtime(full_command.clone(), e.to_string()))?;

    let start = Instant::now();
    loop {
        match handle.try_wait() {
            Ok(Some(output)) => {
                return Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    code: output.status.code(),
                    success: output.status.success(),
                });
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = handle.kill();
                    return Err(FleetError::Timeout {
                        command: full_command,
                        after: timeout,
                    });
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(FleetError::runtime(
                    full_command,
                    format!("error waiting for command: {e}"),
                ));
            }
        }
    }
}

/// Run a command and hand each output line (stderr merged into stdout) to
/// `on_line` as soon as it is produced.
///
/// Returning `false` from `on_line` stops reading and kills the child; that is
/// not an error. With a `timeout`, a watchdog kills the child once the limit
/// passes and the call returns [`FleetError::Timeout`].
pub fn stream_lines<A: AsRef<OsStr>>(
    command: &str,
    args: &[A],
    timeout: Option<Duration>,
    on_line: &mut dyn FnMut(&str) -> bool,
) -> Result<CommandOutput> {
    let full_command = describe(command, args);
    debug!(command = %full_command, "streaming command");

    let handle = cmd(command, args)
        .stderr_to_stdout()
        .unchecked()
        .reader()
        .map_err(|e| FleetError::runtime(full_command.clone(), e.to_string()))?;

    let timed_out = AtomicBool::new(false);
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let read_result = thread::scope(|scope| {
        if let Some(limit) = timeout {
            let handle_ref = &handle;
            let flag = &timed_out;
            scope.spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(limit) {
                    flag.store(true, Ordering::SeqCst);
                    let _ = handle_ref.kill();
                }
            });
        }

        let mut stopped_early = false;
        let mut result = Ok(());
        for line in BufReader::new(&handle).lines() {
            match line {
                Ok(line) => {
                    if !on_line(&line) {
                        stopped_early = true;
                        break;
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if stopped_early {
            let _ = handle.kill();
        }
        drop(done_tx);
        result.map(|_| stopped_early)
    });

    if timed_out.load(Ordering::SeqCst) {
        return Err(FleetError::Timeout {
            command: full_command,
            after: timeout.unwrap_or_default(),
        });
    }

    let stopped_early = read_result
        .map_err(|e| FleetError::runtime(full_command.clone(), e.to_string()))?;
    if stopped_early {
        return Ok(CommandOutput {
            success: true,
            ..Default::default()
        });
    }

    match handle.try_wait() {
        Ok(Some(output)) => Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            code: output.status.code(),
            success: output.status.success(),
        }),
        Ok(None) => Ok(CommandOutput::default()),
        Err(e) => Err(FleetError::runtime(full_command, e.to_string())),
    }
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output_and_status() {
        let output = run_with_timeout("sh", &["-c", "echo out; echo err >&2; exit 3"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.code, Some(3));
        assert!(!output.success);
        assert_eq!(output.diagnostic(), "err");
    }

    #[test]
    fn test_run_times_out() {
        let err = run_with_timeout("sleep", &["5"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, FleetError::Timeout { .. }));
    }

    #[test]
    fn test_stream_lines_in_order() {
        let mut seen = Vec::new();
        let output = stream_lines(
            "sh",
            &["-c", "echo one; echo two >&2; echo three"],
            Some(Duration::from_secs(5)),
            &mut |line| {
                seen.push(line.to_string());
                true
            },
        )
        .unwrap();
        assert!(output.success);
        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_stream_lines_stops_when_consumer_declines() {
        let mut seen = 0;
        let output = stream_lines(
            "sh",
            &["-c", "while true; do echo tick; sleep 0.05; done"],
            Some(Duration::from_secs(5)),
            &mut |_| {
                seen += 1;
                seen < 3
            },
        )
        .unwrap();
        assert!(output.success);
        assert_eq!(seen, 3);
    }

    #[test]
    fn test_stream_lines_times_out() {
        let err = stream_lines(
            "sh",
            &["-c", "echo start; exec sleep 5"],
            Some(Duration::from_millis(300)),
            &mut |_| true,
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::Timeout { .. }));
    }

    #[test]
    fn test_is_tool_installed() {
        assert!(is_tool_installed("sh"));
        assert!(!is_tool_installed("definitely-not-a-real-tool-name"));
    }
}
