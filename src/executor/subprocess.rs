//! Subprocess execution.
//!
//! Runs external commands with:
//! - No shell interpretation (direct exec)
//! - A timeout enforced by polling
//! - Captured stdout/stderr, drained while the child runs

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{AutoupdateError, CommandErrorKind};

/// Result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
    /// The exit code, if available.
    pub exit_code: Option<i32>,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl SubprocessResult {
    fn from_parts(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(stdout).to_string(),
            stderr: String::from_utf8_lossy(stderr).to_string(),
        }
    }

    /// Short description of a failed run, taken from stderr (or stdout when
    /// stderr is empty).
    pub fn detail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        sanitize_output(source.trim(), 5)
    }
}

/// Builder for subprocess execution.
pub struct SubprocessBuilder {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessBuilder {
    /// Create a new subprocess builder.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Add arguments to the command.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Set the timeout for the command.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute the command and wait for completion.
    ///
    /// A process exceeding the timeout is killed and reported as
    /// [`CommandErrorKind::Timeout`].
    pub fn run(self) -> Result<SubprocessResult, AutoupdateError> {
        debug!(
            program = %self.program.display(),
            args = ?self.args,
            timeout_secs = self.timeout.as_secs(),
            "Executing subprocess"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| AutoupdateError::Command {
            kind: CommandErrorKind::ExecutionFailed {
                message: format!("Failed to spawn {}: {}", self.program.display(), e),
            },
        })?;

        // Pipes are drained on their own threads so a child writing more than
        // the pipe buffer can still exit.
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    // A grandchild may still hold the pipes open
                    let remaining = self.timeout.saturating_sub(start.elapsed());
                    let stdout = stdout_rx.recv_timeout(remaining).unwrap_or_default();
                    let stderr = stderr_rx
                        .recv_timeout(self.timeout.saturating_sub(start.elapsed()))
                        .unwrap_or_default();

                    let result = SubprocessResult::from_parts(status, &stdout, &stderr);
                    debug!(
                        success = result.success,
                        exit_code = ?result.exit_code,
                        stdout_bytes = stdout.len(),
                        duration_ms = start.elapsed().as_millis(),
                        "Subprocess completed"
                    );
                    return Ok(result);
                }
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        warn!(
                            program = %self.program.display(),
                            timeout_secs = self.timeout.as_secs(),
                            "Process timed out, killing"
                        );
                        if let Err(e) = child.kill() {
                            warn!(error = %e, "Failed to kill timed-out process");
                        }
                        // Reap the zombie
                        let _ = child.wait();
                        return Err(AutoupdateError::Command {
                            kind: CommandErrorKind::Timeout {
                                timeout_secs: self.timeout.as_secs(),
                            },
                        });
                    }
                    thread::sleep(poll_interval);
                }
                Err(e) => {
                    return Err(AutoupdateError::Command {
                        kind: CommandErrorKind::ExecutionFailed {
                            message: format!("Failed to check process status: {}", e),
                        },
                    });
                }
            }
        }
    }
}

/// Read `pipe` to the end on a separate thread.
fn drain<R>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!(error = %e, "Failed to read subprocess output");
            }
        }
        // Receiver is gone after a timeout
        let _ = tx.send(buf);
    });
    rx
}

/// Trim command output for inclusion in operator-facing messages.
///
/// Keeps at most `max_lines` lines, each cut at 200 characters.
pub fn sanitize_output(output: &str, max_lines: usize) -> String {
    const MAX_LINE_LENGTH: usize = 200;

    let mut result = output
        .lines()
        .take(max_lines)
        .map(|line| match line.char_indices().nth(MAX_LINE_LENGTH) {
            Some((cut, _)) => format!("{}...", &line[..cut]),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n");

    if output.lines().count() > max_lines {
        result.push_str("\n...[additional output truncated]");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_command(
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<SubprocessResult, AutoupdateError> {
        SubprocessBuilder::new(program)
            .args(args.iter().copied())
            .timeout(timeout)
            .run()
    }

    #[test]
    fn test_run_echo() {
        let result = run_command("echo", &["hello", "world"], Duration::from_secs(5)).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_run_false_command() {
        let result = run_command("false", &[], Duration::from_secs(5)).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_subprocess_builder() {
        let result = SubprocessBuilder::new("echo")
            .arg("test")
            .arg("builder")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.trim(), "test builder");
    }

    #[test]
    fn test_nonexistent_command() {
        let result = run_command("nonexistent_command_12345", &[], Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(AutoupdateError::Command {
                kind: CommandErrorKind::ExecutionFailed { .. }
            })
        ));
    }

    #[test]
    fn test_timeout_kills_process() {
        let result = run_command("sleep", &["5"], Duration::from_millis(200));
        assert!(matches!(
            result,
            Err(AutoupdateError::Command {
                kind: CommandErrorKind::Timeout { .. }
            })
        ));
    }

    #[test]
    fn test_output_larger_than_pipe_buffer() {
        // About 300 KB on stdout and 100 KB on stderr
        let result = run_command(
            "sh",
            &[
                "-c",
                "i=0; while [ $i -lt 6000 ]; do \
                 echo 'padding line of fifty characters for the output.'; \
                 i=$((i+1)); done; \
                 head -c 100000 /dev/zero | tr '\\0' e >&2; echo last-line",
            ],
            Duration::from_secs(20),
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.lines().count(), 6001);
        assert_eq!(result.stdout.lines().last(), Some("last-line"));
        assert_eq!(result.stderr.len(), 100_000);
    }

    #[test]
    fn test_detail_prefers_stderr() {
        let result = run_command("sh", &["-c", "echo out; echo err >&2; exit 3"], Duration::from_secs(5))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.detail(), "err");
    }

    #[test]
    fn test_sanitize_output_truncates_lines() {
        let output = "Line 1\nLine 2\nLine 3\nLine 4";
        let sanitized = sanitize_output(output, 2);
        assert!(sanitized.contains("Line 2"));
        assert!(!sanitized.contains("Line 3"));
        assert!(sanitized.contains("[additional output truncated]"));
    }

    #[test]
    fn test_sanitize_output_truncates_long_lines() {
        let long_line = "x".repeat(300);
        let sanitized = sanitize_output(&long_line, 10);
        assert!(sanitized.len() < 300);
        assert!(sanitized.ends_with("..."));
    }
}
