//! External tool invocation (CDO, gdal_translate).
//!
//! Stages never spawn processes directly. They describe the call as a
//! [`ToolInvocation`] and hand it to a [`ToolRunner`], so tests can swap in a
//! runner that does not need the real binaries.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Longest stderr excerpt carried in an error.
const STDERR_LIMIT: usize = 2048;

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
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

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Program and arguments as a single line, for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {}: {stderr}", exit_label(.exit_code))]
    Exit {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} produced no output at {}", .path.display())]
    EmptyOutput { program: String, path: PathBuf },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

impl ToolError {
    pub fn program(&self) -> &str {
        match self {
            ToolError::Spawn { program, .. }
            | ToolError::Timeout { program, .. }
            | ToolError::Exit { program, .. }
            | ToolError::EmptyOutput { program, .. } => program,
        }
    }
}

#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as child processes.
///
/// The child is killed when the timeout elapses.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!(command = %invocation.command_line(), "Running tool");

        let mut command = tokio::process::Command::new(&invocation.program);
        command.kill_on_drop(true);
        command.args(&invocation.args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());

        let output = tokio::time::timeout(invocation.timeout, command.output())
            .await
            .map_err(|_| ToolError::Timeout {
                program: invocation.program.clone(),
                timeout: invocation.timeout,
            })?
            .map_err(|source| ToolError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stderr: truncate(&String::from_utf8_lossy(&output.stderr)),
        })
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    if text.len() <= STDERR_LIMIT {
        return text.to_string();
    }
    let mut end = STDERR_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Run a tool that must exit with status 0 and leave a non-empty file at
/// `output`. On any failure the output file is removed.
pub async fn run_expecting_output(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    output: &Path,
) -> Result<(), ToolError> {
    let result = check(runner.run(invocation).await, invocation, output).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(output).await;
    }
    result
}

async fn check(
    result: Result<ToolOutput, ToolError>,
    invocation: &ToolInvocation,
    output: &Path,
) -> Result<(), ToolError> {
    let out = result?;
    if !out.success() {
        return Err(ToolError::Exit {
            program: invocation.program.clone(),
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }

    let non_empty = tokio::fs::metadata(output)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    if !non_empty {
        return Err(ToolError::EmptyOutput {
            program: invocation.program.clone(),
            path: output.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation::new("sh", timeout).args(["-c", script])
    }

    #[tokio::test]
    async fn test_process_runner_exit_code_and_stderr() {
        let out = ProcessRunner
            .run(&sh("echo broken >&2; exit 3", Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr, "broken");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_process_runner_timeout() {
        let err = ProcessRunner
            .run(&sh("sleep 5", Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert_eq!(err.program(), "sh");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let invocation = ToolInvocation::new("definitely-not-a-real-tool", Duration::from_secs(1));
        let err = ProcessRunner.run(&invocation).await.unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.grib2");
        let script = format!("touch {}", out.display());

        let err = run_expecting_output(&ProcessRunner, &sh(&script, Duration::from_secs(10)), &out)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::EmptyOutput { .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_failed_tool_output_removed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.grib2");
        let script = format!("echo partial > {}; exit 1", out.display());

        let err = run_expecting_output(&ProcessRunner, &sh(&script, Duration::from_secs(10)), &out)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Exit { exit_code: Some(1), .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_successful_tool() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.grib2");
        let script = format!("echo data > {}", out.display());

        run_expecting_output(&ProcessRunner, &sh(&script, Duration::from_secs(10)), &out)
            .await
            .unwrap();
        assert!(out.exists());
    }

    #[test]
    fn test_command_line() {
        let inv = ToolInvocation::new("cdo", Duration::from_secs(1))
            .args(["-f", "grb2"])
            .path_arg(Path::new("/tmp/in.grib2"));
        assert_eq!(inv.command_line(), "cdo -f grb2 /tmp/in.grib2");
    }
}
