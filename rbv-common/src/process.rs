//! External command execution with a timeout.
//!
//! Output is either captured or echoed line by line while it is captured.
//! Spawn failures and timeouts are folded into a failed [`CommandResult`];
//! callers only branch on `succeeded`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Grace period for draining pipes after the child has exited or been killed.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How command output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Collect output silently.
    #[default]
    Capture,
    /// Print each line as it arrives and also collect it.
    Stream,
}

/// A command to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub mode: OutputMode,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            program: program.into(),
            args: args
                .into_iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .collect(),
            working_dir: None,
            timeout: Duration::from_secs(30),
            mode: OutputMode::Capture,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn streamed(mut self) -> Self {
        self.mode = OutputMode::Stream;
        self
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Result of one command invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub succeeded: bool,
    /// Trimmed stdout on success. On failure: stderr, or a description of why
    /// the command failed. Streamed commands carry both streams.
    pub output: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    #[serde(with = "crate::config::duration_str")]
    pub duration: Duration,
}

impl CommandResult {
    fn failed(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
            exit_code: None,
            timed_out: false,
            duration,
        }
    }

    /// True when the command succeeded and its output contains `needle`.
    pub fn succeeded_with(&self, needle: &str) -> bool {
        self.succeeded && self.output.contains(needle)
    }
}

/// Run a command to completion or until its timeout.
pub async fn run_command(spec: &CommandSpec) -> CommandResult {
    let start = Instant::now();
    debug!(command = %spec.display(), timeout = ?spec.timeout, "Executing");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(command = %spec.display(), error = %e, "Failed to spawn");
            return CommandResult::failed(
                format!("Command execution failed: {e}"),
                start.elapsed(),
            );
        }
    };

    let echo = spec.mode == OutputMode::Stream;
    let stdout_task = tokio::spawn(collect_lines(child.stdout.take(), echo));
    let stderr_task = tokio::spawn(collect_lines(child.stderr.take(), echo));

    let mut timed_out = false;
    let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            return CommandResult::failed(
                format!("Command execution failed: {e}"),
                start.elapsed(),
            );
        }
        Err(_) => {
            timed_out = true;
            let _ = child.kill().await;
            None
        }
    };

    let stdout = drain(stdout_task).await;
    let stderr = drain(stderr_task).await;
    let duration = start.elapsed();

    if timed_out {
        warn!(command = %spec.display(), timeout = ?spec.timeout, "Command timed out");
        let mut output = format!("Command timed out after {:?}.", spec.timeout);
        let partial = stderr.trim();
        if !partial.is_empty() {
            output.push('\n');
            output.push_str(partial);
        }
        return CommandResult {
            succeeded: false,
            output,
            exit_code: Some(124),
            timed_out: true,
            duration,
        };
    }

    let exit_code = status.and_then(|s| s.code());
    let succeeded = status.is_some_and(|s| s.success());
    let output = match (succeeded, spec.mode) {
        (_, OutputMode::Stream) => format!("{stdout}{stderr}").trim().to_string(),
        (true, OutputMode::Capture) => stdout.trim().to_string(),
        (false, OutputMode::Capture) => {
            let err = stderr.trim();
            if err.is_empty() {
                match exit_code {
                    Some(code) => format!("Command failed with code {code}"),
                    None => "Command terminated by signal".to_string(),
                }
            } else {
                err.to_string()
            }
        }
    };

    debug!(
        command = %spec.display(),
        succeeded,
        exit_code = ?exit_code,
        duration_ms = duration.as_millis() as u64,
        "Command finished"
    );

    CommandResult {
        succeeded,
        output,
        exit_code,
        timed_out: false,
        duration,
    }
}

async fn collect_lines<R>(reader: Option<R>, echo: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if echo {
            println!("{line}");
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

async fn drain(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(output)) => output,
        _ => String::new(),
    }
}
