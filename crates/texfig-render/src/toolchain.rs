//! External process invocation with timeouts.
//!
//! The typesetting engine and the rasterizer are opaque collaborators reached
//! through process invocation. Each run is bounded by a wall-clock timeout.
//! On Unix every tool runs as the leader of its own process group, and the
//! whole group is killed once the leader finishes or times out, so helpers
//! such as `mktexpk` never outlive the scratch workspace.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long to wait for output pipes to close after the tool is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Program plus leading arguments for an external tool.
///
/// Step-specific arguments are appended after `args` at invocation time, so a
/// wrapper such as `["docker", "run", "--rm", "texlive", "pdflatex"]` works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    /// Create a command for `program` with no leading arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build a command from an argv-style list.
    ///
    /// Returns `None` when the list is empty.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Append a leading argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Captured output of a finished tool run.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        return stdout.to_owned();
    }
    format!("{stdout}\n{stderr}")
}

/// Why a tool run produced no exit status.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ToolFailure {
    #[error("could not start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("failed waiting for {program}: {source}")]
    Wait { program: String, source: io::Error },
    #[error("{program} timed out after {}s", .timeout.as_secs_f32())]
    TimedOut {
        program: String,
        timeout: Duration,
        /// Stdout and stderr written before the tool was killed.
        output: String,
    },
}

impl ToolFailure {
    /// Output the tool produced before failing (empty if it never ran).
    pub fn output(&self) -> &str {
        match self {
            Self::TimedOut { output, .. } => output,
            Self::Spawn { .. } | Self::Wait { .. } => "",
        }
    }
}

/// Run a tool in `cwd` and wait for it, up to `timeout`.
///
/// Stdin is closed so an engine that stops for input fails instead of
/// hanging. On Unix the child gets its own process group, which keeps a
/// terminal Ctrl-C from killing in-flight renders; that group is killed when
/// the run ends. Output is drained concurrently, so whatever the tool wrote
/// before a timeout is still returned.
pub(crate) async fn run_tool(
    command: &ToolCommand,
    extra_args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<ToolOutput, ToolFailure> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .args(extra_args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    tracing::debug!(
        program = %command.program,
        args = ?extra_args,
        cwd = %cwd.display(),
        "Running external tool"
    );

    let mut child = cmd.spawn().map_err(|source| ToolFailure::Spawn {
        program: command.program.clone(),
        source,
    })?;
    let group = child.id();
    let stdout = Capture::start(child.stdout.take());
    let stderr = Capture::start(child.stderr.take());

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    // Stragglers left in the group would keep writing into the workspace
    kill_group(group);

    let status = match waited {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(ToolFailure::Wait {
                program: command.program.clone(),
                source,
            });
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                tracing::warn!(
                    program = %command.program,
                    error = %e,
                    "Failed to kill timed out tool"
                );
            }
            let output = combine(&stdout.finish().await, &stderr.finish().await);
            return Err(ToolFailure::TimedOut {
                program: command.program.clone(),
                timeout,
                output,
            });
        }
    };

    Ok(ToolOutput {
        status,
        stdout: stdout.finish().await,
        stderr: stderr.finish().await,
    })
}

/// Send `SIGKILL` to the process group led by `leader`.
#[cfg(unix)]
fn kill_group(leader: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = leader.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "Failed to kill tool process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: Option<u32>) {}

/// Pipe reader that keeps everything read so far.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let Some(mut reader) = reader else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buffer) = sink.lock() {
                            buffer.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Self { buffer, task }
    }

    /// Wait briefly for end of stream and return the text read.
    async fn finish(self) -> String {
        let Self { buffer, mut task } = self;
        // A process that left the group can hold the pipe open indefinitely
        if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
        buffer
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

/// Last `limit` non-blank lines of tool output, right-trimmed.
pub(crate) fn log_tail(output: &str, limit: usize) -> Vec<String> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let skip = lines.len().saturating_sub(limit);
    lines[skip..].iter().map(|line| (*line).to_owned()).collect()
}
