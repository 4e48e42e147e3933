//! Bounded execution of the external tool.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use metrics::counter;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::config::ToolSettings;

use super::invocation::InvocationSpec;

const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";
const QT_PLATFORM_ENV: &str = "QT_QPA_PLATFORM";
const QT_PLATFORM_HEADLESS: &str = "offscreen";
/// How long pipe readers may keep draining after the child exited normally.
const DRAIN_GRACE: Duration = Duration::from_secs(5);
/// How long to wait for a killed child and its pipes.
const KILL_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8 * 1024;

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process ran to completion. `code` is `None` when it died by signal.
    Exited { code: Option<i32> },
    /// The process outlived its timeout and was killed.
    TimedOut,
    /// The process could not be started or awaited.
    ExecutorError { error: String },
}

impl ProcessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessOutcome::Exited { .. } => "exited",
            ProcessOutcome::TimedOut => "timed_out",
            ProcessOutcome::ExecutorError { .. } => "executor_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub outcome: ProcessOutcome,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessResult {
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ProcessOutcome::Exited { code } => code,
            _ => None,
        }
    }

    pub fn exited_cleanly(&self) -> bool {
        self.exit_code() == Some(0)
    }

    pub fn executor_error(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            outcome: ProcessOutcome::ExecutorError {
                error: error.into(),
            },
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
        }
    }
}

/// Runs invocations. Implementations never fail: every problem is folded
/// into the returned [`ProcessResult`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &InvocationSpec) -> ProcessResult;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    /// Headless defaults for keys missing from the service environment.
    headless_env: Vec<(String, String)>,
    runtime_dir: PathBuf,
}

impl TokioProcessRunner {
    pub fn new(tool: &ToolSettings) -> Self {
        Self::with_inherited(tool, |key| std::env::var_os(key).map(PathBuf::from))
    }

    fn with_inherited<F>(tool: &ToolSettings, inherited: F) -> Self
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        let mut headless_env = Vec::new();

        if inherited(QT_PLATFORM_ENV).is_none() {
            headless_env.push((QT_PLATFORM_ENV.to_string(), QT_PLATFORM_HEADLESS.to_string()));
        }

        let runtime_dir = match inherited(RUNTIME_DIR_ENV) {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => {
                headless_env.push((
                    RUNTIME_DIR_ENV.to_string(),
                    tool.runtime_dir.display().to_string(),
                ));
                tool.runtime_dir.clone()
            }
        };

        Self {
            headless_env,
            runtime_dir,
        }
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &InvocationSpec) -> ProcessResult {
        let started_at = Instant::now();

        if let Err(err) = ensure_runtime_dir(&self.runtime_dir).await {
            warn!(
                target = "application::render::executor",
                op = "executor::run",
                runtime_dir = %self.runtime_dir.display(),
                error = %err,
                "Failed to prepare runtime directory; continuing"
            );
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(self.headless_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(&spec.env)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // wrappers such as xvfb-run fork the tool; a fresh group lets a kill reach it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                counter!("parcel_report_process_spawn_total", "result" => "error").increment(1);
                let error_code = if err.kind() == ErrorKind::NotFound {
                    "not_found"
                } else {
                    "spawn"
                };
                warn!(
                    target = "application::render::executor",
                    op = "executor::run",
                    result = "error",
                    error_code,
                    program = %spec.program,
                    error = %err,
                    "Failed to spawn external tool"
                );
                return ProcessResult::executor_error(
                    format!("failed to spawn `{}`: {err}", spec.program),
                    started_at.elapsed(),
                );
            }
        };
        counter!("parcel_report_process_spawn_total", "result" => "spawned").increment(1);
        let pid = child.id();

        let stdin_task = match (spec.stdin.clone(), child.stdin.take()) {
            (Some(payload), Some(mut stdin)) => Some(tokio::spawn(async move {
                if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                    debug!(
                        target = "application::render::executor",
                        error = %err,
                        "External tool closed stdin before reading the payload"
                    );
                }
                // dropping `stdin` closes the pipe
            })),
            _ => None,
        };

        let (stdout_buf, mut stdout_task) = spawn_capture(child.stdout.take());
        let (stderr_buf, mut stderr_task) = spawn_capture(child.stderr.take());

        let waited = tokio::time::timeout(spec.timeout, child.wait()).await;
        let (outcome, grace) = match waited {
            Ok(Ok(status)) => (
                ProcessOutcome::Exited {
                    code: status.code(),
                },
                DRAIN_GRACE,
            ),
            Ok(Err(err)) => {
                kill_process_group(&mut child, pid);
                (
                    ProcessOutcome::ExecutorError {
                        error: format!("failed to wait for `{}`: {err}", spec.program),
                    },
                    KILL_GRACE,
                )
            }
            Err(_) => {
                kill_process_group(&mut child, pid);
                let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
                (ProcessOutcome::TimedOut, KILL_GRACE)
            }
        };

        let drained = tokio::time::timeout(grace, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await
        .is_ok();
        if !drained {
            debug!(
                target = "application::render::executor",
                "Output pipes still open after grace period; keeping partial output"
            );
        }
        stdout_task.abort();
        stderr_task.abort();
        if let Some(task) = stdin_task {
            task.abort();
        }

        let result = ProcessResult {
            outcome,
            stdout: stdout_buf.into_string(),
            stderr: stderr_buf.into_string(),
            elapsed: started_at.elapsed(),
        };

        info!(
            target = "application::render::executor",
            op = "executor::run",
            result = result.outcome.as_str(),
            exit_code = result.exit_code().map(i64::from).unwrap_or(-1),
            elapsed_ms = result.elapsed.as_millis() as u64,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "External tool finished"
        );

        result
    }
}

/// SIGKILL the child's process group, falling back to the child alone.
fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::{
            errno::Errno,
            sys::signal::{Signal, killpg},
            unistd::Pid,
        };

        if let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
            match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => return,
                Err(errno) => warn!(
                    target = "application::render::executor",
                    op = "executor::kill",
                    pid,
                    error = %errno,
                    "Failed to kill process group; killing the child only"
                ),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(err) = child.start_kill() {
        warn!(
            target = "application::render::executor",
            op = "executor::kill",
            error = %err,
            "Failed to kill external tool"
        );
    }
}

async fn ensure_runtime_dir(dir: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(dir).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }

    Ok(())
}

/// Output collected incrementally so a killed process still yields what it wrote.
#[derive(Debug, Clone, Default)]
struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    fn extend(&self, chunk: &[u8]) {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.extend_from_slice(chunk);
    }

    fn into_string(self) -> String {
        let guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&guard).into_owned()
    }
}

fn spawn_capture<R>(pipe: Option<R>) -> (CaptureBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = CaptureBuffer::default();
    let sink = buffer.clone();
    let handle = tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.extend(&chunk[..n]),
            }
        }
    });
    (buffer, handle)
}
