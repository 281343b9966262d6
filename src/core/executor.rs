//! Task execution against the external agent.
//!
//! The executor owns nothing but the subprocess it launches; state transitions
//! are made by the scheduler from the returned [`ExecutionResult`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::task::{ExecutionProfile, Task};
use crate::core::ExecutorError;

/// Transcript on success, classified error otherwise.
pub type ExecutionResult = Result<String, ExecutorError>;

/// How long output readers may keep draining after the agent has exited.
/// A background process that inherited the pipes can hold them open forever.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Everything an executor needs to run one task.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Snapshot of the task taken at admission.
    pub task: Task,
    /// Profile chosen by the admission policy.
    pub profile: ExecutionProfile,
    /// Working directory the agent may write into.
    pub workspace: Option<PathBuf>,
}

/// Abstraction for running a task and classifying the outcome.
///
/// Implementations must return promptly with [`ExecutorError::Cancelled`]
/// once `cancel` fires.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use sleepless_scheduler::core::{ExecutionRequest, ExecutionResult, TaskExecutor};
/// use tokio_util::sync::CancellationToken;
///
/// struct Echo;
///
/// #[async_trait]
/// impl TaskExecutor for Echo {
///     async fn run(&self, req: ExecutionRequest, _cancel: CancellationToken) -> ExecutionResult {
///         Ok(format!("echo: {}", req.task.content))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Run `request` to completion, failure, or cancellation.
    async fn run(&self, request: ExecutionRequest, cancel: CancellationToken) -> ExecutionResult;
}

/// Settings for [`CliExecutor`].
#[derive(Debug, Clone)]
pub struct CliExecutorConfig {
    /// Agent binary.
    pub program: String,
    /// Arguments placed before the profile arguments and the task content.
    pub args: Vec<String>,
    /// Wall-clock limit for one run.
    pub timeout: Duration,
    /// How long to wait for the child to exit after a kill request.
    pub kill_grace: Duration,
    /// Exit codes treated as transient.
    pub retryable_exit_codes: Vec<i32>,
    /// Transcript cap in bytes; the tail is kept.
    pub max_transcript_bytes: usize,
}

/// Executor that launches the agent CLI as a subprocess per task.
#[derive(Debug, Clone)]
pub struct CliExecutor {
    config: CliExecutorConfig,
}

impl CliExecutor {
    /// Create an executor from `config`.
    pub const fn new(config: CliExecutorConfig) -> Self {
        Self { config }
    }

    fn command(&self, request: &ExecutionRequest) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .args(request.profile.cli_args())
            .arg(&request.task.content)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.workspace {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn terminate(&self, child: &mut Child, task_id: u64) {
        if let Err(e) = child.start_kill() {
            debug!(task_id, error = %e, "kill request failed; child likely exited");
        }
        if tokio::time::timeout(self.config.kill_grace, child.wait()).await.is_err() {
            warn!(task_id, "agent did not exit within kill grace period");
        }
    }
}

#[async_trait]
impl TaskExecutor for CliExecutor {
    async fn run(&self, request: ExecutionRequest, cancel: CancellationToken) -> ExecutionResult {
        let task_id = request.task.id;
        let mut child = self.command(&request).spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ExecutorError::NonRetryable(format!(
                    "cannot launch `{}`: {e}",
                    self.config.program
                ))
            }
            _ => ExecutorError::Retryable(format!("spawn failed: {e}")),
        })?;
        info!(task_id, profile = %request.profile.name, "agent launched");

        let stdout = OutputTail::new(self.config.max_transcript_bytes);
        let stderr = OutputTail::new(self.config.max_transcript_bytes);
        let mut readers = [
            tokio::spawn(stdout.clone().fill(child.stdout.take())),
            tokio::spawn(stderr.clone().fill(child.stderr.take())),
        ];

        let status = tokio::select! {
            status = child.wait() => status,
            () = cancel.cancelled() => {
                info!(task_id, "cancellation requested; terminating agent");
                self.terminate(&mut child, task_id).await;
                abort_all(&readers);
                return Err(ExecutorError::Cancelled);
            }
            () = tokio::time::sleep(self.config.timeout) => {
                warn!(task_id, timeout_secs = self.config.timeout.as_secs(), "agent timed out");
                self.terminate(&mut child, task_id).await;
                abort_all(&readers);
                return Err(ExecutorError::Retryable(format!(
                    "timed out after {}s",
                    self.config.timeout.as_secs()
                )));
            }
        }
        .map_err(|e| ExecutorError::Retryable(format!("wait failed: {e}")))?;

        let drained = tokio::time::timeout(OUTPUT_DRAIN, async {
            for reader in &mut readers {
                if let Err(e) = reader.await {
                    debug!(task_id, error = %e, "output reader ended abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(task_id, "agent exited but its output is still held open; keeping what was read");
            abort_all(&readers);
        }

        let (mut transcript, mut truncated) = stdout.take();
        let (err_text, err_truncated) = stderr.take();
        truncated |= err_truncated;
        if !err_text.is_empty() {
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(&err_text);
        }
        let transcript = truncate_tail(transcript, self.config.max_transcript_bytes, truncated);

        classify_exit(status.code(), &transcript, &self.config.retryable_exit_codes)?;
        Ok(transcript)
    }
}

fn abort_all(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

/// Last `cap` bytes of one output stream, shared with its reader task so a
/// partial transcript survives when the reader is aborted.
#[derive(Clone)]
struct OutputTail {
    inner: Arc<Mutex<(Vec<u8>, bool)>>,
    cap: usize,
}

impl OutputTail {
    fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new((Vec::new(), false))),
            cap,
        }
    }

    fn push(&self, chunk: &[u8]) {
        let mut guard = self.inner.lock();
        let (buf, dropped) = &mut *guard;
        buf.extend_from_slice(chunk);
        // Trim lazily so the copy is amortised; memory stays below twice the cap.
        if buf.len() > self.cap.saturating_mul(2) {
            let excess = buf.len() - self.cap;
            buf.drain(..excess);
            *dropped = true;
        }
    }

    async fn fill<R>(self, source: Option<R>)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let Some(mut source) = source else {
            return;
        };
        let mut chunk = vec![0_u8; 8192];
        loop {
            match source.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => self.push(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "agent output stream closed early");
                    break;
                }
            }
        }
    }

    /// Collected text and whether anything was dropped.
    fn take(&self) -> (String, bool) {
        let mut guard = self.inner.lock();
        let (buf, dropped) = &mut *guard;
        let bytes = std::mem::take(buf);
        (String::from_utf8_lossy(&bytes).into_owned(), *dropped)
    }
}

const QUOTA_MARKERS: &[&str] = &[
    "usage limit",
    "rate limit",
    "quota exceeded",
    "limit reached",
];
const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication",
    "invalid api key",
    "not logged in",
];
const TRANSIENT_MARKERS: &[&str] = &[
    "overloaded",
    "connection reset",
    "temporarily unavailable",
    "503",
];

/// Map an exit status and transcript to a failure class.
///
/// `None` means the process died from a signal, which is treated as a crash.
pub fn classify_exit(
    code: Option<i32>,
    transcript: &str,
    retryable_exit_codes: &[i32],
) -> Result<(), ExecutorError> {
    let Some(code) = code else {
        return Err(ExecutorError::Retryable("agent terminated by signal".into()));
    };
    if code == 0 {
        return Ok(());
    }

    let lower = transcript.to_lowercase();
    let tail = last_line(transcript);
    if QUOTA_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(ExecutorError::NonRetryable(format!(
            "quota exhausted mid-run (exit {code}): {tail}"
        )));
    }
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(ExecutorError::NonRetryable(format!(
            "authorization failure (exit {code}): {tail}"
        )));
    }
    if retryable_exit_codes.contains(&code) || TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return Err(ExecutorError::Retryable(format!("exit {code}: {tail}")));
    }
    Err(ExecutorError::NonRetryable(format!("exit {code}: {tail}")))
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|l| !l.trim().is_empty()).map_or("", str::trim)
}

fn truncate_tail(mut text: String, max_bytes: usize, already_truncated: bool) -> String {
    if text.len() > max_bytes {
        let mut cut = text.len() - max_bytes;
        while !text.is_char_boundary(cut) {
            cut += 1;
        }
        text.replace_range(..cut, "");
    } else if !already_truncated {
        return text;
    }
    format!("[transcript truncated]\n{text}")
}
