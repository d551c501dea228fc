//! Translation Job Runner.
//!
//! Coordinates one external `pdf2zh` invocation from request to result:
//! builds the command line, drives the child process while watching its
//! stderr for progress lines, enforces the backend timeout, and probes the
//! working directory for the expected output artifacts.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::backend::Backend;
use crate::config::Credentials;
use crate::error::JobError;
use crate::progress::{parse_percent, ProgressSample};

/// Fixed name the source PDF is written under inside the working directory.
pub const INPUT_NAME: &str = "input.pdf";
/// Single-language output the tool is expected to produce.
pub const MONO_NAME: &str = "input-mono.pdf";
/// Dual-language (side-by-side) output the tool is expected to produce.
pub const DUAL_NAME: &str = "input-dual.pdf";

/// How long to wait for the child to die after a timeout kill, and how long
/// the post-exit drain may wait on a pipe that is still open.
/// `kill_on_drop` backstops anything slower than this.
const REAP_GRACE: Duration = Duration::from_secs(2);

/// One translation invocation. Immutable once constructed, consumed once.
///
/// `backend` stays the raw identifier from the form; the runner resolves it
/// against the backend table itself so an unrecognized value fails pre-flight
/// inside `run`, before anything is spawned.
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub source: PathBuf,
    pub backend: String,
    pub lang_in: String,
    pub lang_out: String,
    pub timeout: Duration,
    pub credentials: Credentials,
}

impl TranslationRequest {
    pub fn new(
        source: PathBuf,
        backend: &str,
        lang_out: &str,
        credentials: Credentials,
    ) -> Self {
        // The timeout is sourced from the backend table; for an identifier
        // the table does not know, any value works — run() rejects the
        // request before the timeout matters.
        let timeout = Backend::parse(backend)
            .map(Backend::timeout)
            .unwrap_or(Duration::from_secs(600));
        Self {
            source,
            backend: backend.to_string(),
            lang_in: "en".to_string(),
            lang_out: lang_out.to_string(),
            timeout,
            credentials,
        }
    }
}

/// Terminal classification of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed { exit_code: i32 },
    TimedOut,
}

/// Outcome of one invocation. Immutable after creation.
///
/// Artifact paths point into the job's working directory and are populated
/// only when the file actually exists after the child terminated. The
/// `workdir` guard keeps those paths alive until the caller has harvested
/// them; dropping the result removes the directory and everything in it.
#[derive(Debug)]
pub struct JobResult {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub mono: Option<PathBuf>,
    pub dual: Option<PathBuf>,
    /// Conventional artifact names that were absent after termination.
    /// Reported, never thrown.
    pub missing: Vec<&'static str>,
    pub elapsed: Duration,
    pub workdir: TempDir,
}

impl JobResult {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Seam for spawning the child process, so tests can count launches.
pub trait Spawner: Send + Sync {
    fn spawn(&self, cmd: &mut Command) -> std::io::Result<Child>;
}

/// Default spawner: hand the command to the OS.
pub struct SystemSpawner;

impl Spawner for SystemSpawner {
    fn spawn(&self, cmd: &mut Command) -> std::io::Result<Child> {
        cmd.spawn()
    }
}

pub struct JobRunner {
    program: String,
    spawner: Arc<dyn Spawner>,
}

impl JobRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_spawner(program, Arc::new(SystemSpawner))
    }

    pub fn with_spawner(program: impl Into<String>, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            program: program.into(),
            spawner,
        }
    }

    /// Run one translation to completion, emitting progress samples through
    /// `progress` as the tool reports them.
    ///
    /// Never blocks indefinitely: a single absolute deadline derived from the
    /// request timeout bounds the whole invocation, and hitting it kills the
    /// child. Timeout and nonzero exit are encoded in the returned
    /// [`JobResult`]; only pre-flight, launch, and I/O problems surface as
    /// [`JobError`].
    pub async fn run(
        &self,
        request: &TranslationRequest,
        progress: mpsc::Sender<ProgressSample>,
    ) -> Result<JobResult, JobError> {
        // Pre-flight: resolve the backend and check its credential before
        // any filesystem or process work.
        let backend = Backend::parse(&request.backend)?;
        request.credentials.ensure_for(backend)?;

        // Fresh working directory, exclusively owned by this invocation.
        let workdir = TempDir::new()?;
        let input_path = workdir.path().join(INPUT_NAME);
        tokio::fs::copy(&request.source, &input_path).await?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(INPUT_NAME)
            .arg("--service")
            .arg(backend.service_arg())
            .arg("--lang-in")
            .arg(&request.lang_in)
            .arg("--lang-out")
            .arg(&request.lang_out)
            .arg("--timeout")
            .arg(request.timeout.as_secs().to_string())
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The credential is handed to the child directly; the server's own
        // environment is never mutated.
        if let Some(var) = backend.required_credential() {
            if let Some(value) = request.credentials.get(var) {
                cmd.env(var, value);
            }
        }

        let start = Instant::now();
        let deadline = start + request.timeout;

        let mut child = self
            .spawner
            .spawn(&mut cmd)
            .map_err(|source| JobError::ProcessLaunch {
                program: self.program.clone(),
                source,
            })?;

        tracing::info!(
            "Launched {} for backend {} (timeout {}s)",
            self.program,
            backend.name(),
            request.timeout.as_secs()
        );

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "child stdout was not captured")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "child stderr was not captured")
        })?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();

        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        // Event loop: two line sources plus one absolute deadline. `None`
        // exit status means the deadline fired and the child was killed.
        let exit_status = loop {
            tokio::select! {
                line = err_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        if let Some(percent) = parse_percent(&line) {
                            let sample = ProgressSample { percent, elapsed: start.elapsed() };
                            progress.send(sample).await.ok();
                        }
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                    _ => stderr_open = false,
                },
                line = out_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        tracing::debug!("pdf2zh: {}", line);
                        stdout_buf.push_str(&line);
                        stdout_buf.push('\n');
                    }
                    _ => stdout_open = false,
                },
                status = child.wait() => break Some(status?),
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        "Translation exceeded {}s timeout, killing child",
                        request.timeout.as_secs()
                    );
                    child.start_kill().ok();
                    break None;
                }
            }
        };

        match exit_status {
            Some(_) => {
                // Natural termination: drain whatever is still buffered. The
                // drain is bounded — a grandchild that inherited the pipes
                // and outlives the tool keeps them open past EOF, and must
                // not stall the runner. Already-buffered lines still come
                // through even once the bound has passed; only a blocking
                // wait on a held-open pipe gets cut off.
                let drain_deadline = Instant::now() + REAP_GRACE;
                if stderr_open {
                    while let Ok(Ok(Some(line))) =
                        tokio::time::timeout_at(drain_deadline, err_lines.next_line()).await
                    {
                        if let Some(percent) = parse_percent(&line) {
                            let sample = ProgressSample { percent, elapsed: start.elapsed() };
                            progress.send(sample).await.ok();
                        }
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                }
                if stdout_open {
                    while let Ok(Ok(Some(line))) =
                        tokio::time::timeout_at(drain_deadline, out_lines.next_line()).await
                    {
                        stdout_buf.push_str(&line);
                        stdout_buf.push('\n');
                    }
                }
            }
            None => {
                // Killed on timeout. Reap briefly so the pid is collected;
                // kill_on_drop covers a child that ignores the signal.
                let _ = tokio::time::timeout(REAP_GRACE, child.wait()).await;
            }
        }

        let status = match exit_status {
            None => RunStatus::TimedOut,
            Some(s) if s.success() => RunStatus::Succeeded,
            Some(s) => RunStatus::Failed {
                exit_code: s.code().unwrap_or(-1),
            },
        };

        // Probe for artifacts regardless of classification; absence is a
        // reported condition, not an error.
        let mut missing = Vec::new();
        let mono = probe(&workdir, MONO_NAME, &mut missing).await;
        let dual = probe(&workdir, DUAL_NAME, &mut missing).await;

        Ok(JobResult {
            status,
            stdout: stdout_buf,
            stderr: stderr_buf,
            mono,
            dual,
            missing,
            elapsed: start.elapsed(),
            workdir,
        })
    }
}

async fn probe(workdir: &TempDir, name: &'static str, missing: &mut Vec<&'static str>) -> Option<PathBuf> {
    let path = workdir.path().join(name);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        Some(path)
    } else {
        missing.push(name);
        None
    }
}
