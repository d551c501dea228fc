use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::backend::Backend;
use crate::config::AppConfig;
use crate::events::JobEvent;
use crate::progress::ProgressSample;
use crate::results;
use crate::runner::{JobRunner, RunStatus, TranslationRequest};
use crate::AppState;

/// Job lifecycle. Transitions are terminal and one-directional:
/// queued -> running -> (succeeded | failed | timed_out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub original_filename: String,
    pub backend: String,
    pub lang_out: String,
    pub state: JobState,
    pub percent: u8,
    pub error: Option<String>,
    /// Download file name of the single-language artifact, once harvested.
    pub mono_file: Option<String>,
    /// Download file name of the dual-language artifact, once harvested.
    pub dual_file: Option<String>,
    /// Expected artifacts the tool did not produce.
    pub missing: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: Uuid, original_filename: &str, backend: &str, lang_out: &str) -> Self {
        Self {
            id,
            original_filename: original_filename.to_string(),
            backend: backend.to_string(),
            lang_out: lang_out.to_string(),
            state: JobState::Queued,
            percent: 0,
            error: None,
            mono_file: None,
            dual_file: None,
            missing: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// In-memory job registry. Nothing here is persisted — the external tool owns
/// all durable translation state, and results live as plain files.
#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.inner.lock().await.insert(job.id, job);
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.lock().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.lock().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn update(&self, id: Uuid, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.inner.lock().await.get_mut(&id) {
            f(job);
        }
    }
}

/// Work item handed from the upload handler to the worker.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: Uuid,
    pub upload_path: PathBuf,
    pub original_filename: String,
    pub backend: String,
    pub lang_out: String,
    pub api_key: Option<String>,
}

/// Single background worker: one queued job at a time, one child process at a
/// time. The runner owns the subprocess; this loop owns job-state bookkeeping
/// and event broadcasting.
pub async fn run_worker(
    store: JobStore,
    config: Arc<AppConfig>,
    mut rx: mpsc::Receiver<QueuedJob>,
    tx: broadcast::Sender<JobEvent>,
) {
    tracing::info!("Translation worker started");
    let runner = JobRunner::new(&config.pdf2zh_bin);

    while let Some(queued) = rx.recv().await {
        let id = queued.id;
        tracing::info!(
            "Starting job {} ({} -> {}, backend {})",
            id,
            queued.original_filename,
            queued.lang_out,
            queued.backend
        );

        store
            .update(id, |j| {
                j.state = JobState::Running;
                j.started_at = Some(Utc::now());
            })
            .await;
        let _ = tx.send(JobEvent::state(id, JobState::Running));

        let mut credentials = config.credentials.clone();
        if let Ok(backend) = Backend::parse(&queued.backend) {
            credentials = credentials.with_override(backend, queued.api_key.clone());
        }
        let request = TranslationRequest::new(
            queued.upload_path.clone(),
            &queued.backend,
            &queued.lang_out,
            credentials,
        );

        // Progress flows runner -> channel -> store/broadcast; the runner
        // never touches the registry or the SSE surface directly.
        let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressSample>(32);
        let forward_store = store.clone();
        let forward_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(sample) = progress_rx.recv().await {
                forward_store.update(id, |j| j.percent = sample.percent).await;
                let _ = forward_tx.send(JobEvent::progress(id, sample));
            }
        });

        let outcome = runner.run(&request, progress_tx).await;
        let _ = forwarder.await;

        match outcome {
            Ok(result) => {
                let harvested = match results::harvest(
                    &result,
                    id,
                    &queued.original_filename,
                    &config.results_dir,
                )
                .await
                {
                    Ok(harvested) => harvested,
                    Err(e) => {
                        tracing::error!("Job {} failed to store artifacts: {}", id, e);
                        finish(&store, &tx, id, JobState::Failed, Some(format!(
                            "failed to store artifacts: {e}"
                        )))
                        .await;
                        cleanup_upload(&queued.upload_path).await;
                        continue;
                    }
                };

                let (state, error) = match &result.status {
                    RunStatus::Succeeded => (JobState::Succeeded, None),
                    RunStatus::Failed { exit_code } => (
                        JobState::Failed,
                        Some(format!(
                            "translator exited with status {exit_code}: {}",
                            stderr_tail(&result.stderr)
                        )),
                    ),
                    RunStatus::TimedOut => (
                        JobState::TimedOut,
                        Some(format!(
                            "translation timed out after {} seconds",
                            request.timeout.as_secs()
                        )),
                    ),
                };

                if result.success() && !result.missing.is_empty() {
                    tracing::warn!(
                        "Job {} succeeded but did not produce: {}",
                        id,
                        result.missing.join(", ")
                    );
                }

                let success = result.success();
                let mono = harvested.mono.clone();
                let dual = harvested.dual.clone();
                let missing = harvested.missing.clone();
                store
                    .update(id, |j| {
                        j.state = state;
                        j.error = error.clone();
                        j.mono_file = mono;
                        j.dual_file = dual;
                        j.missing = missing;
                        j.finished_at = Some(Utc::now());
                        if success {
                            j.percent = 100;
                        }
                    })
                    .await;
                let _ = tx.send(JobEvent::finished(id, state, error.clone()));

                match state {
                    JobState::Succeeded => tracing::info!(
                        "Job {} completed in {:.1}s",
                        id,
                        result.elapsed.as_secs_f64()
                    ),
                    _ => tracing::error!(
                        "Job {} ended in {:?}: {}",
                        id,
                        state,
                        error.unwrap_or_default()
                    ),
                }
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", id, e);
                finish(&store, &tx, id, JobState::Failed, Some(e.to_string())).await;
            }
        }

        cleanup_upload(&queued.upload_path).await;
    }

    tracing::info!("Translation worker shutting down");
}

async fn finish(
    store: &JobStore,
    tx: &broadcast::Sender<JobEvent>,
    id: Uuid,
    state: JobState,
    error: Option<String>,
) {
    store
        .update(id, |j| {
            j.state = state;
            j.error = error.clone();
            j.finished_at = Some(Utc::now());
        })
        .await;
    let _ = tx.send(JobEvent::finished(id, state, error));
}

async fn cleanup_upload(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!("Could not remove upload {}: {}", path.display(), e);
    }
}

/// Last chunk of stderr, enough to diagnose a failure without dumping the
/// whole stream into the job record.
fn stderr_tail(stderr: &str) -> String {
    const TAIL: usize = 400;
    let trimmed = stderr.trim_end();
    if trimmed.len() <= TAIL {
        trimmed.to_string()
    } else {
        let start = trimmed.len() - TAIL;
        // Avoid splitting a UTF-8 sequence.
        let start = (start..trimmed.len())
            .find(|&i| trimmed.is_char_boundary(i))
            .unwrap_or(start);
        format!("...{}", &trimmed[start..])
    }
}

// === API Handlers ===

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, StatusCode> {
    state.store.get(id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.store.list().await)
}
