//! Worker-loop integration tests: queue a job, let the worker drive the
//! runner against a fake tool, and observe the registry and broadcast events.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use pdf2zh_server::config::{AppConfig, Credentials};
use pdf2zh_server::events::JobEvent;
use pdf2zh_server::jobs::{self, Job, JobState, JobStore, QueuedJob};

fn fake_tool(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-pdf2zh.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn test_config(base: &Path, tool: String) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        port: 0,
        pdf2zh_bin: tool,
        results_dir: base.join("results"),
        uploads_dir: base.join("uploads"),
        retention: Duration::from_secs(24 * 60 * 60),
        credentials: Credentials::default(),
    })
}

/// Queue one job and wait until the worker moves it to a terminal state.
async fn run_one(
    config: Arc<AppConfig>,
    backend: &str,
    filename: &str,
) -> (Job, Vec<JobEvent>) {
    let store = JobStore::new();
    let (queue_tx, queue_rx) = mpsc::channel(4);
    let (tx, mut events_rx) = broadcast::channel(100);

    let worker_store = store.clone();
    let worker_config = config.clone();
    tokio::spawn(async move {
        jobs::run_worker(worker_store, worker_config, queue_rx, tx).await;
    });

    let id = Uuid::new_v4();
    std::fs::create_dir_all(&config.uploads_dir).unwrap();
    let upload_path = config.uploads_dir.join(format!("{id}.pdf"));
    std::fs::write(&upload_path, b"%PDF-1.4\nfake\n").unwrap();

    store.insert(Job::new(id, filename, backend, "ko")).await;
    queue_tx
        .send(QueuedJob {
            id,
            upload_path: upload_path.clone(),
            original_filename: filename.to_string(),
            backend: backend.to_string(),
            lang_out: "ko".to_string(),
            api_key: None,
        })
        .await
        .unwrap();

    let job = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            if let Some(job) = store.get(id).await {
                if !matches!(job.state, JobState::Queued | JobState::Running) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state");

    // The terminal broadcast is sent right after the registry update; give
    // the worker task a moment to get it out before draining.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut events = Vec::new();
    while let Ok(ev) = events_rx.try_recv() {
        events.push(ev);
    }
    (job, events)
}

#[tokio::test]
async fn successful_job_harvests_artifacts_and_broadcasts() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        dir.path(),
        "echo ' 40%|####' >&2\ntouch input-mono.pdf input-dual.pdf\n",
    );
    let config = test_config(dir.path(), tool);

    let (job, events) = run_one(config.clone(), "Google", "paper.pdf").await;

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.percent, 100);
    assert!(job.error.is_none());
    assert!(job.missing.is_empty());

    let mono = job.mono_file.expect("mono artifact harvested");
    let dual = job.dual_file.expect("dual artifact harvested");
    assert!(mono.ends_with("_paper_translated.pdf"));
    assert!(dual.ends_with("_paper_dual.pdf"));
    assert!(config.results_dir.join(&mono).exists());
    assert!(config.results_dir.join(&dual).exists());

    // Upload is removed once the job is done.
    assert!(!config.uploads_dir.join(format!("{}.pdf", job.id)).exists());

    assert!(events.iter().any(|e| e.state == JobState::Running));
    assert!(events
        .iter()
        .any(|e| e.state == JobState::Running && e.percent == Some(40)));
    assert!(events.iter().any(|e| e.state == JobState::Succeeded));
}

#[tokio::test]
async fn missing_dual_artifact_is_recorded_on_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "touch input-mono.pdf\n");
    let config = test_config(dir.path(), tool);

    let (job, _events) = run_one(config, "Google", "thesis.pdf").await;

    assert_eq!(job.state, JobState::Succeeded);
    assert!(job.mono_file.is_some());
    assert!(job.dual_file.is_none());
    assert_eq!(job.missing, vec!["input-dual.pdf".to_string()]);
}

#[tokio::test]
async fn failing_tool_marks_the_job_failed_with_stderr_detail() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "echo 'no glyphs for target script' >&2\nexit 7\n");
    let config = test_config(dir.path(), tool);

    let (job, events) = run_one(config, "Google", "paper.pdf").await;

    assert_eq!(job.state, JobState::Failed);
    let error = job.error.expect("failure recorded");
    assert!(error.contains("status 7"));
    assert!(error.contains("no glyphs for target script"));
    assert!(events.iter().any(|e| e.state == JobState::Failed));
}

#[tokio::test]
async fn missing_credential_fails_without_running_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    // The script would create a marker file if it ever ran.
    let tool = fake_tool(dir.path(), "touch input-mono.pdf\n");
    let config = test_config(dir.path(), tool);

    let (job, _events) = run_one(config, "DeepL", "paper.pdf").await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job
        .error
        .expect("error recorded")
        .contains("DEEPL_AUTH_KEY"));
    assert!(job.mono_file.is_none());
}
