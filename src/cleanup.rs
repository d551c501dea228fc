use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::config::AppConfig;

/// Start the GC background task.
/// - Runs every 6 hours
/// - Deletes result files and stale uploads older than the retention period
pub async fn start_gc_task(config: Arc<AppConfig>) {
    info!("[GC] Starting results garbage collection task...");

    let mut interval = interval(Duration::from_secs(6 * 60 * 60));

    loop {
        interval.tick().await;

        for dir in [&config.results_dir, &config.uploads_dir] {
            match sweep(dir, config.retention).await {
                Ok(0) => {}
                Ok(n) => info!("[GC] Removed {} expired files from {}", n, dir.display()),
                Err(e) => error!("[GC] Sweep of {} failed: {}", dir.display(), e),
            }
        }
    }
}

/// Remove regular files in `dir` whose modification time is older than
/// `retention`. Missing directory counts as nothing to do.
async fn sweep(dir: &Path, retention: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        let expired = meta
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .map(|age| age > retention)
            .unwrap_or(false);
        if expired {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => error!("[GC] Could not remove {}: {}", entry.path().display(), e),
            }
        }
    }
    Ok(removed)
}
