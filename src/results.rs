use std::path::Path;

use uuid::Uuid;

use crate::runner::JobResult;

/// Download names of the artifacts that survived harvesting, plus the
/// conventional names of anything the tool failed to produce.
#[derive(Debug, Default, Clone)]
pub struct HarvestedArtifacts {
    pub mono: Option<String>,
    pub dual: Option<String>,
    pub missing: Vec<String>,
}

/// Copy whichever artifacts exist out of the job's working directory into the
/// durable results directory, named after the original upload. The job id
/// prefix keeps two jobs over the same source file independent.
pub async fn harvest(
    result: &JobResult,
    job_id: Uuid,
    original_filename: &str,
    results_dir: &Path,
) -> std::io::Result<HarvestedArtifacts> {
    tokio::fs::create_dir_all(results_dir).await?;

    let stem = Path::new(original_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut harvested = HarvestedArtifacts {
        missing: result.missing.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };

    if let Some(src) = &result.mono {
        let name = format!("{job_id}_{stem}_translated.pdf");
        tokio::fs::copy(src, results_dir.join(&name)).await?;
        harvested.mono = Some(name);
    }
    if let Some(src) = &result.dual {
        let name = format!("{job_id}_{stem}_dual.pdf");
        tokio::fs::copy(src, results_dir.join(&name)).await?;
        harvested.dual = Some(name);
    }

    Ok(harvested)
}
