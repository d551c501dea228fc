use axum::extract::{Multipart, State};
use axum::response::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::ApiError;
use crate::jobs::{Job, JobState, QueuedJob};
use crate::AppState;

/// Target languages the form offers, mirroring the external tool's coverage.
const TARGET_LANGS: &[&str] = &["ko", "ja", "zh-CN", "en"];

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub job_id: Uuid,
    pub state: JobState,
}

/// `POST /api/translate` — accept a PDF upload plus backend/language choices,
/// pre-flight the configuration, and enqueue a translation job.
///
/// Configuration problems (unknown backend, missing credential, bad language)
/// are rejected here, before the upload is stored or the worker is involved.
pub async fn translate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranslateResponse>, ApiError> {
    let mut file_bytes = None;
    let mut original_filename = String::new();
    let mut service = None;
    let mut lang_out = None;
    let mut api_key = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::bad_request("malformed multipart body")
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                // Sanitize filename to prevent directory traversal
                original_filename = std::path::Path::new(&file_name)
                    .file_name()
                    .ok_or_else(|| ApiError::bad_request("invalid file name"))?
                    .to_string_lossy()
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read upload bytes: {}", e);
                    ApiError::bad_request("failed to read uploaded file")
                })?;
                file_bytes = Some(data);
            }
            "service" => {
                service = Some(text_field(field, "service").await?);
            }
            "lang_out" => {
                lang_out = Some(text_field(field, "lang_out").await?);
            }
            "api_key" => {
                let value = text_field(field, "api_key").await?;
                if !value.trim().is_empty() {
                    api_key = Some(value);
                }
            }
            _ => {}
        }
    }

    let data = file_bytes.ok_or_else(|| ApiError::bad_request("missing `file` field"))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }
    if !original_filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::bad_request("only PDF uploads are accepted"));
    }

    let service = service.ok_or_else(|| ApiError::bad_request("missing `service` field"))?;
    let lang_out = lang_out.ok_or_else(|| ApiError::bad_request("missing `lang_out` field"))?;
    if !TARGET_LANGS.contains(&lang_out.as_str()) {
        return Err(ApiError::bad_request(format!(
            "unsupported target language: {lang_out}"
        )));
    }

    // Pre-flight before anything is enqueued.
    let backend = Backend::parse(&service).map_err(ApiError::from)?;
    let credentials = state
        .config
        .credentials
        .clone()
        .with_override(backend, api_key.clone());
    credentials.ensure_for(backend).map_err(ApiError::from)?;

    let id = Uuid::new_v4();
    let upload_path = state.config.uploads_dir.join(format!("{id}.pdf"));
    tokio::fs::create_dir_all(&state.config.uploads_dir)
        .await
        .map_err(|e| internal("create upload dir", e))?;
    tokio::fs::write(&upload_path, &data)
        .await
        .map_err(|e| internal("store upload", e))?;

    state
        .store
        .insert(Job::new(id, &original_filename, &service, &lang_out))
        .await;

    let queued = QueuedJob {
        id,
        upload_path: upload_path.clone(),
        original_filename,
        backend: service,
        lang_out,
        api_key,
    };
    if state.queue.send(queued).await.is_err() {
        tokio::fs::remove_file(&upload_path).await.ok();
        return Err(ApiError::unavailable("translation worker is not running"));
    }

    tracing::info!("Queued translation job {}", id);
    Ok(Json(TranslateResponse {
        job_id: id,
        state: JobState::Queued,
    }))
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, ApiError> {
    field.text().await.map_err(|e| {
        tracing::error!("Failed to read `{}` field: {}", name, e);
        ApiError::bad_request(format!("failed to read `{name}` field"))
    })
}

fn internal(what: &str, e: std::io::Error) -> ApiError {
    tracing::error!("Failed to {}: {}", what, e);
    ApiError {
        status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("failed to {what}"),
    }
}
