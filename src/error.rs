use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures that abort a translation job before or during launch.
///
/// Timeout and nonzero-exit outcomes are not errors — they are terminal
/// states of a [`crate::runner::JobResult`], since the runner still captures
/// output and probes for artifacts in both cases. A missing artifact after a
/// successful exit is likewise a reported condition, never an error.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("unknown translation backend: {0}")]
    UnknownBackend(String),

    #[error("{backend} requires the {var} credential")]
    MissingCredential {
        backend: &'static str,
        var: &'static str,
    },

    #[error("failed to launch `{program}`: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected job error: {0}")]
    Unexpected(#[from] std::io::Error),
}

impl JobError {
    /// Configuration errors are checked pre-flight, before any child process
    /// is spawned.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            JobError::UnknownBackend(_) | JobError::MissingCredential { .. }
        )
    }
}

/// HTTP-facing error wrapper: status code plus a JSON error message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = if err.is_configuration() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
