use std::path::PathBuf;
use std::time::Duration;

use crate::backend::Backend;
use crate::error::JobError;

/// API credentials, read from the environment once at startup.
///
/// Credentials are carried explicitly on each request instead of being
/// written into the process environment, so a per-request key can never leak
/// into another job.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub deepl_auth_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: read_env("OPENAI_API_KEY"),
            deepl_auth_key: read_env("DEEPL_AUTH_KEY"),
        }
    }

    /// Look up a credential by the environment variable name the backend
    /// table uses.
    pub fn get(&self, var: &str) -> Option<&str> {
        match var {
            "OPENAI_API_KEY" => self.openai_api_key.as_deref(),
            "DEEPL_AUTH_KEY" => self.deepl_auth_key.as_deref(),
            _ => None,
        }
    }

    /// Apply a key submitted with the request, overriding the startup value
    /// for this job only. Blank input is ignored.
    pub fn with_override(mut self, backend: Backend, key: Option<String>) -> Self {
        let key = key.filter(|k| !k.trim().is_empty());
        if let (Some(var), Some(key)) = (backend.required_credential(), key) {
            match var {
                "OPENAI_API_KEY" => self.openai_api_key = Some(key),
                "DEEPL_AUTH_KEY" => self.deepl_auth_key = Some(key),
                _ => {}
            }
        }
        self
    }

    /// Pre-flight credential check for a backend, before anything is spawned.
    pub fn ensure_for(&self, backend: Backend) -> Result<(), JobError> {
        if let Some(var) = backend.required_credential() {
            if self.get(var).is_none() {
                return Err(JobError::MissingCredential {
                    backend: backend.name(),
                    var,
                });
            }
        }
        Ok(())
    }
}

fn read_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Server configuration, resolved once in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Name or path of the external translator executable.
    pub pdf2zh_bin: String,
    /// Where finished artifacts are copied for download.
    pub results_dir: PathBuf,
    /// Where uploads wait until the worker picks them up.
    pub uploads_dir: PathBuf,
    /// How long results and stale uploads are kept before GC.
    pub retention: Duration,
    pub credentials: Credentials,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3001);
        let pdf2zh_bin = std::env::var("PDF2ZH_BIN").unwrap_or_else(|_| "pdf2zh".to_string());
        let base = std::env::var("RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("pdf2zh-server"));
        let retention_hours = std::env::var("RESULTS_RETENTION_HOURS")
            .ok()
            .and_then(|h| h.parse().ok())
            .unwrap_or(24u64);

        Self {
            port,
            pdf2zh_bin,
            results_dir: base.join("results"),
            uploads_dir: base.join("uploads"),
            retention: Duration::from_secs(retention_hours * 60 * 60),
            credentials: Credentials::from_env(),
        }
    }
}
