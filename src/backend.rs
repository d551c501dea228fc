use std::time::Duration;

use crate::error::JobError;

/// Timeout for API-backed services (OpenAI, Google, DeepL).
const API_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for Ollama. Local models are far slower than the hosted APIs.
const LOCAL_TIMEOUT: Duration = Duration::from_secs(1800);

/// A translation backend the external `pdf2zh` tool can drive.
///
/// The per-backend timeout here is the single authoritative value: it is
/// passed to the tool as `--timeout` and it bounds the runner's own deadline,
/// so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    Google,
    DeepL,
    Ollama,
}

impl Backend {
    /// Parse the backend identifier as submitted by the form.
    pub fn parse(id: &str) -> Result<Self, JobError> {
        match id {
            "OpenAI" => Ok(Backend::OpenAi),
            "Google" => Ok(Backend::Google),
            "DeepL" => Ok(Backend::DeepL),
            "Ollama" => Ok(Backend::Ollama),
            other => Err(JobError::UnknownBackend(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::OpenAi => "OpenAI",
            Backend::Google => "Google",
            Backend::DeepL => "DeepL",
            Backend::Ollama => "Ollama",
        }
    }

    /// The `--service` argument understood by `pdf2zh`.
    pub fn service_arg(self) -> &'static str {
        match self {
            Backend::OpenAi => "openai:gpt-4",
            Backend::Google => "google",
            Backend::DeepL => "deepl",
            Backend::Ollama => "ollama:gemma2",
        }
    }

    /// Environment variable the backend's credential lives in, if it needs one.
    pub fn required_credential(self) -> Option<&'static str> {
        match self {
            Backend::OpenAi => Some("OPENAI_API_KEY"),
            Backend::DeepL => Some("DEEPL_AUTH_KEY"),
            Backend::Google | Backend::Ollama => None,
        }
    }

    pub fn timeout(self) -> Duration {
        match self {
            Backend::Ollama => LOCAL_TIMEOUT,
            _ => API_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_known_backends() {
        assert_eq!(Backend::parse("OpenAI").unwrap(), Backend::OpenAi);
        assert_eq!(Backend::parse("Google").unwrap(), Backend::Google);
        assert_eq!(Backend::parse("DeepL").unwrap(), Backend::DeepL);
        assert_eq!(Backend::parse("Ollama").unwrap(), Backend::Ollama);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert_matches!(
            Backend::parse("Bing"),
            Err(JobError::UnknownBackend(id)) if id == "Bing"
        );
        // Matching is exact; lowercase is not accepted.
        assert_matches!(Backend::parse("google"), Err(JobError::UnknownBackend(_)));
    }

    #[test]
    fn service_args_match_the_tool_contract() {
        assert_eq!(Backend::OpenAi.service_arg(), "openai:gpt-4");
        assert_eq!(Backend::Google.service_arg(), "google");
        assert_eq!(Backend::DeepL.service_arg(), "deepl");
        assert_eq!(Backend::Ollama.service_arg(), "ollama:gemma2");
    }

    #[test]
    fn only_api_key_backends_require_credentials() {
        assert_eq!(Backend::OpenAi.required_credential(), Some("OPENAI_API_KEY"));
        assert_eq!(Backend::DeepL.required_credential(), Some("DEEPL_AUTH_KEY"));
        assert_eq!(Backend::Google.required_credential(), None);
        assert_eq!(Backend::Ollama.required_credential(), None);
    }

    #[test]
    fn local_backend_gets_the_longer_timeout() {
        assert!(Backend::Ollama.timeout() > Backend::Google.timeout());
        assert_eq!(Backend::Google.timeout(), Backend::DeepL.timeout());
    }
}
