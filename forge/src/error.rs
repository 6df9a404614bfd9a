//! Typed failure taxonomy for a forge run.
//!
//! Functions propagate these through `anyhow::Result`; orchestration code
//! classifies them with `downcast_ref` to decide between aborting the run and
//! folding the failure into the retry loop.

use std::path::PathBuf;

use thiserror::Error;

/// Generation credentials or backend settings are missing. Fatal, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// No structured payload could be recovered from generation text after every
/// extraction strategy was tried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not extract {what} from generation output: {detail}")]
pub struct ExtractionError {
    pub what: String,
    pub detail: String,
}

/// An artifact that cannot be written so that parsing it gives it back unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactEncodingError {
    #[error("artifact has no actions")]
    NoActions,
    #[error("action {index} contains artifact protocol markup")]
    MarkupInContent { index: usize },
    #[error("action {index} would not parse back unchanged")]
    NotReversible { index: usize },
}

/// A structured payload was extracted but does not satisfy its schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{what} failed schema validation: {}", .errors.join("; "))]
pub struct SchemaValidationFailure {
    pub what: String,
    pub errors: Vec<String>,
    /// Where the raw generation text was persisted for diagnosis, if anywhere.
    pub raw_path: Option<PathBuf>,
}

/// Classification of generation-service failures, used for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    RateLimit,
    Quota,
    Generic,
}

/// Transport or quota failure reported by the generation service. Ends the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("generation service error ({kind:?}): {message}")]
pub struct GenerationServiceError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationServiceError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Generic,
            message: message.into(),
        }
    }

    /// Classify a provider failure from its diagnostic text.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let kind = if lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("too many requests")
            || lower.contains("429")
        {
            GenerationErrorKind::RateLimit
        } else if lower.contains("quota")
            || lower.contains("billing")
            || lower.contains("insufficient")
        {
            GenerationErrorKind::Quota
        } else {
            GenerationErrorKind::Generic
        };
        Self { kind, message }
    }

    /// Short message suitable for surfacing to whoever started the run.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            GenerationErrorKind::RateLimit => {
                "the generation provider is rate limiting requests; try again shortly"
            }
            GenerationErrorKind::Quota => "the generation provider quota is exhausted",
            GenerationErrorKind::Generic => "the generation provider request failed",
        }
    }
}

/// True if `err` must terminate a run instead of being absorbed by retry/escalate.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ConfigurationError>().is_some()
        || err.downcast_ref::<GenerationServiceError>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_rate_limit_and_quota() {
        assert_eq!(
            GenerationServiceError::classify("HTTP 429 Too Many Requests").kind,
            GenerationErrorKind::RateLimit
        );
        assert_eq!(
            GenerationServiceError::classify("insufficient_quota for this key").kind,
            GenerationErrorKind::Quota
        );
        assert_eq!(
            GenerationServiceError::classify("connection reset").kind,
            GenerationErrorKind::Generic
        );
    }

    #[test]
    fn fatal_errors_survive_context_wrapping() {
        let err = anyhow::Error::new(GenerationServiceError::generic("boom")).context("generate");
        assert!(is_fatal(&err));

        let err = anyhow::Error::new(ExtractionError {
            what: "artifact".to_string(),
            detail: "no actions".to_string(),
        });
        assert!(!is_fatal(&err));
    }
}
