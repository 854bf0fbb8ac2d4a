use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] confcloud_core::CoreError),
}

/// Outcome classes every source failure collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source has no record. Expected and silent.
    NotFound,
    Timeout,
    TransientError,
    /// The source answered with something we could not interpret.
    MalformedResponse,
    ConfigurationError,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::TransientError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::TransientError => "transient_error",
            Self::MalformedResponse => "malformed_response",
            Self::ConfigurationError => "configuration_error",
        };
        f.write_str(label)
    }
}

impl ScienceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Http(_) | Self::Transient(_) | Self::RateLimit(..) | Self::Io(_) => {
                ErrorKind::TransientError
            }
            Self::ApiError(..) | Self::Parse(_) | Self::Json(_) => ErrorKind::MalformedResponse,
            Self::InvalidDoi(_) | Self::Configuration(_) | Self::Core(_) => {
                ErrorKind::ConfigurationError
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classify a failed `send()`/body read.
    pub(crate) fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(url.to_string())
        } else {
            Self::Transient(format!("{url}: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ScienceError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ScienceError::Timeout("x".into()).kind(), ErrorKind::Timeout);
        assert_eq!(
            ScienceError::RateLimit("openalex".into(), 5).kind(),
            ErrorKind::TransientError
        );
        assert_eq!(
            ScienceError::ApiError("u".into(), "HTTP 400".into()).kind(),
            ErrorKind::MalformedResponse
        );
        assert_eq!(
            ScienceError::Configuration("bad".into()).kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn only_timeouts_and_transient_errors_retry() {
        assert!(ScienceError::Timeout("x".into()).is_retryable());
        assert!(ScienceError::Transient("x".into()).is_retryable());
        assert!(!ScienceError::NotFound("x".into()).is_retryable());
        assert!(!ScienceError::Parse("x".into()).is_retryable());
    }
}
