use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ScienceError};
use crate::http::SourceTag;

pub mod openalex;
pub mod openreview;
pub mod proceedings;
pub mod semantic_scholar;

pub use openalex::OpenAlexSource;
pub use openreview::{ApiGeneration, ForumFetch, ForumSearch, OpenReviewSource};
pub use proceedings::{ProceedingsPage, ProceedingsSource};
pub use semantic_scholar::SemanticScholarSource;

/// Normalized outcome of one adapter call for one paper.
///
/// Never carries a hard failure: errors collapse into an [`ErrorKind`] and
/// leave the paper unresolved for the next tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentResult {
    pub found: bool,
    pub abstract_text: Option<String>,
    pub citation_count: Option<u32>,
    pub external_id: Option<String>,
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Found,
    NotFound,
    Failed(ErrorKind),
}

impl EnrichmentResult {
    /// Found only if the abstract has visible text.
    pub fn from_abstract(
        abstract_text: Option<String>,
        citation_count: Option<u32>,
        external_id: Option<String>,
    ) -> Self {
        let abstract_text = abstract_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        match abstract_text {
            Some(text) => Self {
                found: true,
                abstract_text: Some(text),
                citation_count,
                external_id,
                error: None,
            },
            None => Self::not_found(),
        }
    }

    /// An identifier was recovered but no abstract (title search).
    pub fn identified(external_id: impl Into<String>) -> Self {
        Self {
            found: true,
            external_id: Some(external_id.into()),
            ..Default::default()
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            error: Some(kind),
            ..Default::default()
        }
    }

    pub fn from_error(err: &ScienceError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::not_found(),
            kind => Self::failed(kind),
        }
    }

    pub fn status(&self) -> ResultStatus {
        if self.found {
            return ResultStatus::Found;
        }
        match self.error {
            Some(ErrorKind::NotFound) | None => ResultStatus::NotFound,
            Some(kind) => ResultStatus::Failed(kind),
        }
    }
}

/// One request in, one result out.
#[async_trait]
pub trait SourceAdapter<R: Sync>: Send + Sync {
    fn source(&self) -> SourceTag;

    async fn resolve(&self, request: &R) -> EnrichmentResult;
}

/// Many requests per call; results keyed by [`BatchSourceAdapter::request_key`].
/// Keys absent from the returned map are unresolved.
#[async_trait]
pub trait BatchSourceAdapter<R: Sync>: Send + Sync {
    fn source(&self) -> SourceTag;

    fn request_key(&self, request: &R) -> String;

    async fn resolve_batch(&self, requests: &[R]) -> HashMap<String, EnrichmentResult>;
}

/// Turn an adapter error into an unresolved result, logging by severity.
/// 404s stay at debug.
pub(crate) fn unresolved(source: SourceTag, key: &str, err: &ScienceError) -> EnrichmentResult {
    match err.kind() {
        ErrorKind::NotFound => debug!("{source}: no record for {key}"),
        ErrorKind::MalformedResponse => warn!("{source}: malformed response for {key}: {err}"),
        kind => warn!("{source}: {kind} for {key}: {err}"),
    }
    EnrichmentResult::from_error(err)
}

pub(crate) fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
