use std::fmt;

use async_trait::async_trait;
use confcloud_core::{AbstractSource, Paper};
use serde::{Deserialize, Serialize};

use crate::identifiers::{Doi, ProceedingsRef, RouteSet};
use crate::sources::{EnrichmentResult, ForumFetch, ForumSearch};

/// Resolution strategies, in the fixed order a run tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    OpenReviewSearch,
    OpenReviewFetch,
    BatchDoi,
    SingleDoi,
    Proceedings,
}

impl TierId {
    pub const ALL: [TierId; 5] = [
        Self::OpenReviewSearch,
        Self::OpenReviewFetch,
        Self::BatchDoi,
        Self::SingleDoi,
        Self::Proceedings,
    ];

    pub fn index(&self) -> u8 {
        match self {
            Self::OpenReviewSearch => 0,
            Self::OpenReviewFetch => 1,
            Self::BatchDoi => 2,
            Self::SingleDoi => 3,
            Self::Proceedings => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenReviewSearch => "openreview_search",
            Self::OpenReviewFetch => "openreview_fetch",
            Self::BatchDoi => "batch_doi",
            Self::SingleDoi => "single_doi",
            Self::Proceedings => "proceedings",
        }
    }

    /// Tag written next to abstracts this tier supplies. Title search only
    /// recovers forum ids.
    pub fn abstract_source(&self) -> Option<AbstractSource> {
        match self {
            Self::OpenReviewSearch => None,
            Self::OpenReviewFetch => Some(AbstractSource::OpenReview),
            Self::BatchDoi => Some(AbstractSource::OpenAlex),
            Self::SingleDoi => Some(AbstractSource::SemanticScholar),
            Self::Proceedings => Some(AbstractSource::NeuripsProceedings),
        }
    }

    pub fn for_source(source: AbstractSource) -> Self {
        match source {
            AbstractSource::OpenReview => Self::OpenReviewFetch,
            AbstractSource::OpenAlex => Self::BatchDoi,
            AbstractSource::SemanticScholar => Self::SingleDoi,
            AbstractSource::NeuripsProceedings => Self::Proceedings,
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {} ({})", self.index(), self.label())
    }
}

/// Read-only view of one unresolved paper handed to a tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub paper_id: String,
    pub title: String,
    pub venue: Option<String>,
    pub year: i32,
    pub routes: RouteSet,
}

impl LookupRequest {
    pub fn new(paper: &Paper, routes: impl Into<RouteSet>) -> Self {
        Self {
            paper_id: paper.id.clone(),
            title: paper.title.clone(),
            venue: paper.venue.clone(),
            year: paper.year,
            routes: routes.into(),
        }
    }

    pub fn forum_search(&self) -> Option<ForumSearch> {
        self.routes.needs_title_search().then(|| ForumSearch {
            title: self.title.clone(),
            venue: self.venue.clone(),
        })
    }

    pub fn forum_fetch(&self) -> Option<ForumFetch> {
        self.routes.forum_id().map(|id| ForumFetch {
            forum_id: id.to_string(),
            year: self.year,
        })
    }

    pub fn doi(&self) -> Option<Doi> {
        self.routes.doi().cloned()
    }

    pub fn proceedings(&self) -> Option<ProceedingsRef> {
        self.routes.proceedings().cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub paper_id: String,
    pub result: EnrichmentResult,
}

/// Outcome of one tier over its pending papers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierPass {
    pub resolved: Vec<Resolution>,
    /// Attempted without success; the result says whether it was a miss or a
    /// failure.
    pub still_pending: Vec<Resolution>,
    /// Never attempted because the tier's breaker tripped.
    pub skipped: Vec<String>,
}

impl TierPass {
    pub fn push(&mut self, paper_id: impl Into<String>, result: EnrichmentResult) {
        let resolution = Resolution {
            paper_id: paper_id.into(),
            result,
        };
        if resolution.result.found {
            self.resolved.push(resolution);
        } else {
            self.still_pending.push(resolution);
        }
    }

    pub fn attempted(&self) -> usize {
        self.resolved.len() + self.still_pending.len()
    }
}

/// Uniform contract every tier implements, batch or not.
#[async_trait]
pub trait TierResolver: Send + Sync {
    fn tier(&self) -> TierId;

    async fn resolve(&self, pending: Vec<LookupRequest>) -> TierPass;
}
