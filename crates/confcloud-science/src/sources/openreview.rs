use std::sync::Arc;

use async_trait::async_trait;
use confcloud_core::{AppConfig, normalize_title};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::http::{RateLimitedClient, SourceTag};
use crate::sources::{EnrichmentResult, SourceAdapter, normalize_whitespace, unresolved};

const SEARCH_LIMIT: &str = "10";
/// Keys the short-summary field appears under, in order of preference.
const SUMMARY_KEYS: [&str; 3] = ["TL;DR", "TLDR", "tldr"];

/// OpenReview API generation. Generation 1 serves content fields as plain
/// strings, generation 2 wraps each one as `{"value": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    V1,
    V2,
}

impl ApiGeneration {
    /// The threshold year itself belongs to generation 2.
    pub fn for_year(year: i32, v2_from_year: i32) -> Self {
        if year >= v2_from_year { Self::V2 } else { Self::V1 }
    }

    fn content_text(&self, content: &Value, key: &str) -> Option<String> {
        let field = content.get(key)?;
        let text = match self {
            Self::V1 => field.as_str(),
            Self::V2 => field.get("value").and_then(Value::as_str),
        }?;
        let text = normalize_whitespace(text);
        (!text.is_empty()).then_some(text)
    }
}

/// Tier 0 request: recover a forum id from a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumSearch {
    pub title: String,
    pub venue: Option<String>,
}

/// Tier 1 request: fetch a submission by forum id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumFetch {
    pub forum_id: String,
    pub year: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenReviewNote {
    pub id: String,
    pub forum: Option<String>,
    pub title: Option<String>,
    pub venue: Option<String>,
    pub abstract_text: Option<String>,
    pub summary: Option<String>,
}

impl OpenReviewNote {
    pub fn from_json(v: &Value, generation: ApiGeneration) -> Self {
        let id = v
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let forum = v
            .get("forum")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let content = v.get("content").cloned().unwrap_or(Value::Null);
        let title = generation.content_text(&content, "title");
        let venue = generation
            .content_text(&content, "venue")
            .or_else(|| generation.content_text(&content, "venueid"));
        let abstract_text = generation.content_text(&content, "abstract");
        let summary = SUMMARY_KEYS
            .iter()
            .find_map(|key| generation.content_text(&content, key));

        Self {
            id,
            forum,
            title,
            venue,
            abstract_text,
            summary,
        }
    }

    /// The abstract, or the short summary when a venue only asked for that.
    pub fn abstract_or_summary(&self) -> Option<String> {
        self.abstract_text.clone().or_else(|| self.summary.clone())
    }

    pub fn forum_id(&self) -> &str {
        self.forum.as_deref().unwrap_or(&self.id)
    }
}

pub struct OpenReviewSource {
    client: Arc<RateLimitedClient>,
    v1_base_url: String,
    v2_base_url: String,
    v2_from_year: i32,
}

impl OpenReviewSource {
    pub fn new(
        client: Arc<RateLimitedClient>,
        v1_base_url: impl Into<String>,
        v2_base_url: impl Into<String>,
        v2_from_year: i32,
    ) -> Self {
        Self {
            client,
            v1_base_url: v1_base_url.into(),
            v2_base_url: v2_base_url.into(),
            v2_from_year,
        }
    }

    pub fn from_config(client: Arc<RateLimitedClient>, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.sources.openreview.base_url.clone(),
            config.sources.openreview_v2_base_url.clone(),
            config.enrichment.openreview_v2_from_year,
        )
    }

    pub fn generation(&self, year: i32) -> ApiGeneration {
        ApiGeneration::for_year(year, self.v2_from_year)
    }

    fn endpoint(&self, generation: ApiGeneration, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let base = match generation {
            ApiGeneration::V1 => &self.v1_base_url,
            ApiGeneration::V2 => &self.v2_base_url,
        };
        let raw = format!("{}/{path}", base.trim_end_matches('/'));
        Url::parse_with_params(&raw, params)
            .map_err(|e| ScienceError::Configuration(format!("bad OpenReview URL {raw}: {e}")))
    }

    /// Fetch the submission note of a forum, through the generation that
    /// serves `year`.
    pub async fn fetch_forum(&self, forum_id: &str, year: i32) -> Result<OpenReviewNote> {
        let generation = self.generation(year);
        let url = self.endpoint(generation, "notes", &[("forum", forum_id)])?;
        let body: Value = self.client.get_json(SourceTag::OpenReview, url.as_str()).await?;

        let notes = body
            .get("notes")
            .and_then(Value::as_array)
            .ok_or_else(|| ScienceError::Parse(format!("no notes array for forum {forum_id}")))?;

        let note = notes
            .iter()
            .find(|n| n.get("id").and_then(Value::as_str) == Some(forum_id))
            .or_else(|| notes.first())
            .ok_or_else(|| ScienceError::NotFound(format!("openreview forum {forum_id}")))?;

        Ok(OpenReviewNote::from_json(note, generation))
    }

    /// Forum id of the search hit whose title normalizes equal to `title`.
    /// Among several such hits one whose venue mentions `venue` is preferred.
    pub async fn search_forum(&self, title: &str, venue: Option<&str>) -> Result<Option<String>> {
        let wanted = normalize_title(title);
        if wanted.is_empty() {
            return Ok(None);
        }

        let url = self.endpoint(
            ApiGeneration::V2,
            "notes/search",
            &[
                ("term", title.trim()),
                ("type", "terms"),
                ("content", "all"),
                ("group", "all"),
                ("source", "forum"),
                ("limit", SEARCH_LIMIT),
            ],
        )?;
        let body: Value = self.client.get_json(SourceTag::OpenReview, url.as_str()).await?;

        let notes = body
            .get("notes")
            .and_then(Value::as_array)
            .ok_or_else(|| ScienceError::Parse(format!("no notes array searching {title:?}")))?;

        let matches = notes
            .iter()
            .map(|n| OpenReviewNote::from_json(n, ApiGeneration::V2))
            .filter(|n| n.title.as_deref().map(normalize_title).as_deref() == Some(wanted.as_str()))
            .collect::<Vec<_>>();

        let venue = venue
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());
        let best = venue
            .and_then(|venue| {
                matches.iter().find(|n| {
                    n.venue
                        .as_deref()
                        .is_some_and(|nv| nv.to_lowercase().contains(&venue))
                })
            })
            .or_else(|| matches.first());

        Ok(best.map(|n| n.forum_id().to_string()))
    }
}

#[async_trait]
impl SourceAdapter<ForumSearch> for OpenReviewSource {
    fn source(&self) -> SourceTag {
        SourceTag::OpenReview
    }

    async fn resolve(&self, request: &ForumSearch) -> EnrichmentResult {
        match self.search_forum(&request.title, request.venue.as_deref()).await {
            Ok(Some(forum_id)) => EnrichmentResult::identified(forum_id),
            Ok(None) => {
                debug!("openreview: no title match for {:?}", request.title);
                EnrichmentResult::not_found()
            }
            Err(e) => unresolved(SourceTag::OpenReview, &request.title, &e),
        }
    }
}

#[async_trait]
impl SourceAdapter<ForumFetch> for OpenReviewSource {
    fn source(&self) -> SourceTag {
        SourceTag::OpenReview
    }

    async fn resolve(&self, request: &ForumFetch) -> EnrichmentResult {
        match self.fetch_forum(&request.forum_id, request.year).await {
            Ok(note) => EnrichmentResult::from_abstract(
                note.abstract_or_summary(),
                None,
                Some(request.forum_id.clone()),
            ),
            Err(e) => unresolved(SourceTag::OpenReview, &request.forum_id, &e),
        }
    }
}
