use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use confcloud_core::AppConfig;
use reqwest::Url;
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{RateLimitedClient, SourceTag};
use crate::identifiers::Doi;
use crate::sources::{BatchSourceAdapter, EnrichmentResult, unresolved};

/// Upper bound on DOIs per filter expression.
pub const MAX_BATCH: usize = 100;
const SELECT_FIELDS: &str = "id,doi,cited_by_count,abstract_inverted_index";
const WORK_ID_PREFIX: &str = "https://openalex.org/";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenAlexWork {
    pub id: String,
    pub doi: Option<String>,
    pub cited_by_count: Option<u32>,
    pub abstract_inverted_index: Option<HashMap<String, Vec<u32>>>,
}

impl OpenAlexWork {
    pub fn from_json(v: &Value) -> Self {
        let id = v
            .get("id")
            .and_then(Value::as_str)
            .map(|s| s.trim_start_matches(WORK_ID_PREFIX).to_string())
            .unwrap_or_default();

        let doi = v.get("doi").and_then(Value::as_str).map(ToOwned::to_owned);

        let cited_by_count = v
            .get("cited_by_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());

        let abstract_inverted_index = v
            .get("abstract_inverted_index")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(token, positions)| {
                        let values = positions
                            .as_array()?
                            .iter()
                            .filter_map(Value::as_u64)
                            .filter_map(|n| u32::try_from(n).ok())
                            .collect::<Vec<_>>();
                        if values.is_empty() {
                            None
                        } else {
                            Some((token.clone(), values))
                        }
                    })
                    .collect::<HashMap<_, _>>()
            });

        Self {
            id,
            doi,
            cited_by_count,
            abstract_inverted_index,
        }
    }

    pub fn abstract_text(&self) -> Option<String> {
        self.abstract_inverted_index
            .as_ref()
            .and_then(reconstruct_abstract)
    }

    /// Normalized DOI, for matching a work back to its request.
    pub fn doi_key(&self) -> Option<String> {
        self.doi
            .as_deref()
            .and_then(|raw| Doi::parse(raw).ok())
            .map(|doi| doi.normalized)
    }
}

/// Rebuild text from a word → positions index by sorting every
/// (position, word) pair on position. Ties fall back to the word so the
/// output does not depend on map iteration order.
pub fn reconstruct_abstract(index: &HashMap<String, Vec<u32>>) -> Option<String> {
    let mut pairs = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&pos| (pos, word.as_str())))
        .collect::<Vec<_>>();
    pairs.sort_unstable();

    let text = pairs
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ");

    let text = text.trim();
    if text.is_empty() { None } else { Some(text.to_string()) }
}

pub struct OpenAlexSource {
    client: Arc<RateLimitedClient>,
    base_url: String,
    polite_email: Option<String>,
}

impl OpenAlexSource {
    pub fn new(
        client: Arc<RateLimitedClient>,
        base_url: impl Into<String>,
        polite_email: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            polite_email,
        }
    }

    pub fn from_config(client: Arc<RateLimitedClient>, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.sources.openalex.base_url.clone(),
            config.enrichment.polite_email.clone(),
        )
    }

    fn works_url(&self, dois: &[Doi]) -> Result<Url> {
        let filter = format!(
            "doi:{}",
            dois.iter()
                .map(|d| d.normalized.as_str())
                .collect::<Vec<_>>()
                .join("|")
        );
        let per_page = dois.len().to_string();
        let mut params = vec![
            ("filter", filter.as_str()),
            ("per-page", per_page.as_str()),
            ("select", SELECT_FIELDS),
        ];
        if let Some(email) = self.polite_email.as_deref().filter(|e| !e.trim().is_empty()) {
            params.push(("mailto", email));
        }

        let raw = format!("{}/works", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(&raw, &params)
            .map_err(|e| ScienceError::Configuration(format!("bad OpenAlex URL {raw}: {e}")))
    }

    /// One filter call for up to [`MAX_BATCH`] DOIs.
    pub async fn fetch_works(&self, dois: &[Doi]) -> Result<Vec<OpenAlexWork>> {
        if dois.is_empty() {
            return Ok(Vec::new());
        }
        if dois.len() > MAX_BATCH {
            return Err(ScienceError::Configuration(format!(
                "OpenAlex accepts at most {MAX_BATCH} DOIs per call, got {}",
                dois.len()
            )));
        }

        let url = self.works_url(dois)?;
        let body: Value = self.client.get_json(SourceTag::OpenAlex, url.as_str()).await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| ScienceError::Parse("OpenAlex response without results".to_string()))?;

        Ok(results.iter().map(OpenAlexWork::from_json).collect())
    }
}

#[async_trait]
impl BatchSourceAdapter<Doi> for OpenAlexSource {
    fn source(&self) -> SourceTag {
        SourceTag::OpenAlex
    }

    fn request_key(&self, request: &Doi) -> String {
        request.normalized.clone()
    }

    async fn resolve_batch(&self, requests: &[Doi]) -> HashMap<String, EnrichmentResult> {
        let works = match self.fetch_works(requests).await {
            Ok(works) => works,
            Err(e) => {
                let key = format!("batch of {} DOIs", requests.len());
                let failed = unresolved(SourceTag::OpenAlex, &key, &e);
                return requests
                    .iter()
                    .map(|doi| (doi.normalized.clone(), failed.clone()))
                    .collect();
            }
        };

        let mut by_doi = works
            .into_iter()
            .filter_map(|work| work.doi_key().map(|key| (key, work)))
            .collect::<HashMap<_, _>>();

        requests
            .iter()
            .map(|doi| {
                let result = match by_doi.remove(&doi.normalized) {
                    Some(work) => EnrichmentResult::from_abstract(
                        work.abstract_text(),
                        work.cited_by_count,
                        Some(work.id).filter(|id| !id.is_empty()),
                    ),
                    None => EnrichmentResult::not_found(),
                };
                (doi.normalized.clone(), result)
            })
            .collect()
    }
}
