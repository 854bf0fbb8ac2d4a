use std::sync::Arc;

use async_trait::async_trait;
use confcloud_core::AppConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{RateLimitedClient, SourceTag};
use crate::identifiers::Doi;
use crate::sources::{EnrichmentResult, SourceAdapter, unresolved};

const PAPER_FIELDS: &str = "paperId,abstract,citationCount";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S2Paper {
    pub paper_id: Option<String>,
    pub abstract_text: Option<String>,
    pub citation_count: Option<u32>,
}

impl S2Paper {
    pub fn from_json(v: &Value) -> Self {
        let paper_id = v
            .get("paperId")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let abstract_text = v
            .get("abstract")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let citation_count = v
            .get("citationCount")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());

        Self {
            paper_id,
            abstract_text,
            citation_count,
        }
    }
}

pub struct SemanticScholarSource {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(
        client: Arc<RateLimitedClient>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }

    /// The API key is read from the environment variable the config names.
    pub fn from_config(client: Arc<RateLimitedClient>, config: &AppConfig) -> Self {
        let api_key = std::env::var(&config.enrichment.semantic_scholar_api_key_env).ok();
        Self::new(client, config.sources.semantic_scholar.base_url.clone(), api_key)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ScienceError::Configuration(format!("bad API key: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }

    pub async fn fetch_by_doi(&self, doi: &Doi) -> Result<S2Paper> {
        let url = format!(
            "{}/paper/DOI:{}?fields={PAPER_FIELDS}",
            self.base_url.trim_end_matches('/'),
            doi.normalized
        );
        let headers = self.auth_headers()?;
        let text = self
            .client
            .get_with_headers(SourceTag::SemanticScholar, &url, headers)
            .await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))?;
        if !value.is_object() {
            return Err(ScienceError::Parse(format!(
                "expected a paper object for {}",
                doi.normalized
            )));
        }
        Ok(S2Paper::from_json(&value))
    }
}

#[async_trait]
impl SourceAdapter<Doi> for SemanticScholarSource {
    fn source(&self) -> SourceTag {
        SourceTag::SemanticScholar
    }

    async fn resolve(&self, request: &Doi) -> EnrichmentResult {
        match self.fetch_by_doi(request).await {
            Ok(paper) => EnrichmentResult::from_abstract(
                paper.abstract_text,
                paper.citation_count,
                paper.paper_id,
            ),
            Err(e) => unresolved(SourceTag::SemanticScholar, &request.normalized, &e),
        }
    }
}
