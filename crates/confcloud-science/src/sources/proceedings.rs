use std::sync::Arc;

use async_trait::async_trait;
use confcloud_core::AppConfig;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{Result, ScienceError};
use crate::http::{RateLimitedClient, SourceTag};
use crate::identifiers::ProceedingsRef;
use crate::sources::{EnrichmentResult, SourceAdapter, normalize_whitespace, unresolved};

/// What a proceedings abstract page tells us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProceedingsPage {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    pub abstract_text: Option<String>,
}

pub struct ProceedingsSource {
    client: Arc<RateLimitedClient>,
    base_url: String,
}

impl ProceedingsSource {
    pub fn new(client: Arc<RateLimitedClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(client: Arc<RateLimitedClient>, config: &AppConfig) -> Self {
        Self::new(client, config.sources.proceedings.base_url.clone())
    }

    pub fn page_url(&self, reference: &ProceedingsRef) -> String {
        format!(
            "{}/paper_files/paper/{}/hash/{}-Abstract-{}.html",
            self.base_url.trim_end_matches('/'),
            reference.year,
            reference.hash,
            reference.track
        )
    }

    pub async fn fetch_page(&self, reference: &ProceedingsRef) -> Result<ProceedingsPage> {
        let url = self.page_url(reference);
        let html = self.client.get(SourceTag::Proceedings, &url).await?;
        parse_page(&html)
    }
}

/// Citation meta tags plus the abstract: the first non-empty paragraph after
/// the `h4` reading exactly "Abstract", up to the next heading.
pub fn parse_page(html: &str) -> Result<ProceedingsPage> {
    let title_selector = parse_selector(r#"meta[name="citation_title"]"#)?;
    let author_selector = parse_selector(r#"meta[name="citation_author"]"#)?;
    let pdf_selector = parse_selector(r#"meta[name="citation_pdf_url"]"#)?;
    let heading_selector = parse_selector("h4")?;

    let document = Html::parse_document(html);

    let meta_content = |selector: &Selector| -> Vec<String> {
        document
            .select(selector)
            .filter_map(|el| el.value().attr("content"))
            .map(normalize_whitespace)
            .filter(|s| !s.is_empty())
            .collect()
    };

    let title = meta_content(&title_selector).into_iter().next();
    let authors = meta_content(&author_selector);
    let pdf_url = meta_content(&pdf_selector).into_iter().next();

    let abstract_text = document
        .select(&heading_selector)
        .find(|h| element_text(h) == "Abstract")
        .and_then(|heading| {
            heading
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take_while(|el| !is_heading(el))
                .filter(|el| el.value().name() == "p")
                .map(|el| element_text(&el))
                .find(|text| !text.is_empty())
        });

    Ok(ProceedingsPage {
        title,
        authors,
        pdf_url,
        abstract_text,
    })
}

fn is_heading(element: &ElementRef<'_>) -> bool {
    matches!(element.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn parse_selector(input: &str) -> Result<Selector> {
    Selector::parse(input)
        .map_err(|e| ScienceError::Parse(format!("invalid selector {input}: {e}")))
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

#[async_trait]
impl SourceAdapter<ProceedingsRef> for ProceedingsSource {
    fn source(&self) -> SourceTag {
        SourceTag::Proceedings
    }

    async fn resolve(&self, request: &ProceedingsRef) -> EnrichmentResult {
        match self.fetch_page(request).await {
            Ok(page) => {
                debug!(
                    "proceedings {}: {:?} by {} authors, pdf {:?}, abstract {}",
                    request.hash,
                    page.title.as_deref().unwrap_or("untitled"),
                    page.authors.len(),
                    page.pdf_url,
                    if page.abstract_text.is_some() { "present" } else { "missing" }
                );
                EnrichmentResult::from_abstract(page.abstract_text, None, Some(request.hash.clone()))
            }
            Err(e) => unresolved(SourceTag::Proceedings, &request.hash, &e),
        }
    }
}
