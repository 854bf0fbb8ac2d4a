use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ─── AbstractSource ─────────────────────────────────────────

/// Tag identifying which external source supplied a paper's abstract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AbstractSource {
    #[serde(rename = "openreview")]
    OpenReview,
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(rename = "semantic_scholar")]
    SemanticScholar,
    #[serde(rename = "neurips_proceedings")]
    NeuripsProceedings,
}

impl AbstractSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenReview => "openreview",
            Self::OpenAlex => "openalex",
            Self::SemanticScholar => "semantic_scholar",
            Self::NeuripsProceedings => "neurips_proceedings",
        }
    }

    pub fn all() -> &'static [AbstractSource] {
        &[
            Self::OpenReview,
            Self::OpenAlex,
            Self::SemanticScholar,
            Self::NeuripsProceedings,
        ]
    }
}

impl fmt::Display for AbstractSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Enrichment ─────────────────────────────────────────────

/// Fields written by the enrichment engine. Written at most once per paper:
/// the first source that supplies an abstract owns all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(
        rename = "abstract",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_source: Option<AbstractSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,

    /// Source-specific external id (forum id, OpenAlex work id, S2 paper id, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl Enrichment {
    pub fn has_abstract(&self) -> bool {
        self.abstract_text
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

// ─── Paper ──────────────────────────────────────────────────

/// A bibliographic record for one conference paper.
///
/// Bibliographic fields and raw identifiers come from the upstream scraper and
/// are never touched by enrichment. Derived identifiers (`openreview_id`,
/// `proceedings_hash`, `proceedings_track`) are parsed from the raw ones or
/// recovered by lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Stable id within a conference-year. Derived from title and year when
    /// the upstream record carries none.
    #[serde(default)]
    pub id: String,

    pub title: String,
    pub year: i32,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    /// Record page on the bibliography index the paper was scraped from.
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub openreview_url: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub proceedings_url: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub openreview_id: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub proceedings_hash: Option<String>,

    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub proceedings_track: Option<String>,

    #[serde(flatten)]
    pub enrichment: Enrichment,
}

impl Paper {
    /// Create a paper with only bibliographic fields and a derived id.
    pub fn new(title: impl Into<String>, year: i32) -> Self {
        let title = title.into();
        Self {
            id: derive_paper_id(&title, year),
            title,
            year,
            authors: Vec::new(),
            venue: None,
            url: None,
            doi: None,
            openreview_url: None,
            proceedings_url: None,
            openreview_id: None,
            proceedings_hash: None,
            proceedings_track: None,
            enrichment: Enrichment::default(),
        }
    }

    pub fn has_abstract(&self) -> bool {
        self.enrichment.has_abstract()
    }

    /// Fill in `id` from title and year if the upstream record had none.
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = derive_paper_id(&self.title, self.year);
        }
    }

    /// Write enrichment fields unless an abstract is already present.
    /// Returns whether anything was written.
    pub fn apply_enrichment(&mut self, enrichment: Enrichment) -> bool {
        if self.has_abstract() || !enrichment.has_abstract() {
            return false;
        }
        self.enrichment = enrichment;
        true
    }
}

/// Derive missing ids and disambiguate collisions with a numeric suffix,
/// so every paper can be keyed on its own. Returns how many ids changed.
pub fn ensure_unique_ids(papers: &mut [Paper]) -> usize {
    let mut seen = HashSet::new();
    let mut renamed = 0;
    for paper in papers.iter_mut() {
        paper.ensure_id();
        if !seen.insert(paper.id.clone()) {
            let base = paper.id.clone();
            let mut n = 2;
            while !seen.insert(format!("{base}-{n}")) {
                n += 1;
            }
            paper.id = format!("{base}-{n}");
            renamed += 1;
        }
    }
    renamed
}

/// Stable paper id: UUID v5 over `"{year}:{normalized title}"`.
pub fn derive_paper_id(title: &str, year: i32) -> String {
    let key = format!("{year}:{}", normalize_title(title));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
        .simple()
        .to_string()
}

/// Lowercase, strip punctuation and collapse whitespace.
///
/// `"Deep  Learning: A Survey."` and `"deep learning a survey"` normalize equal.
pub fn normalize_title(title: &str) -> String {
    let mapped = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unique_ids_for_colliding_papers() {
        let mut papers = vec![
            Paper::new("Same Title", 2022),
            Paper::new("Same title.", 2022),
            Paper::new("Same Title", 2023),
        ];
        papers[2].id = "dblp:x".to_string();
        let mut clash = Paper::new("Other", 2022);
        clash.id = "dblp:x".to_string();
        papers.push(clash);

        assert_eq!(ensure_unique_ids(&mut papers), 2);
        assert_eq!(papers[1].id, format!("{}-2", papers[0].id));
        assert_eq!(papers[2].id, "dblp:x");
        assert_eq!(papers[3].id, "dblp:x-2");
        assert_eq!(ensure_unique_ids(&mut papers), 0);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("Deep  Learning: A Survey."),
            "deep learning a survey"
        );
        assert_eq!(normalize_title("  "), "");
    }

    #[test]
    fn test_derived_id_is_stable_across_formatting() {
        let a = derive_paper_id("Graph Neural Networks.", 2022);
        let b = derive_paper_id("graph neural networks", 2022);
        let c = derive_paper_id("graph neural networks", 2023);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_empty_identifier_strings_are_absent() {
        let paper: Paper = serde_json::from_value(json!({
            "title": "A Paper",
            "year": 2021,
            "authors": ["Ada Lovelace"],
            "venue": "KDD",
            "url": "",
            "doi": ""
        }))
        .unwrap();
        assert!(paper.doi.is_none());
        assert!(paper.url.is_none());
        assert_eq!(paper.venue.as_deref(), Some("KDD"));
        assert!(paper.id.is_empty());
        assert!(!paper.has_abstract());
    }

    #[test]
    fn test_enrichment_fields_serialize_flat() {
        let mut paper = Paper::new("A Paper", 2021);
        paper.apply_enrichment(Enrichment {
            abstract_text: Some("We study things.".to_string()),
            abstract_source: Some(AbstractSource::OpenAlex),
            citation_count: Some(7),
            source_id: Some("W123".to_string()),
        });

        let value = serde_json::to_value(&paper).unwrap();
        assert_eq!(value["abstract"], "We study things.");
        assert_eq!(value["abstract_source"], "openalex");
        assert_eq!(value["citation_count"], 7);
        assert!(value.get("doi").is_none());

        let back: Paper = serde_json::from_value(value).unwrap();
        assert_eq!(back, paper);
    }

    #[test]
    fn test_apply_enrichment_is_write_once() {
        let mut paper = Paper::new("A Paper", 2021);
        let first = Enrichment {
            abstract_text: Some("first".to_string()),
            abstract_source: Some(AbstractSource::OpenReview),
            ..Default::default()
        };
        let second = Enrichment {
            abstract_text: Some("second".to_string()),
            abstract_source: Some(AbstractSource::SemanticScholar),
            citation_count: Some(3),
            ..Default::default()
        };

        assert!(paper.apply_enrichment(first));
        assert!(!paper.apply_enrichment(second));
        assert_eq!(paper.enrichment.abstract_text.as_deref(), Some("first"));
        assert_eq!(
            paper.enrichment.abstract_source,
            Some(AbstractSource::OpenReview)
        );
        assert_eq!(paper.enrichment.citation_count, None);
    }

    #[test]
    fn test_blank_abstract_is_not_written() {
        let mut paper = Paper::new("A Paper", 2021);
        let blank = Enrichment {
            abstract_text: Some("   ".to_string()),
            abstract_source: Some(AbstractSource::OpenAlex),
            ..Default::default()
        };
        assert!(!paper.apply_enrichment(blank));
        assert_eq!(paper.enrichment, Enrichment::default());
    }
}
