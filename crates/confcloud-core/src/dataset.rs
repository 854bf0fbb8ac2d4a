use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Paper, ensure_unique_ids};

/// Header the scraper writes in front of a conference's paper list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetMetadata {
    pub conference: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    pub categories: Vec<String>,
    pub years: Vec<i32>,
    pub total_papers: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A conference's paper list as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperDataset {
    #[serde(default)]
    pub metadata: DatasetMetadata,
    pub papers: Vec<Paper>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Wrapped(PaperDataset),
    Bare(Vec<Paper>),
}

impl PaperDataset {
    pub fn new(conference: impl Into<String>, papers: Vec<Paper>) -> Self {
        let mut years = papers.iter().map(|p| p.year).collect::<Vec<_>>();
        years.sort_unstable();
        years.dedup();
        Self {
            metadata: DatasetMetadata {
                conference: conference.into(),
                years,
                total_papers: papers.len(),
                ..Default::default()
            },
            papers,
        }
    }

    /// Load a dataset file. Accepts both the wrapped `{metadata, papers}`
    /// layout and a bare array of papers.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let mut dataset = match serde_json::from_str::<DatasetFile>(contents)? {
            DatasetFile::Wrapped(dataset) => dataset,
            DatasetFile::Bare(papers) => Self {
                metadata: DatasetMetadata::default(),
                papers,
            },
        };
        dataset.ensure_unique_ids();
        Ok(dataset)
    }

    /// Save as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Derive missing ids and disambiguate collisions, so every paper can
    /// be keyed in a checkpoint.
    pub fn ensure_unique_ids(&mut self) {
        ensure_unique_ids(&mut self.papers);
        self.metadata.total_papers = self.papers.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_wrapped_dataset() {
        let json = r#"{
            "metadata": {
                "conference": "KDD",
                "full_name": "ACM SIGKDD Conference on Knowledge Discovery and Data Mining",
                "categories": ["Data Mining"],
                "years": [2020, 2021],
                "total_papers": 2,
                "fetched_at": "2025-01-01",
                "source": "DBLP"
            },
            "papers": [
                {"title": "First Paper.", "year": 2020, "authors": ["A"], "venue": "KDD",
                 "url": "https://dblp.org/rec/conf/kdd/A20", "doi": "10.1145/1"},
                {"title": "Second Paper.", "year": 2021, "authors": ["B"], "venue": "KDD",
                 "url": "", "doi": ""}
            ]
        }"#;

        let dataset = PaperDataset::from_json_str(json).unwrap();
        assert_eq!(dataset.metadata.conference, "KDD");
        assert_eq!(dataset.papers.len(), 2);
        assert_eq!(dataset.papers[0].doi.as_deref(), Some("10.1145/1"));
        assert!(dataset.papers[1].doi.is_none());
        assert!(dataset.papers.iter().all(|p| !p.id.is_empty()));
    }

    #[test]
    fn test_load_bare_array() {
        let json = r#"[{"title": "Only Paper", "year": 2022}]"#;
        let dataset = PaperDataset::from_json_str(json).unwrap();
        assert_eq!(dataset.papers.len(), 1);
        assert_eq!(dataset.metadata.total_papers, 1);
        assert!(dataset.metadata.conference.is_empty());
    }

    #[test]
    fn test_duplicate_titles_get_distinct_ids() {
        let json = r#"[
            {"title": "Same Title", "year": 2022},
            {"title": "Same title.", "year": 2022},
            {"title": "Same Title", "year": 2022, "id": "dblp:explicit"}
        ]"#;
        let dataset = PaperDataset::from_json_str(json).unwrap();
        let ids = dataset.papers.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids[1], format!("{}-2", ids[0]));
        assert_eq!(ids[2], "dblp:explicit");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw").join("kdd_papers.json");

        let mut paper = Paper::new("Saved Paper", 2023);
        paper.doi = Some("10.1145/42".to_string());
        let dataset = PaperDataset::new("KDD", vec![paper]);
        dataset.save(&path).unwrap();

        let loaded = PaperDataset::load(&path).unwrap();
        assert_eq!(loaded, dataset);
        assert_eq!(loaded.metadata.years, vec![2023]);
    }
}
