use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use confcloud_core::{Enrichment, Paper};
use serde::{Deserialize, Serialize};

use crate::enrichment::tier::TierId;
use crate::error::Result;

/// What a run learned about one paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openreview_id: Option<String>,

    #[serde(flatten)]
    pub enrichment: Enrichment,
}

/// Last tier whose results were persisted, and whether the run got past
/// the final tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCursor {
    pub tier: TierId,
    pub run_complete: bool,
}

/// Persisted partial progress of one conference's enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub conference: String,

    #[serde(default)]
    pub entries: BTreeMap<String, CheckpointEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<TierCursor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(conference: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.cursor.is_none()
    }

    /// Pre-fill papers from persisted entries. Never overwrites an abstract
    /// a paper already carries. Returns how many abstracts were restored.
    pub fn apply(&self, papers: &mut [Paper]) -> usize {
        let mut restored = 0;
        for paper in papers.iter_mut() {
            let Some(entry) = self.entries.get(&paper.id) else {
                continue;
            };
            if paper.openreview_id.is_none() {
                paper.openreview_id = entry.openreview_id.clone();
            }
            if paper.apply_enrichment(entry.enrichment.clone()) {
                restored += 1;
            }
        }
        restored
    }

    /// Snapshot every paper that has something worth keeping, and move the
    /// cursor to `tier`.
    pub fn record(&mut self, papers: &[Paper], tier: TierId) {
        for paper in papers {
            if !paper.has_abstract() && paper.openreview_id.is_none() {
                continue;
            }
            self.entries.insert(
                paper.id.clone(),
                CheckpointEntry {
                    openreview_id: paper.openreview_id.clone(),
                    enrichment: paper.enrichment.clone(),
                },
            );
        }
        self.cursor = Some(TierCursor {
            tier,
            run_complete: false,
        });
        self.updated_at = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.run_complete = true;
        }
        self.updated_at = Some(Utc::now());
    }

    /// Last tier an interrupted run completed. `None` for a fresh or
    /// finished checkpoint.
    pub fn resume_point(&self) -> Option<TierId> {
        self.cursor
            .filter(|cursor| !cursor.run_complete)
            .map(|cursor| cursor.tier)
    }

    pub fn resolved_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.enrichment.has_abstract())
            .count()
    }
}

/// Checkpoint file on disk, written atomically.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty checkpoint.
    pub fn load(&self, conference: &str) -> Result<Checkpoint> {
        if !self.path.exists() {
            return Ok(Checkpoint::new(conference));
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let mut checkpoint: Checkpoint = serde_json::from_str(&contents)?;
        if checkpoint.conference.is_empty() {
            checkpoint.conference = conference.to_string();
        }
        Ok(checkpoint)
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(checkpoint)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn discard(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
