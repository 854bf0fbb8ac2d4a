use std::fmt;

use confcloud_core::Paper;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PROCEEDINGS_HASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/hash/([a-f0-9]{32})-Abstract-(Conference|Datasets_and_Benchmarks)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProceedingsTrack {
    Conference,
    #[serde(rename = "Datasets_and_Benchmarks")]
    DatasetsAndBenchmarks,
}

impl ProceedingsTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conference => "Conference",
            Self::DatasetsAndBenchmarks => "Datasets_and_Benchmarks",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "Conference" => Some(Self::Conference),
            "Datasets_and_Benchmarks" => Some(Self::DatasetsAndBenchmarks),
            _ => None,
        }
    }
}

impl fmt::Display for ProceedingsTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to rebuild a proceedings abstract page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProceedingsRef {
    pub year: i32,
    pub hash: String,
    pub track: ProceedingsTrack,
}

impl ProceedingsRef {
    /// From the derived `proceedings_hash`/`proceedings_track` fields, falling
    /// back to parsing `proceedings_url`.
    pub fn from_paper(paper: &Paper) -> Option<Self> {
        let derived = paper
            .proceedings_hash
            .as_deref()
            .zip(paper.proceedings_track.as_deref())
            .and_then(|(hash, track)| {
                let track = ProceedingsTrack::parse(track)?;
                is_proceedings_hash(hash).then(|| Self {
                    year: paper.year,
                    hash: hash.to_string(),
                    track,
                })
            });
        derived.or_else(|| {
            paper
                .proceedings_url
                .as_deref()
                .and_then(|url| extract_proceedings_hash(url, paper.year))
        })
    }
}

/// Hash and track from a proceedings abstract URL such as
/// `.../paper/2022/hash/002262941c9edfd472a79298b2ac5e17-Abstract-Conference.html`.
pub fn extract_proceedings_hash(url: &str, year: i32) -> Option<ProceedingsRef> {
    let caps = PROCEEDINGS_HASH_RE.captures(url)?;
    let hash = caps.get(1)?.as_str().to_string();
    let track = ProceedingsTrack::parse(caps.get(2)?.as_str())?;
    Some(ProceedingsRef { year, hash, track })
}

fn is_proceedings_hash(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
