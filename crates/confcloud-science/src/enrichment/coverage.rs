use std::collections::{BTreeMap, HashSet};
use std::fmt;

use confcloud_core::{AbstractSource, Paper};
use serde::{Deserialize, Serialize};

use crate::enrichment::tier::{TierId, TierPass};
use crate::identifiers::RouteSet;
use crate::sources::ResultStatus;

/// Final state of one paper after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    Resolved,
    /// No tier had an identifier it could use.
    NotAttempted,
    /// Every attempt came back empty.
    NotFound,
    /// At least one attempt failed (timeout, transient, malformed, or the
    /// tier was tripped). A later run may still succeed.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub attempted: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_attempted: usize,
}

impl TierStats {
    pub fn percent_resolved(&self) -> f64 {
        percent(self.resolved, self.attempted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCoverage {
    pub total: usize,
    pub resolved: usize,
    #[serde(default)]
    pub by_tier: BTreeMap<TierId, usize>,
}

impl YearCoverage {
    pub fn percent(&self) -> f64 {
        percent(self.resolved, self.total)
    }
}

/// Abstract coverage of a paper collection, overall and broken down by tier,
/// year and source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total: usize,
    pub resolved: usize,
    /// Abstracts present before any tier ran (input file or checkpoint).
    pub restored: usize,
    #[serde(default)]
    pub tiers: BTreeMap<TierId, TierStats>,
    #[serde(default)]
    pub years: BTreeMap<i32, YearCoverage>,
    #[serde(default)]
    pub by_source: BTreeMap<AbstractSource, usize>,
    #[serde(default)]
    pub by_status: BTreeMap<PaperStatus, usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub papers: BTreeMap<String, PaperStatus>,
}

impl CoverageReport {
    /// Coverage of an already enriched collection, without tier detail.
    /// A paper still missing an abstract counts as not found when it carries
    /// an identifier some tier consumes, and as not attempted otherwise.
    pub fn summarize(papers: &[Paper]) -> Self {
        let restored = papers.iter().filter(|p| p.has_abstract()).count();
        let mut tracker = CoverageTracker::new(restored);
        tracker.attempted.extend(
            papers
                .iter()
                .filter(|p| !p.has_abstract() && !RouteSet::of(p).is_empty())
                .map(|p| p.id.clone()),
        );
        tracker.finish(papers)
    }

    pub fn percent(&self) -> f64 {
        percent(self.resolved, self.total)
    }

    pub fn status_count(&self, status: PaperStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Fold another report into this one (e.g. several conferences).
    pub fn merge(&mut self, other: CoverageReport) {
        self.total += other.total;
        self.resolved += other.resolved;
        self.restored += other.restored;
        for (tier, stats) in other.tiers {
            let entry = self.tiers.entry(tier).or_default();
            entry.attempted += stats.attempted;
            entry.resolved += stats.resolved;
            entry.not_found += stats.not_found;
            entry.failed += stats.failed;
            entry.skipped += stats.skipped;
            entry.not_attempted += stats.not_attempted;
        }
        for (year, coverage) in other.years {
            let entry = self.years.entry(year).or_default();
            entry.total += coverage.total;
            entry.resolved += coverage.resolved;
            for (tier, n) in coverage.by_tier {
                *entry.by_tier.entry(tier).or_default() += n;
            }
        }
        for (source, n) in other.by_source {
            *self.by_source.entry(source).or_default() += n;
        }
        for (status, n) in other.by_status {
            *self.by_status.entry(status).or_default() += n;
        }
        self.papers.extend(other.papers);
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

// ─── Tracking during a run ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct CoverageTracker {
    restored: usize,
    tiers: BTreeMap<TierId, TierStats>,
    attempted: HashSet<String>,
    failed: HashSet<String>,
}

impl CoverageTracker {
    pub(crate) fn new(restored: usize) -> Self {
        Self {
            restored,
            ..Default::default()
        }
    }

    pub(crate) fn record_pass(&mut self, tier: TierId, pass: &TierPass, total: usize) {
        let stats = self.tiers.entry(tier).or_default();
        stats.attempted += pass.attempted();
        stats.resolved += pass.resolved.len();
        stats.skipped += pass.skipped.len();

        for resolution in pass.resolved.iter().chain(&pass.still_pending) {
            self.attempted.insert(resolution.paper_id.clone());
            match resolution.result.status() {
                ResultStatus::Found => {}
                ResultStatus::NotFound => stats.not_found += 1,
                ResultStatus::Failed(_) => {
                    stats.failed += 1;
                    self.failed.insert(resolution.paper_id.clone());
                }
            }
        }
        self.failed.extend(pass.skipped.iter().cloned());

        stats.not_attempted = total.saturating_sub(stats.attempted + stats.skipped);
    }

    /// A tier that did not run at all this time.
    pub(crate) fn record_idle(&mut self, tier: TierId, total: usize) {
        self.tiers.entry(tier).or_default().not_attempted = total;
    }

    pub(crate) fn tier_stats(&self, tier: TierId) -> Option<&TierStats> {
        self.tiers.get(&tier)
    }

    pub(crate) fn finish(self, papers: &[Paper]) -> CoverageReport {
        let mut report = CoverageReport {
            total: papers.len(),
            restored: self.restored,
            tiers: self.tiers,
            ..Default::default()
        };

        for paper in papers {
            let year = report.years.entry(paper.year).or_default();
            year.total += 1;

            let status = if paper.has_abstract() {
                PaperStatus::Resolved
            } else if self.failed.contains(&paper.id) {
                PaperStatus::Failed
            } else if self.attempted.contains(&paper.id) {
                PaperStatus::NotFound
            } else {
                PaperStatus::NotAttempted
            };

            if status == PaperStatus::Resolved {
                report.resolved += 1;
                year.resolved += 1;
                if let Some(source) = paper.enrichment.abstract_source {
                    *report.by_source.entry(source).or_default() += 1;
                    *year.by_tier.entry(TierId::for_source(source)).or_default() += 1;
                }
            }
            *report.by_status.entry(status).or_default() += 1;
            report.papers.insert(paper.id.clone(), status);
        }
        report
    }
}

// ─── Display ──────────────────────────────────────────────────────────────────

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Coverage: {}/{} papers have an abstract ({:.1}%), {} already present",
            self.resolved,
            self.total,
            self.percent(),
            self.restored
        )?;

        if !self.tiers.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<28} {:>9} {:>9} {:>9} {:>7} {:>8} {:>13} {:>7}",
                "tier", "attempted", "resolved", "not found", "failed", "skipped", "not attempted", "%"
            )?;
            for (tier, stats) in &self.tiers {
                writeln!(
                    f,
                    "{:<28} {:>9} {:>9} {:>9} {:>7} {:>8} {:>13} {:>6.1}%",
                    tier.to_string(),
                    stats.attempted,
                    stats.resolved,
                    stats.not_found,
                    stats.failed,
                    stats.skipped,
                    stats.not_attempted,
                    stats.percent_resolved()
                )?;
            }
        }

        if !self.years.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<6} {:>7} {:>9} {:>7}", "year", "total", "resolved", "%")?;
            for (year, coverage) in &self.years {
                writeln!(
                    f,
                    "{:<6} {:>7} {:>9} {:>6.1}%",
                    year,
                    coverage.total,
                    coverage.resolved,
                    coverage.percent()
                )?;
            }
        }

        if !self.by_source.is_empty() {
            writeln!(f)?;
            for (source, n) in &self.by_source {
                writeln!(f, "{:<22} {:>7}", source.as_str(), n)?;
            }
        }

        writeln!(f)?;
        write!(
            f,
            "Missing: {} not attempted, {} not found, {} failed",
            self.status_count(PaperStatus::NotAttempted),
            self.status_count(PaperStatus::NotFound),
            self.status_count(PaperStatus::Failed)
        )
    }
}
