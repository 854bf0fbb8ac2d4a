use std::collections::HashMap;
use std::sync::Arc;

use confcloud_core::{AppConfig, Enrichment, Paper, ensure_unique_ids};
use tracing::{debug, info, warn};

use crate::enrichment::checkpoint::{Checkpoint, CheckpointStore};
use crate::enrichment::coverage::{CoverageReport, CoverageTracker};
use crate::enrichment::tier::{LookupRequest, TierId, TierPass, TierResolver};
use crate::enrichment::tiers::{BatchLookupTier, SingleLookupTier};
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::identifiers::{ProceedingsRef, RouteSet, extract_openreview_id};
use crate::sources::{OpenAlexSource, OpenReviewSource, ProceedingsSource, SemanticScholarSource};

/// Enriched papers plus what it took to get there.
#[derive(Debug, Clone)]
pub struct EnrichmentRun {
    pub papers: Vec<Paper>,
    pub coverage: CoverageReport,
    pub checkpoint: Checkpoint,
}

/// Runs the tiers in order over a paper collection, merging results
/// write-once and persisting a checkpoint after every tier.
pub struct EnrichmentOrchestrator {
    tiers: Vec<Box<dyn TierResolver>>,
    store: Option<CheckpointStore>,
    proceedings_max_year: Option<i32>,
    resume_interrupted_runs: bool,
}

impl EnrichmentOrchestrator {
    pub fn new(mut tiers: Vec<Box<dyn TierResolver>>) -> Self {
        tiers.sort_by_key(|tier| tier.tier());
        Self {
            tiers,
            store: None,
            proceedings_max_year: None,
            resume_interrupted_runs: true,
        }
    }

    /// The production tier stack: every source behind one shared client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ScienceError::Configuration(e.to_string()))?;

        let client = Arc::new(RateLimitedClient::from_config(config)?);
        let openreview = Arc::new(OpenReviewSource::from_config(Arc::clone(&client), config));
        let openalex = Arc::new(OpenAlexSource::from_config(Arc::clone(&client), config));
        let semantic_scholar =
            Arc::new(SemanticScholarSource::from_config(Arc::clone(&client), config));
        let proceedings = Arc::new(ProceedingsSource::from_config(client, config));

        let enrichment = &config.enrichment;
        let breaker = enrichment.max_consecutive_failures;
        let tiers: Vec<Box<dyn TierResolver>> = vec![
            Box::new(SingleLookupTier::new(
                TierId::OpenReviewSearch,
                Arc::clone(&openreview),
                LookupRequest::forum_search,
                breaker,
            )),
            Box::new(SingleLookupTier::new(
                TierId::OpenReviewFetch,
                openreview,
                LookupRequest::forum_fetch,
                breaker,
            )),
            Box::new(BatchLookupTier::new(
                TierId::BatchDoi,
                openalex,
                LookupRequest::doi,
                enrichment.doi_batch_size,
                enrichment.batch_concurrency,
                breaker,
            )),
            Box::new(SingleLookupTier::new(
                TierId::SingleDoi,
                semantic_scholar,
                LookupRequest::doi,
                breaker,
            )),
            Box::new(SingleLookupTier::new(
                TierId::Proceedings,
                proceedings,
                LookupRequest::proceedings,
                breaker,
            )),
        ];

        Ok(Self::new(tiers)
            .with_proceedings_max_year(enrichment.proceedings_max_year)
            .with_resume_interrupted_runs(enrichment.resume_interrupted_runs))
    }

    pub fn with_checkpoint_store(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Papers after this year have no static proceedings page.
    pub fn with_proceedings_max_year(mut self, year: Option<i32>) -> Self {
        self.proceedings_max_year = year;
        self
    }

    pub fn with_resume_interrupted_runs(mut self, resume: bool) -> Self {
        self.resume_interrupted_runs = resume;
        self
    }

    pub fn tier_ids(&self) -> Vec<TierId> {
        self.tiers.iter().map(|tier| tier.tier()).collect()
    }

    /// Enrich `papers`, starting from `checkpoint`.
    ///
    /// Only checkpoint I/O can fail; source errors leave papers unresolved.
    pub async fn run(
        &self,
        mut papers: Vec<Paper>,
        mut checkpoint: Checkpoint,
    ) -> Result<EnrichmentRun> {
        let renamed = ensure_unique_ids(&mut papers);
        if renamed > 0 {
            warn!("{renamed} papers shared an id with an earlier paper and were renamed");
        }
        let from_checkpoint = checkpoint.apply(&mut papers);
        if from_checkpoint > 0 {
            info!("restored {from_checkpoint} abstracts from checkpoint");
        }
        for paper in &mut papers {
            derive_identifiers(paper);
        }

        let mut routes = papers
            .iter()
            .map(|paper| (paper.id.clone(), self.route_for(paper)))
            .collect::<HashMap<_, _>>();

        let resume_after = checkpoint
            .resume_point()
            .filter(|_| self.resume_interrupted_runs);
        if let Some(tier) = resume_after {
            info!("resuming an interrupted run after {tier}");
        }

        let already = papers.iter().filter(|p| p.has_abstract()).count();
        let mut tracker = CoverageTracker::new(already);
        let total = papers.len();

        for resolver in &self.tiers {
            let tier = resolver.tier();
            if resume_after.is_some_and(|done| tier <= done) {
                debug!("{tier}: completed before the interruption");
                tracker.record_idle(tier, total);
                continue;
            }

            let pending = papers
                .iter()
                .filter(|paper| !paper.has_abstract())
                .filter_map(|paper| {
                    let paper_routes = routes.get(&paper.id)?;
                    paper_routes
                        .serves(tier)
                        .then(|| LookupRequest::new(paper, paper_routes.clone()))
                })
                .collect::<Vec<_>>();

            if pending.is_empty() {
                debug!("{tier}: nothing to do");
                tracker.record_idle(tier, total);
            } else {
                info!("{tier}: {} papers pending", pending.len());
                let pass = resolver.resolve(pending).await;
                merge_pass(tier, &pass, &mut papers, &mut routes);
                tracker.record_pass(tier, &pass, total);
                if let Some(stats) = tracker.tier_stats(tier) {
                    info!(
                        "{tier}: {}/{} resolved, {} not found, {} failed, {} skipped",
                        stats.resolved, stats.attempted, stats.not_found, stats.failed, stats.skipped
                    );
                }
            }

            checkpoint.record(&papers, tier);
            self.persist(&checkpoint)?;
        }

        checkpoint.finish();
        self.persist(&checkpoint)?;

        let coverage = tracker.finish(&papers);
        info!(
            "enrichment finished: {}/{} papers have an abstract ({:.1}%)",
            coverage.resolved,
            coverage.total,
            coverage.percent()
        );

        Ok(EnrichmentRun {
            papers,
            coverage,
            checkpoint,
        })
    }

    fn route_for(&self, paper: &Paper) -> RouteSet {
        let routes = RouteSet::of(paper);
        match self.proceedings_max_year {
            Some(max) if paper.year > max && routes.proceedings().is_some() => {
                debug!("{}: no proceedings page after {max}", paper.id);
                routes.without_proceedings()
            }
            _ => routes,
        }
    }

    fn persist(&self, checkpoint: &Checkpoint) -> Result<()> {
        match &self.store {
            Some(store) => store.save(checkpoint),
            None => Ok(()),
        }
    }
}

/// Fill derived identifiers from the raw URLs when missing.
fn derive_identifiers(paper: &mut Paper) {
    if paper.openreview_id.is_none() {
        paper.openreview_id = paper
            .openreview_url
            .as_deref()
            .and_then(extract_openreview_id);
    }
    if paper.proceedings_hash.is_none()
        && let Some(reference) = ProceedingsRef::from_paper(paper)
    {
        paper.proceedings_hash = Some(reference.hash);
        paper.proceedings_track = Some(reference.track.as_str().to_string());
    }
}

/// Write a tier's successes into the papers. Title search only recovers a
/// forum id, which makes the paper eligible for the fetch tier.
fn merge_pass(
    tier: TierId,
    pass: &TierPass,
    papers: &mut [Paper],
    routes: &mut HashMap<String, RouteSet>,
) {
    let index = papers
        .iter()
        .enumerate()
        .map(|(i, paper)| (paper.id.clone(), i))
        .collect::<HashMap<_, _>>();

    for resolution in &pass.resolved {
        let Some(&i) = index.get(&resolution.paper_id) else {
            warn!("{tier}: result for unknown paper {}", resolution.paper_id);
            continue;
        };
        let paper = &mut papers[i];
        let result = &resolution.result;

        match tier.abstract_source() {
            None => {
                if let Some(forum_id) = &result.external_id
                    && paper.openreview_id.is_none()
                {
                    paper.openreview_id = Some(forum_id.clone());
                    routes
                        .entry(paper.id.clone())
                        .or_default()
                        .set_forum_id(forum_id.clone());
                }
            }
            Some(source) => {
                let written = paper.apply_enrichment(Enrichment {
                    abstract_text: result.abstract_text.clone(),
                    abstract_source: Some(source),
                    citation_count: result.citation_count,
                    source_id: result.external_id.clone(),
                });
                if !written {
                    debug!("{tier}: {} already has an abstract", paper.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use confcloud_core::{AbstractSource, SourceConfig};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::enrichment::coverage::PaperStatus;
    use crate::sources::EnrichmentResult;

    // ─── Fakes ────────────────────────────────────────────────

    struct FakeTier {
        tier: TierId,
        calls: Arc<AtomicUsize>,
        answer: Option<&'static str>,
    }

    impl FakeTier {
        fn boxed(
            tier: TierId,
            answer: Option<&'static str>,
        ) -> (Box<dyn TierResolver>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fake = FakeTier {
                tier,
                calls: Arc::clone(&calls),
                answer,
            };
            (Box::new(fake), calls)
        }
    }

    #[async_trait]
    impl TierResolver for FakeTier {
        fn tier(&self) -> TierId {
            self.tier
        }

        async fn resolve(&self, pending: Vec<LookupRequest>) -> TierPass {
            let mut pass = TierPass::default();
            for lookup in pending {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let result = match self.answer {
                    Some(text) => EnrichmentResult::from_abstract(
                        Some(text.to_string()),
                        Some(5),
                        Some(format!("{}-id", self.tier.label())),
                    ),
                    None => EnrichmentResult::not_found(),
                };
                pass.push(lookup.paper_id, result);
            }
            pass
        }
    }

    fn doi_paper(title: &str, doi: &str) -> Paper {
        let mut paper = Paper::new(title, 2022);
        paper.doi = Some(doi.to_string());
        paper
    }

    fn config_for(server_url: &str, checkpoint_dir: &Path) -> AppConfig {
        let fast = |path: &str| SourceConfig {
            base_url: format!("{server_url}{path}"),
            min_interval_ms: 0,
            timeout_secs: 5,
            max_retries: 1,
            backoff_base_ms: 1,
        };
        let mut config = AppConfig::default();
        config.sources.openreview = fast("/v1");
        config.sources.openreview_v2_base_url = format!("{server_url}/v2");
        config.sources.openalex = fast("/openalex");
        config.sources.semantic_scholar = fast("/s2");
        config.sources.proceedings = fast("/proc");
        config.core.checkpoint_dir = checkpoint_dir.to_string_lossy().to_string();
        config
    }

    // ─── Merge order ──────────────────────────────────────────

    #[tokio::test]
    async fn first_successful_tier_wins() {
        let (batch, batch_calls) = FakeTier::boxed(TierId::BatchDoi, Some("from batch"));
        let (single, single_calls) = FakeTier::boxed(TierId::SingleDoi, Some("from single"));
        // Registration order does not matter; tiers run by id.
        let orchestrator = EnrichmentOrchestrator::new(vec![single, batch]);
        assert_eq!(orchestrator.tier_ids(), vec![TierId::BatchDoi, TierId::SingleDoi]);

        let run = orchestrator
            .run(vec![doi_paper("A", "10.1/a")], Checkpoint::new("KDD"))
            .await
            .unwrap();

        let paper = &run.papers[0];
        assert_eq!(paper.enrichment.abstract_text.as_deref(), Some("from batch"));
        assert_eq!(paper.enrichment.abstract_source, Some(AbstractSource::OpenAlex));
        assert_eq!(paper.enrichment.source_id.as_deref(), Some("batch_doi-id"));
        assert_eq!(batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(single_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_falls_through_to_next_tier() {
        let (batch, _) = FakeTier::boxed(TierId::BatchDoi, None);
        let (single, single_calls) = FakeTier::boxed(TierId::SingleDoi, Some("from single"));
        let orchestrator = EnrichmentOrchestrator::new(vec![batch, single]);

        let run = orchestrator
            .run(vec![doi_paper("A", "10.1/a")], Checkpoint::new("KDD"))
            .await
            .unwrap();

        assert_eq!(
            run.papers[0].enrichment.abstract_source,
            Some(AbstractSource::SemanticScholar)
        );
        assert_eq!(single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(run.coverage.tiers[&TierId::BatchDoi].not_found, 1);
        assert_eq!(run.coverage.tiers[&TierId::SingleDoi].resolved, 1);
    }

    #[tokio::test]
    async fn existing_abstracts_are_never_sent() {
        let (batch, calls) = FakeTier::boxed(TierId::BatchDoi, Some("new"));
        let orchestrator = EnrichmentOrchestrator::new(vec![batch]);

        let mut paper = doi_paper("A", "10.1/a");
        paper.apply_enrichment(Enrichment {
            abstract_text: Some("Original.".to_string()),
            ..Default::default()
        });
        let run = orchestrator
            .run(vec![paper], Checkpoint::new("KDD"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            run.papers[0].enrichment.abstract_text.as_deref(),
            Some("Original.")
        );
        assert_eq!(run.coverage.restored, 1);
    }

    #[tokio::test]
    async fn proceedings_beyond_max_year_are_not_attempted() {
        let (proceedings, calls) = FakeTier::boxed(TierId::Proceedings, Some("page"));
        let orchestrator =
            EnrichmentOrchestrator::new(vec![proceedings]).with_proceedings_max_year(Some(2022));

        let url = |year: i32| {
            format!(
                "https://proceedings.neurips.cc/paper_files/paper/{year}/hash/002262941c9edfd472a79298b2ac5e17-Abstract-Conference.html"
            )
        };
        let mut old = Paper::new("Old", 2022);
        old.proceedings_url = Some(url(2022));
        let mut new = Paper::new("New", 2023);
        new.proceedings_url = Some(url(2023));

        let run = orchestrator
            .run(vec![old, new], Checkpoint::new("NeurIPS"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            run.papers[0].proceedings_hash.as_deref(),
            Some("002262941c9edfd472a79298b2ac5e17")
        );
        assert_eq!(run.papers[0].proceedings_track.as_deref(), Some("Conference"));
        assert_eq!(run.coverage.papers[&run.papers[1].id], PaperStatus::NotAttempted);
    }

    // ─── Identifier fallthrough ───────────────────────────────

    #[tokio::test]
    async fn forum_miss_falls_through_to_doi() {
        let (fetch, fetch_calls) = FakeTier::boxed(TierId::OpenReviewFetch, None);
        let (batch, batch_calls) = FakeTier::boxed(TierId::BatchDoi, Some("from batch"));
        let orchestrator = EnrichmentOrchestrator::new(vec![fetch, batch]);

        let mut paper = doi_paper("Both", "10.1/both");
        paper.openreview_url = Some("https://openreview.net/forum?id=abc".to_string());

        let run = orchestrator
            .run(vec![paper], Checkpoint::new("ICLR"))
            .await
            .unwrap();

        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(batch_calls.load(Ordering::SeqCst), 1);
        let paper = &run.papers[0];
        assert_eq!(paper.enrichment.abstract_text.as_deref(), Some("from batch"));
        assert_eq!(paper.enrichment.abstract_source, Some(AbstractSource::OpenAlex));
        assert_eq!(run.coverage.tiers[&TierId::OpenReviewFetch].not_found, 1);
    }

    #[tokio::test]
    async fn forum_hit_keeps_doi_tiers_idle() {
        let (fetch, _) = FakeTier::boxed(TierId::OpenReviewFetch, Some("from forum"));
        let (batch, batch_calls) = FakeTier::boxed(TierId::BatchDoi, Some("from batch"));

        let mut paper = doi_paper("Both", "10.1/both");
        paper.openreview_id = Some("abc".to_string());

        let run = EnrichmentOrchestrator::new(vec![fetch, batch])
            .run(vec![paper], Checkpoint::new("ICLR"))
            .await
            .unwrap();

        assert_eq!(batch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            run.papers[0].enrichment.abstract_source,
            Some(AbstractSource::OpenReview)
        );
    }

    #[tokio::test]
    async fn same_title_papers_resolve_separately() {
        let (batch, calls) = FakeTier::boxed(TierId::BatchDoi, Some("from batch"));
        let orchestrator = EnrichmentOrchestrator::new(vec![batch]);

        let run = orchestrator
            .run(
                vec![
                    doi_paper("Same Title", "10.1/first"),
                    doi_paper("Same Title", "10.1/second"),
                ],
                Checkpoint::new("KDD"),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(run.papers[0].id, run.papers[1].id);
        assert!(run.papers.iter().all(|p| p.has_abstract()));
        assert_eq!(run.coverage.resolved, 2);
    }

    // ─── Checkpointing ────────────────────────────────────────

    #[tokio::test]
    async fn interrupted_run_resumes_after_cursor() {
        let mut checkpoint = Checkpoint::new("KDD");
        checkpoint.record(&[], TierId::BatchDoi);
        assert_eq!(checkpoint.resume_point(), Some(TierId::BatchDoi));

        let (batch, batch_calls) = FakeTier::boxed(TierId::BatchDoi, Some("batch"));
        let (single, single_calls) = FakeTier::boxed(TierId::SingleDoi, Some("single"));
        let run = EnrichmentOrchestrator::new(vec![batch, single])
            .run(vec![doi_paper("A", "10.1/a")], checkpoint.clone())
            .await
            .unwrap();
        assert_eq!(batch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(single_calls.load(Ordering::SeqCst), 1);
        assert_eq!(run.checkpoint.resume_point(), None);

        let (batch, batch_calls) = FakeTier::boxed(TierId::BatchDoi, Some("batch"));
        let (single, _) = FakeTier::boxed(TierId::SingleDoi, Some("single"));
        EnrichmentOrchestrator::new(vec![batch, single])
            .with_resume_interrupted_runs(false)
            .run(vec![doi_paper("A", "10.1/a")], checkpoint)
            .await
            .unwrap();
        assert_eq!(batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn checkpoint_is_persisted_and_finished() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("kdd.checkpoint.json"));
        let (batch, _) = FakeTier::boxed(TierId::BatchDoi, Some("batch"));

        EnrichmentOrchestrator::new(vec![batch])
            .with_checkpoint_store(store.clone())
            .run(
                vec![doi_paper("A", "10.1/a"), Paper::new("B", 2022)],
                Checkpoint::new("KDD"),
            )
            .await
            .unwrap();

        let saved = store.load("KDD").unwrap();
        assert_eq!(saved.entries.len(), 1);
        assert_eq!(saved.resolved_count(), 1);
        assert!(saved.cursor.unwrap().run_complete);
    }

    // ─── End to end over HTTP ─────────────────────────────────

    #[tokio::test]
    async fn three_paper_scenario_over_http() {
        let mut server = Server::new_async().await;
        let openalex = server
            .mock("GET", "/openalex/works")
            .match_query(Matcher::UrlEncoded("filter".into(), "doi:10.1145/111".into()))
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .expect(1)
            .create_async()
            .await;
        let s2 = server
            .mock("GET", "/s2/paper/DOI:10.1145/111")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"paperId": "s2-111", "abstract": "Found by DOI.", "citationCount": 8})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let v1 = server
            .mock("GET", "/v1/notes")
            .match_query(Matcher::UrlEncoded("forum".into(), "abc".into()))
            .with_status(200)
            .with_body(
                json!({"notes": [{"id": "abc", "forum": "abc", "content": {
                    "abstract": "Found on the forum."
                }}]})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let v2 = server
            .mock("GET", Matcher::Regex("^/v2/".to_string()))
            .expect(0)
            .create_async()
            .await;
        let proceedings = server
            .mock("GET", Matcher::Regex("^/proc/".to_string()))
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = config_for(&server.url(), dir.path());
        let orchestrator = EnrichmentOrchestrator::from_config(&config).unwrap();

        let doi_only = doi_paper("Doi Only", "https://doi.org/10.1145/111");
        let mut forum = Paper::new("Forum Paper", 2023);
        forum.openreview_url = Some("https://openreview.net/forum?id=abc".to_string());
        let neither = Paper::new("Neither", 2023);

        let run = orchestrator
            .run(vec![doi_only, forum, neither], Checkpoint::new("ICLR"))
            .await
            .unwrap();

        let [doi_only, forum, neither] = &run.papers[..] else {
            panic!("expected three papers");
        };
        assert_eq!(
            doi_only.enrichment.abstract_source,
            Some(AbstractSource::SemanticScholar)
        );
        assert_eq!(doi_only.enrichment.citation_count, Some(8));
        assert_eq!(doi_only.enrichment.source_id.as_deref(), Some("s2-111"));
        assert_eq!(forum.enrichment.abstract_source, Some(AbstractSource::OpenReview));
        assert_eq!(forum.openreview_id.as_deref(), Some("abc"));
        assert!(!neither.has_abstract());

        let coverage = &run.coverage;
        assert_eq!(coverage.resolved, 2);
        assert_eq!(coverage.papers[&neither.id], PaperStatus::NotAttempted);
        assert_eq!(coverage.tiers[&TierId::OpenReviewFetch].attempted, 1);
        assert_eq!(coverage.tiers[&TierId::BatchDoi].attempted, 1);
        assert_eq!(coverage.tiers[&TierId::SingleDoi].attempted, 1);
        assert_eq!(coverage.tiers[&TierId::OpenReviewSearch].attempted, 0);

        openalex.assert_async().await;
        s2.assert_async().await;
        v1.assert_async().await;
        v2.assert_async().await;
        proceedings.assert_async().await;
    }

    #[tokio::test]
    async fn title_search_feeds_generation_two_fetch() {
        let mut server = Server::new_async().await;
        let search = server
            .mock("GET", "/v2/notes/search")
            .match_query(Matcher::UrlEncoded("term".into(), "Sparse Attention".into()))
            .with_status(200)
            .with_body(
                json!({"notes": [{"id": "s1", "forum": "s1", "content": {
                    "title": {"value": "Sparse attention"},
                    "venue": {"value": "ICLR 2024 oral"}
                }}]})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let fetch = server
            .mock("GET", "/v2/notes")
            .match_query(Matcher::UrlEncoded("forum".into(), "s1".into()))
            .with_status(200)
            .with_body(
                json!({"notes": [{"id": "s1", "content": {
                    "TL;DR": {"value": "Only a summary."}
                }}]})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = config_for(&server.url(), dir.path());
        let mut paper = Paper::new("Sparse Attention", 2024);
        paper.venue = Some("ICLR".to_string());
        paper.openreview_url =
            Some("https://openreview.net/group?id=ICLR.cc/2024/Conference".to_string());

        let run = EnrichmentOrchestrator::from_config(&config)
            .unwrap()
            .run(vec![paper], Checkpoint::new("ICLR"))
            .await
            .unwrap();

        let paper = &run.papers[0];
        assert_eq!(paper.openreview_id.as_deref(), Some("s1"));
        assert_eq!(paper.enrichment.abstract_text.as_deref(), Some("Only a summary."));
        assert_eq!(paper.enrichment.abstract_source, Some(AbstractSource::OpenReview));
        assert_eq!(run.coverage.tiers[&TierId::OpenReviewSearch].resolved, 1);
        search.assert_async().await;
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn second_run_from_checkpoint_makes_no_calls() {
        let mut server = Server::new_async().await;
        let openalex = server
            .mock("GET", "/openalex/works")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"results": [
                    {"id": "https://openalex.org/W1", "doi": "https://doi.org/10.1/one",
                     "cited_by_count": 2, "abstract_inverted_index": {"first": [0]}},
                    {"id": "https://openalex.org/W2", "doi": "https://doi.org/10.1/two",
                     "cited_by_count": 3, "abstract_inverted_index": {"second": [0]}}
                ]})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = config_for(&server.url(), dir.path());
        let store = CheckpointStore::new(config.checkpoint_path("KDD"));
        let papers = || vec![doi_paper("One", "10.1/one"), doi_paper("Two", "10.1/two")];

        let first = EnrichmentOrchestrator::from_config(&config)
            .unwrap()
            .with_checkpoint_store(store.clone())
            .run(papers(), store.load("KDD").unwrap())
            .await
            .unwrap();
        assert_eq!(first.coverage.resolved, 2);

        let second = EnrichmentOrchestrator::from_config(&config)
            .unwrap()
            .with_checkpoint_store(store.clone())
            .run(papers(), store.load("KDD").unwrap())
            .await
            .unwrap();

        assert_eq!(second.coverage.restored, 2);
        for (a, b) in first.papers.iter().zip(&second.papers) {
            assert_eq!(a.enrichment, b.enrichment);
        }
        openalex.assert_async().await;
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = AppConfig::default();
        config.enrichment.doi_batch_size = 0;
        let err = EnrichmentOrchestrator::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigurationError);
    }
}
