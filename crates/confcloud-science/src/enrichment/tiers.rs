use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::enrichment::tier::{LookupRequest, TierId, TierPass, TierResolver};
use crate::error::ErrorKind;
use crate::sources::{BatchSourceAdapter, EnrichmentResult, SourceAdapter};

/// Counts consecutive timeouts and transient errors. Any other outcome
/// resets the count. A limit of 0 never trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureStreak {
    limit: u32,
    current: u32,
}

impl FailureStreak {
    pub fn new(limit: u32) -> Self {
        Self { limit, current: 0 }
    }

    /// Returns true once the limit is reached.
    pub fn record(&mut self, error: Option<ErrorKind>) -> bool {
        if error.is_some_and(|kind| kind.is_retryable()) {
            self.current += 1;
        } else {
            self.current = 0;
        }
        self.limit > 0 && self.current >= self.limit
    }

    pub fn current(&self) -> u32 {
        self.current
    }
}

// ─── Single lookups ───────────────────────────────────────────────────────────

/// A tier that asks its adapter about one paper at a time.
pub struct SingleLookupTier<A, R> {
    tier: TierId,
    adapter: Arc<A>,
    build: fn(&LookupRequest) -> Option<R>,
    max_consecutive_failures: u32,
}

impl<A, R> SingleLookupTier<A, R> {
    pub fn new(
        tier: TierId,
        adapter: Arc<A>,
        build: fn(&LookupRequest) -> Option<R>,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            tier,
            adapter,
            build,
            max_consecutive_failures,
        }
    }
}

#[async_trait]
impl<A, R> TierResolver for SingleLookupTier<A, R>
where
    A: SourceAdapter<R> + 'static,
    R: Send + Sync + 'static,
{
    fn tier(&self) -> TierId {
        self.tier
    }

    async fn resolve(&self, pending: Vec<LookupRequest>) -> TierPass {
        let mut pass = TierPass::default();
        let mut streak = FailureStreak::new(self.max_consecutive_failures);
        let mut remaining = pending.into_iter();

        for lookup in remaining.by_ref() {
            let Some(request) = (self.build)(&lookup) else {
                debug!("{}: {} has no usable identifier", self.tier, lookup.paper_id);
                continue;
            };

            let result = self.adapter.resolve(&request).await;
            let tripped = streak.record(result.error);
            pass.push(lookup.paper_id, result);

            if tripped {
                warn!(
                    "{}: {} consecutive failures from {}, skipping it for the rest of this run",
                    self.tier,
                    streak.current(),
                    self.adapter.source()
                );
                break;
            }
        }

        pass.skipped.extend(remaining.map(|lookup| lookup.paper_id));
        pass
    }
}

// ─── Batch lookups ────────────────────────────────────────────────────────────

/// A tier that groups its papers into fixed-size batches and issues up to
/// `concurrency` batches at once. All batches share the adapter's limiter.
pub struct BatchLookupTier<A, R> {
    tier: TierId,
    adapter: Arc<A>,
    build: fn(&LookupRequest) -> Option<R>,
    batch_size: usize,
    concurrency: usize,
    max_consecutive_failures: u32,
}

impl<A, R> BatchLookupTier<A, R> {
    pub fn new(
        tier: TierId,
        adapter: Arc<A>,
        build: fn(&LookupRequest) -> Option<R>,
        batch_size: usize,
        concurrency: usize,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            tier,
            adapter,
            build,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            max_consecutive_failures,
        }
    }
}

struct Batch<R> {
    paper_ids: Vec<String>,
    requests: Vec<R>,
}

#[async_trait]
impl<A, R> TierResolver for BatchLookupTier<A, R>
where
    A: BatchSourceAdapter<R> + 'static,
    R: Send + Sync + 'static,
{
    fn tier(&self) -> TierId {
        self.tier
    }

    async fn resolve(&self, pending: Vec<LookupRequest>) -> TierPass {
        let mut pass = TierPass::default();

        let mut batches: Vec<Batch<R>> = Vec::new();
        for lookup in pending {
            let Some(request) = (self.build)(&lookup) else {
                debug!("{}: {} has no usable identifier", self.tier, lookup.paper_id);
                continue;
            };
            match batches.last_mut() {
                Some(batch) if batch.requests.len() < self.batch_size => {
                    batch.paper_ids.push(lookup.paper_id);
                    batch.requests.push(request);
                }
                _ => batches.push(Batch {
                    paper_ids: vec![lookup.paper_id],
                    requests: vec![request],
                }),
            }
        }

        let mut streak = FailureStreak::new(self.max_consecutive_failures);
        let mut remaining = batches.into_iter().peekable();

        while remaining.peek().is_some() {
            let wave = remaining.by_ref().take(self.concurrency).collect::<Vec<_>>();
            let outcomes = join_all(
                wave.iter()
                    .map(|batch| self.adapter.resolve_batch(&batch.requests)),
            )
            .await;

            let mut tripped = false;
            for (batch, results) in wave.into_iter().zip(outcomes) {
                let mut batch_error = None;
                for (paper_id, request) in batch.paper_ids.into_iter().zip(&batch.requests) {
                    let result = results
                        .get(&self.adapter.request_key(request))
                        .cloned()
                        .unwrap_or_else(EnrichmentResult::not_found);
                    batch_error = result.error;
                    pass.push(paper_id, result);
                }
                // A batch fails as a unit, so it counts once.
                tripped |= streak.record(batch_error);
            }

            if tripped {
                warn!(
                    "{}: {} consecutive failed batches from {}, skipping it for the rest of this run",
                    self.tier,
                    streak.current(),
                    self.adapter.source()
                );
                break;
            }
        }

        for batch in remaining {
            pass.skipped.extend(batch.paper_ids);
        }
        pass
    }
}
