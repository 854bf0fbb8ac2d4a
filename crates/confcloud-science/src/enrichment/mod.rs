pub mod checkpoint;
pub mod coverage;
pub mod orchestrator;
pub mod tier;
pub mod tiers;

pub use checkpoint::{Checkpoint, CheckpointEntry, CheckpointStore, TierCursor};
pub use coverage::{CoverageReport, PaperStatus, TierStats, YearCoverage};
pub use orchestrator::{EnrichmentOrchestrator, EnrichmentRun};
pub use tier::{LookupRequest, Resolution, TierId, TierPass, TierResolver};
pub use tiers::{BatchLookupTier, FailureStreak, SingleLookupTier};
