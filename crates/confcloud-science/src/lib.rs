//! confcloud science: identifier routing, external sources and the tiered
//! abstract-enrichment engine.

pub mod error;
pub mod http;
pub mod identifiers;
pub mod sources;
pub mod enrichment;

pub use error::{ErrorKind, Result, ScienceError};
pub use enrichment::{
    Checkpoint, CheckpointStore, CoverageReport, EnrichmentOrchestrator, EnrichmentRun, TierId,
};
pub use sources::EnrichmentResult;
