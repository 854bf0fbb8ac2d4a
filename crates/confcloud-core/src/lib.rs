pub mod config;
pub mod dataset;
pub mod error;
pub mod models;

pub use config::{AppConfig, CoreConfig, EnrichmentConfig, SourceConfig, SourcesConfig};
pub use dataset::{DatasetMetadata, PaperDataset};
pub use error::{CoreError, Result};
pub use models::*;
