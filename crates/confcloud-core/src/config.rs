use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root application configuration, loaded from `~/.config/confcloud/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub enrichment: EnrichmentConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// One `<conference>.checkpoint.json` per conference.
    pub checkpoint_dir: String,
}

/// Knobs of the abstract-enrichment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Papers from this year on are fetched through the OpenReview
    /// generation-2 API; earlier years use generation 1.
    pub openreview_v2_from_year: i32,
    /// DOIs per batch lookup call (the source accepts at most 100).
    pub doi_batch_size: usize,
    /// Batch lookups issued at once; all share one rate limiter.
    pub batch_concurrency: usize,
    /// Consecutive timeouts/transient failures after which a tier is
    /// abandoned for the rest of the run. 0 disables the breaker.
    pub max_consecutive_failures: u32,
    /// Last year served by static proceedings pages. `None` means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proceedings_max_year: Option<i32>,
    /// Skip tiers an interrupted run already completed.
    pub resume_interrupted_runs: bool,
    pub user_agent: String,
    /// Contact address for polite-pool access to the batch DOI source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
    /// Environment variable holding the Semantic Scholar API key.
    pub semantic_scholar_api_key_env: String,
}

/// Per-source endpoint and request policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    /// Minimum spacing between the starts of two calls to this source.
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Generation-1 OpenReview API.
    pub openreview: SourceConfig,
    /// Generation-2 OpenReview API; shares the generation-1 rate limit.
    pub openreview_v2_base_url: String,
    pub openalex: SourceConfig,
    pub semantic_scholar: SourceConfig,
    pub proceedings: SourceConfig,
}

// ─── Defaults ──────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl SourceConfig {
    pub fn new(base_url: impl Into<String>, min_interval_ms: u64) -> Self {
        Self {
            base_url: base_url.into(),
            min_interval_ms,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        let checkpoint_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("confcloud")
            .join("checkpoints");

        Self {
            checkpoint_dir: checkpoint_dir.to_string_lossy().to_string(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            openreview_v2_from_year: 2024,
            doi_batch_size: 100,
            batch_concurrency: 1,
            max_consecutive_failures: 10,
            proceedings_max_year: None,
            resume_interrupted_runs: true,
            user_agent: format!("confcloud/{}", env!("CARGO_PKG_VERSION")),
            polite_email: None,
            semantic_scholar_api_key_env: "SEMANTIC_SCHOLAR_API_KEY".to_string(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            openreview: SourceConfig::new("https://api.openreview.net", 1000),
            openreview_v2_base_url: "https://api2.openreview.net".to_string(),
            openalex: SourceConfig::new("https://api.openalex.org", 100),
            semantic_scholar: SourceConfig::new("https://api.semanticscholar.org/graph/v1", 3000),
            proceedings: SourceConfig::new("https://proceedings.neurips.cc", 500),
        }
    }
}

// ─── Validation ────────────────────────────────────────────

impl EnrichmentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.doi_batch_size == 0 || self.doi_batch_size > 100 {
            return Err(CoreError::ConfigError(format!(
                "doi_batch_size must be between 1 and 100, got {}",
                self.doi_batch_size
            )));
        }
        if self.batch_concurrency == 0 {
            return Err(CoreError::ConfigError(
                "batch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.openreview_v2_from_year < 2000 {
            return Err(CoreError::ConfigError(format!(
                "openreview_v2_from_year looks wrong: {}",
                self.openreview_v2_from_year
            )));
        }
        Ok(())
    }
}

impl SourcesConfig {
    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("sources.openreview.base_url", self.openreview.base_url.as_str()),
            ("sources.openreview_v2_base_url", self.openreview_v2_base_url.as_str()),
            ("sources.openalex.base_url", self.openalex.base_url.as_str()),
            ("sources.semantic_scholar.base_url", self.semantic_scholar.base_url.as_str()),
            ("sources.proceedings.base_url", self.proceedings.base_url.as_str()),
        ];
        for (key, url) in urls {
            let url = url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CoreError::ConfigError(format!(
                    "{key} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        Ok(())
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/confcloud/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CONFCLOUD_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("confcloud")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.enrichment.validate()?;
        self.sources.validate()
    }

    // ─── Derived paths ─────────────────────────────────────

    /// Checkpoint file for one conference.
    pub fn checkpoint_path(&self, conference: &str) -> PathBuf {
        let key = conference.trim().to_lowercase();
        let key = if key.is_empty() { "default".to_string() } else { key };
        PathBuf::from(&self.core.checkpoint_dir).join(format!("{key}.checkpoint.json"))
    }
}
