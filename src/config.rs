//! Configuration for the admission controller.
//!
//! The limits table is seeded once at startup: a global config, per-retailer
//! limits with optional concurrency caps, optional per-domain limits and the
//! work queue capacity. Files may be TOML, YAML or JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rate_limit::{Clock, RateLimitConfig, RateLimitError, RateLimiter, ScopeKey};
use crate::work_queue::{QueueItem, RequestQueue, DEFAULT_MAX_SIZE};

/// Environment override for the per-tier queue capacity.
pub const ENV_QUEUE_MAX_SIZE: &str = "SCRAPEGATE_QUEUE_MAX_SIZE";

/// Environment override for the global requests per second.
pub const ENV_GLOBAL_RPS: &str = "SCRAPEGATE_GLOBAL_RPS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config: {message}")]
    Parse { format: &'static str, message: String },
    #[error(transparent)]
    Invalid(#[from] RateLimitError),
}

/// Limits for one retailer or domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeLimitsConfig {
    #[serde(flatten)]
    pub limits: RateLimitConfig,
    /// Simultaneous in-flight requests; unlimited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

impl ScopeLimitsConfig {
    pub fn new(limits: RateLimitConfig, max_concurrent: Option<usize>) -> Self {
        Self {
            limits,
            max_concurrent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Capacity of each priority tier.
    #[serde(default = "default_queue_max_size")]
    pub max_size: usize,
}

fn default_queue_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// Full admission control configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub global: RateLimitConfig,
    #[serde(default)]
    pub retailers: BTreeMap<String, ScopeLimitsConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub domains: BTreeMap<String, ScopeLimitsConfig>,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Path this config was loaded from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global: RateLimitConfig::default(),
            retailers: default_retailers(),
            domains: BTreeMap::new(),
            queue: QueueConfig::default(),
            source_path: None,
        }
    }
}

/// Out-of-the-box limits for the retailers the pipeline scrapes. These are
/// deployment defaults; override them in a config file.
fn default_retailers() -> BTreeMap<String, ScopeLimitsConfig> {
    let table = [
        ("amazon", RateLimitConfig::new(1.0, 30, 1000, 5, 1.0), 2),
        ("walmart", RateLimitConfig::new(2.0, 60, 2000, 10, 0.5), 3),
        ("target", RateLimitConfig::new(1.5, 45, 1500, 5, 0.75), 2),
        ("bestbuy", RateLimitConfig::new(0.5, 20, 600, 3, 2.0), 1),
        ("ebay", RateLimitConfig::new(3.0, 90, 3000, 15, 0.25), 4),
        ("costco", RateLimitConfig::new(0.25, 10, 300, 2, 3.0), 1),
    ];

    table
        .into_iter()
        .map(|(name, limits, concurrent)| {
            (
                name.to_string(),
                ScopeLimitsConfig::new(limits, Some(concurrent)),
            )
        })
        .collect()
}

impl AdmissionConfig {
    /// Discover a `scrapegate` config file in the standard locations, falling
    /// back to defaults when none is found or it fails to load.
    pub async fn load() -> Self {
        match prefer::load("scrapegate").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("Ignoring config file: {}", e);
                            Self::default().with_env_overrides()
                        }
                    }
                } else {
                    Self::default().with_env_overrides()
                }
            }
            Err(_) => Self::default().with_env_overrides(),
        }
    }

    /// Load from a file; the format follows the extension (JSON otherwise).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Apply environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(max_size) = env_parse::<usize>(ENV_QUEUE_MAX_SIZE) {
            self.queue.max_size = max_size;
        }
        if let Some(rps) = env_parse::<f64>(ENV_GLOBAL_RPS) {
            self.global.requests_per_second = rps;
        }
        self
    }

    /// Check every configured scope.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.global.validate("global")?;
        for (name, scope) in self.retailers.iter().chain(self.domains.iter()) {
            scope.limits.validate(name)?;
            if scope.max_concurrent == Some(0) {
                return Err(RateLimitError::InvalidConcurrency {
                    scope: name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Build a limiter seeded with this table.
    pub async fn build_limiter(&self, clock: Arc<dyn Clock>) -> Result<RateLimiter, ConfigError> {
        let limiter = RateLimiter::with_clock(clock);
        limiter
            .configure(ScopeKey::Global, self.global.clone())
            .await?;

        for (name, scope) in &self.retailers {
            limiter
                .configure(ScopeKey::retailer(name.as_str()), scope.limits.clone())
                .await?;
            if let Some(limit) = scope.max_concurrent {
                limiter.set_concurrent_limit(name, limit).await?;
            }
        }
        for (name, scope) in &self.domains {
            limiter
                .configure(ScopeKey::domain(name.as_str()), scope.limits.clone())
                .await?;
            if let Some(limit) = scope.max_concurrent {
                limiter.set_concurrent_limit(name, limit).await?;
            }
        }
        Ok(limiter)
    }

    pub fn build_queue<T: QueueItem>(&self) -> RequestQueue<T> {
        RequestQueue::new(self.queue.max_size)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.trim().parse().ok())
}
