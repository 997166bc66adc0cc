//! Process-wide configuration.
//!
//! Provides [`RecommendsConfig`], loaded from TOML files, environment
//! variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit config path
//! 2. `RECOMMENDS_CONFIG` environment variable
//! 3. XDG default: `~/.config/recommends/config.toml`
//! 4. Built-in defaults
//!
//! `RECOMMENDS_*` environment variables are layered on top of the file.

use std::path::PathBuf;
use std::time::Duration;

use confyg::{Confygery, env};
use recommends_core::storage::StorageConfig;
use recommends_core::{Error, Result, SiteId};
use recommends_engine::{Metric, metric_by_name};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration structs
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendsConfig {
    /// Site used for ratings whose domain has no notion of sites.
    pub default_site: String,

    /// Storage backend selection.
    pub storage: StorageConfig,

    /// Similarity engine settings.
    pub engine: EngineConfig,

    /// Invalidation worker settings.
    pub tasks: TaskConfig,
}

/// Similarity engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default metric: `"distance"` or `"pearson"`.
    pub metric: String,

    /// Cap on related items kept per item. Unset keeps all.
    pub max_similar_items: Option<usize>,
}

/// Invalidation worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum number of jobs running at once.
    pub workers: usize,

    /// Attempts per job, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds. Doubles per retry.
    pub initial_delay_ms: u64,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for RecommendsConfig {
    fn default() -> Self {
        Self {
            default_site: SiteId::default().to_string(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            tasks: TaskConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metric: "distance".to_string(),
            max_similar_items: None,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            initial_delay_ms: 100,
        }
    }
}

impl EngineConfig {
    /// Resolve the configured metric.
    pub fn metric(&self) -> Result<Metric> {
        metric_by_name(&self.metric)
    }
}

impl TaskConfig {
    /// The first retry delay as a `Duration`.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl RecommendsConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("RECOMMENDS");
        env_opts.add_section("storage");
        env_opts.add_section("engine");
        env_opts.add_section("tasks");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit path, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("RECOMMENDS_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("recommends").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// The sentinel site for single-site domains.
    pub fn default_site(&self) -> SiteId {
        SiteId::new(self.default_site.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
