//! TOML configuration.
//!
//! ```toml
//! threads = 8
//! builder = "morton"
//!
//! [morton]
//! leaf_size = 4
//! top_level_threshold = 512
//!
//! [cache]
//! slot_count = 1024
//! capacity_blocks = 4096
//! ```
//!
//! Every section is optional and falls back to its defaults.

use std::path::Path;

use bvhkit_bvh::{MortonSettings, SahSettings};
use bvhkit_cache::{CacheSettings, SubtreeCache};
use bvhkit_parallel::WorkerPool;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A section holds out-of-range values.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which builder [`crate::build_bvh`] runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    /// Top-down binned surface area heuristic.
    #[default]
    BinnedSah,
    /// Space-filling curve ordering.
    Morton,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads; one per hardware thread when unset.
    pub threads: Option<usize>,
    /// Builder used by [`crate::build_bvh`].
    pub builder: BuilderKind,
    /// Binned SAH settings.
    pub sah: SahSettings,
    /// Morton settings.
    pub morton: MortonSettings,
    /// Subtree cache sizing.
    pub cache: CacheSettings,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("loading config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check every section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be positive".into()));
        }
        self.sah
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("[sah] {e}")))?;
        self.morton
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("[morton] {e}")))?;
        self.cache
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("[cache] {e}")))?;
        Ok(())
    }

    /// Create the worker pool described by `threads`.
    pub fn worker_pool(&self) -> bvhkit_parallel::Result<WorkerPool> {
        match self.threads {
            Some(n) => WorkerPool::new(n),
            None => WorkerPool::with_available_parallelism(),
        }
    }

    /// Create an empty cache with the configured sizing.
    pub fn subtree_cache<B: Copy + Default>(&self) -> bvhkit_cache::Result<SubtreeCache<B>> {
        SubtreeCache::new(self.cache.clone())
    }
}
