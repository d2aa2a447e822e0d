//! Runtime configuration for a `SpaceContext`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::default_workers;
use crate::{Error, Result};

/// Settings for a process-wide space. Every field has a default, so a JSON
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Snapshot loaded at startup, if it exists.
    pub snapshot_path: Option<PathBuf>,
    pub batch_size: usize,
    /// Batch pool size; `None` means all cores but one.
    pub workers: Option<usize>,
    pub kmeans_seed: u64,
    pub kmeans_n_init: usize,
    pub max_iterations: usize,
    pub default_neighbors: usize,
    /// Upper bound for clustering/projection on the async API.
    pub analytics_timeout_ms: u64,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            batch_size: 1000,
            workers: None,
            kmeans_seed: 42,
            kmeans_n_init: 10,
            max_iterations: 100,
            default_neighbors: 5,
            analytics_timeout_ms: 30_000,
        }
    }
}

impl SpaceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: SpaceConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".into()));
        }
        if self.kmeans_n_init == 0 {
            return Err(Error::Validation("kmeans_n_init must be at least 1".into()));
        }
        if self.workers == Some(0) {
            return Err(Error::Validation("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    pub fn analytics_timeout(&self) -> Duration {
        Duration::from_millis(self.analytics_timeout_ms)
    }
}
