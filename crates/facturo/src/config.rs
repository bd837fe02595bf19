//! Batch pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hard ceiling on manifest rows per batch.
pub const MAX_BATCH_ITEMS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    /// Root under which each job gets its own working directory,
    /// keyed by the job's public identifier.
    pub work_root: PathBuf,
    /// Price per converted invoice, in cents.
    pub unit_price_cents: i64,
    /// Maximum manifest rows accepted per batch.
    pub max_items: usize,
    /// How long a completed job's output archive stays downloadable.
    pub download_ttl_hours: i64,
    /// Persist progress every N processed (or failed) items.
    pub checkpoint_every: u64,
    /// Upload cap for the input archive.
    pub max_archive_bytes: u64,
    /// Upload cap for the manifest.
    pub max_manifest_bytes: u64,
    /// Assumed mean PDF size, used for the provisional item estimate
    /// at submission time. Corrected once the manifest is parsed.
    pub estimated_item_bytes: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("facturo"),
            unit_price_cents: 20,
            max_items: MAX_BATCH_ITEMS,
            download_ttl_hours: 24,
            checkpoint_every: 10,
            max_archive_bytes: 500 * 1024 * 1024,
            max_manifest_bytes: 10 * 1024 * 1024,
            estimated_item_bytes: 150 * 1024,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BatchConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<BatchConfig, ConfigError> {
    let config: BatchConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.unit_price_cents < 0 {
        return Err(ConfigError::Validation {
            message: format!("unitPriceCents must be >= 0, got {}", config.unit_price_cents),
        });
    }
    if config.max_items == 0 || config.max_items > MAX_BATCH_ITEMS {
        return Err(ConfigError::Validation {
            message: format!("maxItems must be in 1..={}, got {}", MAX_BATCH_ITEMS, config.max_items),
        });
    }
    if config.checkpoint_every == 0 {
        return Err(ConfigError::Validation {
            message: "checkpointEvery must be > 0".to_string(),
        });
    }
    Ok(())
}
