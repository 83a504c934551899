//! Pipeline configuration.
//!
//! Loaded from `config.toml` in the data root, or from the file given with
//! `--config`. User values are merged over the stock defaults, so a config
//! file only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [generation]
//! enabled_globally = false   # treat every entity as enabled
//! default_category = ""      # category used when an entity selects nothing
//! jpeg_quality = 90          # 1-100
//! variant_timeout_secs = 60  # 0 disables the per-variant timeout
//! backend = "auto"           # auto | full | basic
//!
//! [batch]
//! batch_size = 10            # entities per drain cycle
//! processing_delay_secs = 2  # pause between cycles
//! max_workers = 4            # parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::batch::BatchSettings;
use crate::generate::GenerationSettings;
use crate::imaging::{BackendChoice, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockupConfig {
    pub generation: GenerationConfig,
    pub batch: BatchConfig,
}

impl MockupConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.generation.jpeg_quality) {
            return Err(ConfigError::Validation(
                "generation.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(ConfigError::Validation(
                "batch.batch_size must be at least 1".into(),
            ));
        }
        if self.batch.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "batch.max_workers must be at least 1 (omit for auto)".into(),
            ));
        }
        Ok(())
    }

    /// Orchestrator settings. An empty default category means none and a
    /// zero timeout disables the deadline.
    pub fn generation_settings(&self) -> GenerationSettings {
        let generation = &self.generation;
        let default_category = generation.default_category.trim();
        GenerationSettings {
            enabled_globally: generation.enabled_globally,
            default_category: (!default_category.is_empty()).then(|| default_category.to_string()),
            quality: Quality::new(generation.jpeg_quality),
            variant_timeout: (generation.variant_timeout_secs > 0)
                .then(|| Duration::from_secs(generation.variant_timeout_secs)),
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch.batch_size,
            processing_delay: Duration::from_secs(self.batch.processing_delay_secs),
        }
    }
}

/// Mockup generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    pub enabled_globally: bool,
    pub default_category: String,
    pub jpeg_quality: u32,
    pub variant_timeout_secs: u64,
    pub backend: BackendChoice,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled_globally: false,
            default_category: String::new(),
            jpeg_quality: 90,
            variant_timeout_secs: 60,
            backend: BackendChoice::Auto,
        }
    }
}

/// Batch scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub processing_delay_secs: u64,
    /// Maximum parallel workers. When absent, defaults to the number of CPU
    /// cores. Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            processing_delay_secs: 2,
            max_workers: None,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &BatchConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(MockupConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(file: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(file)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MockupConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MockupConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective config.
///
/// An explicit file must exist; otherwise `config.toml` in `root` is used
/// when present and the stock defaults when not.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<MockupConfig, ConfigError> {
    let overlay = match explicit {
        Some(file) => {
            let content = fs::read_to_string(file)?;
            Some(toml::from_str(&content)?)
        }
        None => load_raw_config(&root.join(CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Mockup Forge Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at <root>/config.toml or pass it with --config.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Generation
# ---------------------------------------------------------------------------
[generation]
# Treat every entity as enabled, regardless of its own flag.
enabled_globally = false

# Category to generate when an entity has selected nothing.
# Empty means: generate nothing for such entities.
default_category = ""

# JPEG quality of generated mockups (1 = worst, 100 = best).
jpeg_quality = 90

# Seconds one variant may take to render before it is abandoned.
# 0 disables the timeout.
variant_timeout_secs = 60

# Image backend: "full" (JPEG/PNG/TIFF/WebP, alpha-aware compositing),
# "basic" (JPEG/PNG, opaque RGB) or "auto" (full when available).
backend = "auto"

# ---------------------------------------------------------------------------
# Batch regeneration
# ---------------------------------------------------------------------------
[batch]
# Entities processed per drain cycle.
batch_size = 10

# Pause between drain cycles, in seconds.
processing_delay_secs = 2

# Maximum parallel workers per cycle.
# Omit to auto-detect (= number of CPU cores).
# Values larger than the core count are clamped down.
# max_workers = 4
"##
}
