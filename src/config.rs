//! Pipeline configuration.
//!
//! Loaded from a single `vitrine.toml`. Stock defaults form the base layer and
//! the user file is merged on top, so a file only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [fit]
//! max_width = 1400          # Longest allowed width after the initial downscale
//! max_height = 1400
//! quality = 0.85            # First-pass encode quality (0.0-1.0)
//! min_quality = 0.35        # Quality floor before dimensions start shrinking
//! max_bytes = 798720        # Binary budget (780 KiB)
//! max_passes = 8            # Hard cap on encode passes
//!
//! [storage]
//! field_max = 1048487       # Max characters of the stored data URL
//! dir = "store"             # Where FsStore writes documents
//!
//! [enrichment]
//! # endpoint = "https://example.com/generate"   # Omit to disable enrichment
//! brand = "Our Brand"
//! timeout_secs = 30
//!
//! [enrichment.retry]
//! attempts = 3
//! initial_delay_ms = 1000
//! backoff_factor = 2
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::enrich::RetryPolicy;
use crate::enrich::client::DEFAULT_BRAND;
use crate::imaging::{FitConfig, Quality, TARGET_MAX_BLOB_BYTES};
use crate::textual::FIRESTORE_FIELD_MAX;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "vitrine.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full configuration. Every section has defaults; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VitrineConfig {
    pub fit: FitSection,
    pub storage: StorageSection,
    pub enrichment: EnrichmentSection,
    pub processing: ProcessingConfig,
}

impl VitrineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fit = &self.fit;
        if !(fit.min_quality > 0.0
            && fit.min_quality <= fit.quality
            && fit.quality <= 1.0)
        {
            return Err(ConfigError::Validation(
                "fit qualities must satisfy 0 < min_quality <= quality <= 1".into(),
            ));
        }
        if fit.max_width == 0 || fit.max_height == 0 {
            return Err(ConfigError::Validation(
                "fit.max_width and fit.max_height must be non-zero".into(),
            ));
        }
        if fit.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "fit.max_bytes must be non-zero".into(),
            ));
        }
        if fit.max_passes == 0 {
            return Err(ConfigError::Validation(
                "fit.max_passes must be at least 1".into(),
            ));
        }
        if self.storage.field_max == 0 {
            return Err(ConfigError::Validation(
                "storage.field_max must be non-zero".into(),
            ));
        }
        let retry = &self.enrichment.retry;
        if retry.attempts == 0 {
            return Err(ConfigError::Validation(
                "enrichment.retry.attempts must be at least 1".into(),
            ));
        }
        if retry.backoff_factor == 0 {
            return Err(ConfigError::Validation(
                "enrichment.retry.backoff_factor must be at least 1".into(),
            ));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "enrichment.timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fitting loop bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitSection {
    pub max_width: u32,
    pub max_height: u32,
    /// Starting quality as a fraction.
    pub quality: f64,
    /// Quality floor as a fraction.
    pub min_quality: f64,
    pub max_bytes: u64,
    pub max_passes: u32,
}

impl Default for FitSection {
    fn default() -> Self {
        Self {
            max_width: 1400,
            max_height: 1400,
            quality: 0.85,
            min_quality: 0.35,
            max_bytes: TARGET_MAX_BLOB_BYTES,
            max_passes: 8,
        }
    }
}

impl FitSection {
    pub fn to_fit_config(&self) -> FitConfig {
        FitConfig {
            max_width: self.max_width,
            max_height: self.max_height,
            quality_start: Quality::from_fraction(self.quality),
            min_quality: Quality::from_fraction(self.min_quality),
            max_bytes: self.max_bytes,
            max_passes: self.max_passes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Character limit on the stored data URL.
    pub field_max: usize,
    /// Document directory for the file store.
    pub dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            field_max: FIRESTORE_FIELD_MAX,
            dir: "store".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrichmentSection {
    /// Generation endpoint. Absent means enrichment is off.
    pub endpoint: Option<String>,
    /// Brand name woven into prompts.
    pub brand: String,
    pub timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for EnrichmentSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            brand: DEFAULT_BRAND.to_string(),
            timeout_secs: 30,
            retry: RetrySection::default(),
        }
    }
}

impl EnrichmentSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured endpoint, treating a blank string as unset.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2,
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel ingestion workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, never below 1
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Stock defaults as a `toml::Value::Table`, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(VitrineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
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
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<VitrineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: VitrineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is missing.
pub fn load_config(path: &Path) -> Result<VitrineConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(path)?)
}

/// A fully-commented stock `vitrine.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Vitrine Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Size fitting
# ---------------------------------------------------------------------------
[fit]
# Images larger than this are scaled down once, keeping aspect ratio.
max_width = 1400
max_height = 1400

# First-pass JPEG quality (0.0 - 1.0). Each further pass lowers it by 0.10.
quality = 0.85

# Quality floor. Once reached, passes shrink dimensions by 10% instead.
min_quality = 0.35

# Binary budget in bytes (780 KiB).
max_bytes = 798720

# Maximum encode passes. Inputs that never fit end as "budget exhausted".
max_passes = 8

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Maximum length, in characters, of the stored data URL. Assets whose
# textual form is longer are rejected.
field_max = 1048487

# Directory for stored JSON documents.
dir = "store"

# ---------------------------------------------------------------------------
# Enrichment (optional)
# ---------------------------------------------------------------------------
[enrichment]
# Text-generation endpoint. Without one, ingestion skips enrichment.
# Can also be set with --endpoint or VITRINE_ENDPOINT.
# endpoint = "https://example.com/generate"

# Brand name used in prompts.
brand = "Our Brand"

# Per-request timeout in seconds.
timeout_secs = 30

# Retry policy for explicit text generation. The wait after failed attempt n
# is initial_delay_ms * backoff_factor^(n-1). No wait after the last attempt.
[enrichment.retry]
attempts = 3
initial_delay_ms = 1000
backoff_factor = 2

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel ingestion workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
