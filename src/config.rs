//! Configuration
//!
//! Settings come from, in increasing precedence:
//!
//! 1. Built-in defaults
//! 2. A TOML file: `--config PATH`, else `./brandscrub.toml`, else
//!    `<config dir>/brandscrub/config.toml`
//! 3. Environment variables (`BRANDSCRUB_*`)
//! 4. Command-line flags that were explicitly given ([`CliOverrides`])
//!
//! ```toml
//! [pipeline]
//! clean_risk_threshold = 30
//! max_passes = 3
//!
//! [batch]
//! inter_item_delay_ms = 2000
//!
//! [detector]
//! base_url = "https://vision.example.com/v1"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::batch::{BatchOptions, MAX_CONCURRENCY};
use crate::detection::{RegionFilter, DEFAULT_MIN_REGION_SIZE};
use crate::mask::{FallbackMode, MaskOptions, DEFAULT_BLUR_INTENSITY, DEFAULT_FULL_FRAME_INTENSITY};
use crate::pipeline::{ExhaustedStatus, PipelineOptions, DEFAULT_BLUR_SIGNIFICANCE_THRESHOLD};
use crate::remote::ServiceConfig;
use crate::retry::RetryPolicy;
use crate::verify::{
    VerifyOptions, DEFAULT_CLEAN_RISK_THRESHOLD, DEFAULT_MAX_PASSES, MAX_PASSES_LIMIT,
};

/// Config file name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "brandscrub.toml";

/// Directory name under the user config dir
const USER_CONFIG_DIR: &str = "brandscrub";

/// Environment variables holding API keys and endpoints
pub const ENV_DETECTOR_API_KEY: &str = "BRANDSCRUB_DETECTOR_API_KEY";
pub const ENV_EDITOR_API_KEY: &str = "BRANDSCRUB_EDITOR_API_KEY";
pub const ENV_TITLE_API_KEY: &str = "BRANDSCRUB_TITLE_API_KEY";
pub const ENV_DETECTOR_URL: &str = "BRANDSCRUB_DETECTOR_URL";
pub const ENV_EDITOR_URL: &str = "BRANDSCRUB_EDITOR_URL";
pub const ENV_TITLE_URL: &str = "BRANDSCRUB_TITLE_URL";

// ============================================================
// Error Types
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// Sections
// ============================================================

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub clean_risk_threshold: u8,
    pub max_passes: u32,
    pub blur_intensity: u32,
    pub min_region_size: u32,
    pub min_confidence: f32,
    pub fallback_blur: bool,
    pub fallback_mode: FallbackMode,
    pub full_frame_intensity: u32,
    pub treat_fallback_blur_as_clean: bool,
    pub blur_significance_threshold: u8,
    pub narrow_instructions: bool,
    pub exhausted_status: ExhaustedStatus,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            clean_risk_threshold: DEFAULT_CLEAN_RISK_THRESHOLD,
            max_passes: DEFAULT_MAX_PASSES,
            blur_intensity: DEFAULT_BLUR_INTENSITY,
            min_region_size: DEFAULT_MIN_REGION_SIZE,
            min_confidence: 0.0,
            fallback_blur: true,
            fallback_mode: FallbackMode::Copy,
            full_frame_intensity: DEFAULT_FULL_FRAME_INTENSITY,
            treat_fallback_blur_as_clean: false,
            blur_significance_threshold: DEFAULT_BLUR_SIGNIFICANCE_THRESHOLD,
            narrow_instructions: true,
            exhausted_status: ExhaustedStatus::NeedsReview,
        }
    }
}

/// `[batch]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub inter_item_delay_ms: u64,
    pub concurrency: usize,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 2000,
            concurrency: 1,
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Product manifest (JSON)
    pub catalog_path: Option<PathBuf>,
    /// Results document; in-memory only when unset
    pub results_path: Option<PathBuf>,
    /// Directory for edited images
    pub output_dir: Option<PathBuf>,
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSection,
    pub batch: BatchSection,
    pub detector: ServiceConfig,
    pub editor: ServiceConfig,
    pub title: ServiceConfig,
    pub retry: RetryPolicy,
    pub storage: StorageSection,
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub clean_risk_threshold: Option<u8>,
    pub max_passes: Option<u32>,
    pub blur_intensity: Option<u32>,
    pub min_region_size: Option<u32>,
    pub fallback_blur: Option<bool>,
    pub treat_fallback_blur_as_clean: Option<bool>,
    pub inter_item_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub catalog_path: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================
// Loading
// ============================================================

impl Config {
    /// Candidate file locations, in lookup order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(USER_CONFIG_DIR).join("config.toml"));
        }
        paths
    }

    /// Load the first config file found, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `BRANDSCRUB_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply variables from an arbitrary lookup; blank values are ignored
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let services = [
            (&mut self.detector, ENV_DETECTOR_API_KEY, ENV_DETECTOR_URL),
            (&mut self.editor, ENV_EDITOR_API_KEY, ENV_EDITOR_URL),
            (&mut self.title, ENV_TITLE_API_KEY, ENV_TITLE_URL),
        ];
        for (service, key_var, url_var) in services {
            if let Some(key) = get(key_var) {
                service.api_key = Some(key);
            }
            if let Some(url) = get(url_var) {
                service.base_url = Some(url);
            }
        }
    }

    /// Merge CLI overrides on top (CLI wins)
    #[must_use]
    pub fn merge_with_cli(mut self, cli: &CliOverrides) -> Self {
        let p = &mut self.pipeline;
        if let Some(v) = cli.clean_risk_threshold {
            p.clean_risk_threshold = v;
        }
        if let Some(v) = cli.max_passes {
            p.max_passes = v;
        }
        if let Some(v) = cli.blur_intensity {
            p.blur_intensity = v;
        }
        if let Some(v) = cli.min_region_size {
            p.min_region_size = v;
        }
        if let Some(v) = cli.fallback_blur {
            p.fallback_blur = v;
        }
        if let Some(v) = cli.treat_fallback_blur_as_clean {
            p.treat_fallback_blur_as_clean = v;
        }

        if let Some(v) = cli.inter_item_delay_ms {
            self.batch.inter_item_delay_ms = v;
        }
        if let Some(v) = cli.concurrency {
            self.batch.concurrency = v;
        }

        if let Some(v) = &cli.catalog_path {
            self.storage.catalog_path = Some(v.clone());
        }
        if let Some(v) = &cli.results_path {
            self.storage.results_path = Some(v.clone());
        }
        if let Some(v) = &cli.output_dir {
            self.storage.output_dir = Some(v.clone());
        }

        self
    }

    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.clean_risk_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "clean_risk_threshold must be 0..=100, got {}",
                p.clean_risk_threshold
            )));
        }
        if p.max_passes == 0 || p.max_passes > MAX_PASSES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_passes must be 1..={}, got {}",
                MAX_PASSES_LIMIT, p.max_passes
            )));
        }
        if p.blur_significance_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "blur_significance_threshold must be 0..=100, got {}",
                p.blur_significance_threshold
            )));
        }
        if !(0.0..=1.0).contains(&p.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be 0..=1, got {}",
                p.min_confidence
            )));
        }
        if self.batch.concurrency == 0 || self.batch.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Invalid(format!(
                "concurrency must be 1..={}, got {}",
                MAX_CONCURRENCY, self.batch.concurrency
            )));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(())
    }

    // ============================================================
    // Option conversions
    // ============================================================

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions::builder()
            .clean_risk_threshold(self.pipeline.clean_risk_threshold)
            .max_passes(self.pipeline.max_passes)
            .fallback_blur(self.pipeline.fallback_blur)
            .narrow_instructions(self.pipeline.narrow_instructions)
            .build()
    }

    pub fn mask_options(&self) -> MaskOptions {
        MaskOptions::builder()
            .intensity(self.pipeline.blur_intensity)
            .min_region_size(self.pipeline.min_region_size)
            .fallback(self.pipeline.fallback_mode)
            .full_frame_intensity(self.pipeline.full_frame_intensity)
            .build()
    }

    pub fn region_filter(&self) -> RegionFilter {
        RegionFilter {
            min_size: self.pipeline.min_region_size,
            min_confidence: self.pipeline.min_confidence,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            treat_fallback_blur_as_clean: self.pipeline.treat_fallback_blur_as_clean,
            blur_significance_threshold: self.pipeline.blur_significance_threshold,
            exhausted_status: self.pipeline.exhausted_status,
            output_dir: self.storage.output_dir.clone(),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions::new(
            Duration::from_millis(self.batch.inter_item_delay_ms),
            self.batch.concurrency,
        )
    }
}
