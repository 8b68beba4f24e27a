//! Configuration types for image extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Credentials are ordinary fields: they
//! are read from the environment once, at startup, by whoever builds the
//! config (see [`ExtractionConfig::from_env`]) and then handed to the
//! [`crate::Extractor`] constructor. The extraction pipeline never reads
//! secrets on its own. The graph flow is separate: with no explicit
//! [`crate::GraphConfig::api_key`] it falls back to provider auto-detection
//! from the environment.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default local partitioning endpoint (a self-hosted Unstructured API).
pub const DEFAULT_UNSTRUCTURED_URL: &str = "http://localhost:8000";
/// Default remote OCR endpoint.
pub const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
/// Default remote OCR model.
pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-ocr-latest";
/// Images narrower than this are upscaled before encoding.
pub const DEFAULT_MIN_WIDTH: u32 = 2000;

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use scan2table::{ExtractionConfig, PartitionStrategy};
///
/// let config = ExtractionConfig::builder()
///     .strategy(PartitionStrategy::HiRes)
///     .mistral_api_key("sk-test")
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.min_width, 2000);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Minimum width of the normalized image in pixels. Default: 2000.
    ///
    /// Narrower images are upscaled with Lanczos resampling, aspect ratio
    /// preserved. Wider images are never downscaled.
    pub min_width: u32,

    /// Strategy hint passed to the local partitioner. Default: `HiRes`.
    pub strategy: PartitionStrategy,

    /// Thresholds for the local-result quality gate.
    pub thresholds: QualityThresholds,

    /// Base URL of the Unstructured partition API. Default: `http://localhost:8000`.
    pub unstructured_url: String,

    /// Optional API key for the Unstructured service.
    pub unstructured_api_key: Option<String>,

    /// Base URL of the Mistral API. Default: `https://api.mistral.ai`.
    pub mistral_base_url: String,

    /// Mistral OCR model. Default: `mistral-ocr-latest`.
    pub mistral_model: String,

    /// Mistral API key. Only needed when the fallback actually fires.
    pub mistral_api_key: Option<String>,

    /// Per-request timeout for each collaborator HTTP call, in seconds. Default: 120.
    ///
    /// The pipeline itself has no deadline; this bounds each external call.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Images processed at once in batch mode. Default: 4.
    ///
    /// Each image is still handled start to finish by a single task; this
    /// only bounds how many such tasks are in flight.
    pub concurrency: usize,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            strategy: PartitionStrategy::default(),
            thresholds: QualityThresholds::default(),
            unstructured_url: DEFAULT_UNSTRUCTURED_URL.to_string(),
            unstructured_api_key: None,
            mistral_base_url: DEFAULT_MISTRAL_BASE_URL.to_string(),
            mistral_model: DEFAULT_MISTRAL_MODEL.to_string(),
            mistral_api_key: None,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("min_width", &self.min_width)
            .field("strategy", &self.strategy)
            .field("thresholds", &self.thresholds)
            .field("unstructured_url", &self.unstructured_url)
            .field("unstructured_api_key", &redact(&self.unstructured_api_key))
            .field("mistral_base_url", &self.mistral_base_url)
            .field("mistral_model", &self.mistral_model)
            .field("mistral_api_key", &redact(&self.mistral_api_key))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create a builder seeded from environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `MISTRAL_API_KEY` | `mistral_api_key` |
    /// | `MISTRAL_BASE_URL` | `mistral_base_url` |
    /// | `UNSTRUCTURED_API_URL` | `unstructured_url` |
    /// | `UNSTRUCTURED_API_KEY` | `unstructured_api_key` |
    ///
    /// Empty variables are ignored.
    pub fn from_env() -> ExtractionConfigBuilder {
        let mut builder = Self::builder();
        if let Some(key) = env_nonempty("MISTRAL_API_KEY") {
            builder = builder.mistral_api_key(key);
        }
        if let Some(url) = env_nonempty("MISTRAL_BASE_URL") {
            builder = builder.mistral_base_url(url);
        }
        if let Some(url) = env_nonempty("UNSTRUCTURED_API_URL") {
            builder = builder.unstructured_url(url);
        }
        if let Some(key) = env_nonempty("UNSTRUCTURED_API_KEY") {
            builder = builder.unstructured_api_key(key);
        }
        builder
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn min_width(mut self, px: u32) -> Self {
        self.config.min_width = px;
        self
    }

    pub fn strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn unstructured_url(mut self, url: impl Into<String>) -> Self {
        self.config.unstructured_url = url.into();
        self
    }

    pub fn unstructured_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.unstructured_api_key = Some(key.into());
        self
    }

    pub fn mistral_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.mistral_base_url = url.into();
        self
    }

    pub fn mistral_model(mut self, model: impl Into<String>) -> Self {
        self.config.mistral_model = model.into();
        self
    }

    pub fn mistral_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.mistral_api_key = Some(key.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.min_width == 0 {
            return Err(ExtractError::InvalidConfig(
                "Minimum width must be ≥ 1".into(),
            ));
        }
        if c.thresholds.min_rows == 0 {
            return Err(ExtractError::InvalidConfig(
                "Quality gate min_rows must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.thresholds.max_empty_ratio) {
            return Err(ExtractError::InvalidConfig(format!(
                "Quality gate max_empty_ratio must be 0.0–1.0, got {}",
                c.thresholds.max_empty_ratio
            )));
        }
        for (name, url) in [
            ("unstructured_url", &c.unstructured_url),
            ("mistral_base_url", &c.mistral_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ExtractError::InvalidConfig(format!(
                    "{name} must be an HTTP/HTTPS URL, got '{url}'"
                )));
            }
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Strategy hint for the local partitioner.
///
/// `HiRes` runs layout detection and table-structure inference; it is the
/// only strategy that yields table markup, and therefore the only one that
/// can realistically pass the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    Auto,
    Fast,
    /// Layout model + table structure (default).
    #[default]
    HiRes,
    OcrOnly,
}

impl PartitionStrategy {
    /// Wire name understood by the partitioner.
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStrategy::Auto => "auto",
            PartitionStrategy::Fast => "fast",
            PartitionStrategy::HiRes => "hi_res",
            PartitionStrategy::OcrOnly => "ocr_only",
        }
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied by the quality gate to every detected table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// A table with fewer `<tr>` rows is rejected. Default: 2.
    pub min_rows: usize,
    /// A table whose share of empty `<td>` cells exceeds this is rejected. Default: 0.5.
    pub max_empty_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_rows: 2,
            max_empty_ratio: 0.5,
        }
    }
}
