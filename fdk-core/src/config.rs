//! Configuration
//!
//! ## Sources (in precedence order)
//!
//! 1. Environment variables (`FDK_API_URL`, `FDK_CACHE_DIR`, ...)
//! 2. `config.yaml` (explicit path, or `<config dir>/config.yaml`)
//! 3. Built-in defaults
//!
//! ```yaml
//! source:
//!   baseUrl: https://bim-fdk-api.app.sbb.ch
//!   language: de
//! cache:
//!   maxAgeHours: 24
//! retry:
//!   maxAttempts: 3
//!   baseDelayMs: 1000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::Language;
use crate::search::SearchField;

/// Default upstream API
pub const DEFAULT_BASE_URL: &str = "https://bim-fdk-api.app.sbb.ch";

/// Hard bounds for the bulk download worker pool
pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FdkConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Remote source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub language: Language,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            language: Language::default(),
        }
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Run without any local store when false
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Store root; platform cache directory when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_age_hours: default_max_age_hours(),
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(3600))
    }

    /// The configured directory, or the platform cache directory
    pub fn resolved_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(),
        }
    }
}

/// Retry and backoff for remote fetches
///
/// Delay before retry `n` (1-based) is `base_delay * multiplier^(n-1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            multiplier: 1,
            max_delay_ms: 0,
        }
    }

    /// Backoff to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(exponent);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Bulk download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Average wall time of one detail fetch, for coverage estimates
    #[serde(default = "default_seconds_per_object")]
    pub estimated_seconds_per_object: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            estimated_seconds_per_object: default_seconds_per_object(),
        }
    }
}

/// Search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Fields whose matching needs detail records (backfill triggers)
    #[serde(default = "default_detail_fields")]
    pub detail_fields: Vec<SearchField>,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            detail_fields: default_detail_fields(),
            max_limit: default_max_limit(),
        }
    }
}

impl SearchConfig {
    pub fn requires_detail(&self, field: SearchField) -> bool {
        self.detail_fields.contains(&field)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_max_concurrency() -> usize {
    10
}

fn default_seconds_per_object() -> f64 {
    0.5
}

fn default_max_limit() -> usize {
    1000
}

fn default_detail_fields() -> Vec<SearchField> {
    vec![
        SearchField::All,
        SearchField::Description,
        SearchField::PropertySets,
        SearchField::PropertySetNames,
        SearchField::Properties,
        SearchField::PropertyNames,
        SearchField::Relationships,
        SearchField::Classifications,
        SearchField::Attributes,
    ]
}

/// Get the config directory
pub fn config_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("ch", "fdk", "fdk")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .or_else(|| dirs::config_dir().map(|d| d.join("fdk")))
        .context("Could not determine config directory")
}

/// Get the platform cache directory for the object store
pub fn default_cache_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("ch", "fdk", "fdk")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| dirs::cache_dir().map(|d| d.join("fdk")))
        .context("Could not determine cache directory")
}

impl FdkConfig {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join("config.yaml");
        Self::load_with_env(Some(&path))
    }

    /// Load from an explicit file (if given), then apply environment overrides
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file; a missing file yields the defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Apply `FDK_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FDK_API_URL") {
            self.source.base_url = url;
        }
        if let Some(dir) = lookup("FDK_CACHE_DIR") {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(timeout) = lookup("FDK_TIMEOUT") {
            let secs: f64 = timeout
                .parse()
                .with_context(|| format!("FDK_TIMEOUT must be a number, got '{timeout}'"))?;
            self.source.timeout_seconds = secs.ceil().max(1.0) as u64;
        }
        if let Some(hours) = lookup("FDK_CACHE_MAX_AGE_HOURS") {
            self.cache.max_age_hours = hours.parse().with_context(|| {
                format!("FDK_CACHE_MAX_AGE_HOURS must be an integer, got '{hours}'")
            })?;
        }
        if let Some(max) = lookup("FDK_MAX_CONCURRENT") {
            self.download.max_concurrency = max
                .parse()
                .with_context(|| format!("FDK_MAX_CONCURRENT must be an integer, got '{max}'"))?;
        }
        if let Some(retries) = lookup("FDK_MAX_RETRIES") {
            self.retry.max_attempts = retries
                .parse()
                .with_context(|| format!("FDK_MAX_RETRIES must be an integer, got '{retries}'"))?;
        }
        if let Some(delay) = lookup("FDK_RETRY_DELAY") {
            let secs: f64 = delay
                .parse()
                .with_context(|| format!("FDK_RETRY_DELAY must be a number, got '{delay}'"))?;
            self.retry.base_delay_ms = (secs * 1000.0).round().max(0.0) as u64;
        }
        if let Some(lang) = lookup("FDK_LANGUAGE") {
            self.source.language = lang.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.source.base_url.starts_with("http://") && !self.source.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "source.baseUrl must start with http:// or https://, got '{}'",
                self.source.base_url
            );
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.download.max_concurrency) {
            anyhow::bail!(
                "download.maxConcurrency must be between {} and {}, got {}",
                MIN_CONCURRENCY,
                MAX_CONCURRENCY,
                self.download.max_concurrency
            );
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.maxAttempts must be at least 1");
        }
        if self.search.max_limit == 0 {
            anyhow::bail!("search.maxLimit must be at least 1");
        }
        Ok(())
    }
}
