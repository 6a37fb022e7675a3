use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::language_utils::{MetaLanguage, validate_language_code};
use crate::models::{PlatformId, ProcessingOptions};
use crate::models::platform::ALL_PLATFORMS;
use crate::pipeline::batcher::{BatchConfig, DEFAULT_INTER_BATCH_DELAY, DEFAULT_MAX_CONCURRENCY};
use crate::pipeline::gate::ConfirmMode;
use crate::pipeline::orchestrator::{DEFAULT_STICKER_COUNT, PipelineConfig};
use crate::providers::gemini::GeminiSettings;

/// Environment variable consulted when the config carries no API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Upper bound for `generation.retry_count`
pub const MAX_RETRY_COUNT: u32 = 10;

/// Application configuration
///
/// Loaded from `conf.json`. Every field has a default so a partial file is
/// valid; a missing file is replaced by the defaults on first run.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Generation service settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Sticker fan-out pacing
    #[serde(default)]
    pub batch: BatchSettings,

    /// Post-processing options
    #[serde(default)]
    pub processing: ProcessingOptions,

    /// Metadata locale codes; empty means the market's own locale
    #[serde(default)]
    pub metadata_languages: Vec<String>,

    /// Export targets
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformId>,

    /// How checkpoints are resolved
    #[serde(default)]
    pub confirm_mode: ConfirmMode,

    /// Root directory for exports and session summaries
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Generation service kind
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    /// Deterministic offline generator
    Mock,
}

impl ProviderKind {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini => "Gemini",
            Self::Mock => "Mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// API key; falls back to the `GEMINI_API_KEY` environment variable
    #[serde(default = "String::new")]
    pub api_key: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model used for analysis, ideation and specification extraction
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Model used for image synthesis
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Model used for metadata writing
    #[serde(default = "default_flash_model")]
    pub flash_model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry count for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Number of sticker ideas requested per run
    #[serde(default = "default_sticker_count")]
    pub sticker_count: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            flash_model: default_flash_model(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            sticker_count: default_sticker_count(),
        }
    }
}

impl GenerationConfig {
    /// The configured key, or the environment one
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.trim().is_empty() {
            return self.api_key.clone();
        }
        std::env::var(API_KEY_ENV).unwrap_or_default()
    }

    pub fn gemini_settings(&self) -> GeminiSettings {
        GeminiSettings {
            api_key: self.resolved_api_key(),
            endpoint: self.endpoint.clone(),
            text_model: self.text_model.clone(),
            image_model: self.image_model.clone(),
            flash_model: self.flash_model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.retry_count,
            backoff_base_ms: self.retry_backoff_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchSettings {
    /// Stickers generated at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pause between groups in milliseconds
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_platforms() -> Vec<PlatformId> {
    ALL_PLATFORMS.to_vec()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_text_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_flash_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_sticker_count() -> usize {
    DEFAULT_STICKER_COUNT
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_inter_batch_delay_ms() -> u64 {
    DEFAULT_INTER_BATCH_DELAY.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Config {
            generation: GenerationConfig::default(),
            batch: BatchSettings::default(),
            processing: ProcessingOptions::default(),
            metadata_languages: Vec::new(),
            platforms: default_platforms(),
            confirm_mode: ConfirmMode::default(),
            output_dir: default_output_dir(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Read a config file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .context(format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", path.display()))
    }

    /// Read a config file, writing the defaults there first if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        log::warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.write(path)?;
        Ok(config)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .context(format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.batch.max_concurrency == 0 {
            return Err(anyhow!("batch.max_concurrency must be at least 1"));
        }
        if self.generation.retry_count > MAX_RETRY_COUNT {
            return Err(anyhow!(
                "generation.retry_count must be at most {}, got {}",
                MAX_RETRY_COUNT,
                self.generation.retry_count
            ));
        }
        if self.generation.sticker_count == 0 {
            return Err(anyhow!("generation.sticker_count must be at least 1"));
        }
        if self.processing.outline_opacity > 100 {
            return Err(anyhow!(
                "processing.outline_opacity must be between 0 and 100, got {}",
                self.processing.outline_opacity
            ));
        }
        if self.processing.outline_thickness == 0 || self.processing.outline_thickness > 20 {
            return Err(anyhow!(
                "processing.outline_thickness must be between 1 and 20, got {}",
                self.processing.outline_thickness
            ));
        }
        if self.platforms.is_empty() {
            return Err(anyhow!("At least one export platform is required"));
        }
        self.metadata_languages()?;

        if self.generation.provider == ProviderKind::Gemini
            && self.generation.resolved_api_key().trim().is_empty()
        {
            return Err(anyhow!(
                "An API key is required for the Gemini provider (set generation.api_key or {})",
                API_KEY_ENV
            ));
        }
        Ok(())
    }

    /// Parsed metadata locales, in configured order
    pub fn metadata_languages(&self) -> Result<Vec<MetaLanguage>> {
        self.metadata_languages
            .iter()
            .map(|code| validate_language_code(code))
            .collect()
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::new(
            self.batch.max_concurrency,
            Duration::from_millis(self.batch.inter_batch_delay_ms),
        )
    }

    /// Pipeline settings derived from this configuration
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig::new()
            .with_batch(self.batch_config())
            .with_confirm_mode(self.confirm_mode)
            .with_processing(self.processing.clone())
            .with_metadata_languages(self.metadata_languages()?)
            .with_platforms(self.platforms.clone())
            .with_sticker_count(self.generation.sticker_count))
    }
}
