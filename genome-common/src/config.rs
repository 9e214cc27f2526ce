//! Configuration management for the Agent Genome Watcher.
//!
//! The watcher reads a single file at `~/.genome-watcher/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `UPSTAGE_API_KEY` → classifier.api_key
//! - `GENOME_MOCK_MODE` / `MOCK_MODE` → mock_mode
//! - `GENOME_CLASSIFIER_MODE` → classifier.mode (`model` | `rules`)
//! - `GENOME_DB_PATH` → storage.db_path
//! - `GENOME_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".genome-watcher"),
        |dirs| dirs.home_dir().join(".genome-watcher"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Classifier Configuration
// ============================================================================

/// Which classification strategy the orchestrator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// Delegate to the external text-classification service
    #[default]
    Model,
    /// Deterministic keyword rules only
    Rules,
}

impl std::str::FromStr for ClassifierMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" | "api" | "llm" => Ok(Self::Model),
            "rules" | "rule" | "simple" => Ok(Self::Rules),
            other => Err(format!("unknown classifier mode: {other}")),
        }
    }
}

/// Which completion backend the model-backed classifier talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI-compatible chat completions over HTTP
    #[default]
    Http,
    /// Canned offline responses
    Mock,
}

/// Classification backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub mode: ClassifierMode,

    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the chat-completions API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key (usually supplied through `UPSTAGE_API_KEY`)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Hard timeout for one backend call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_endpoint() -> String {
    "https://api.upstage.ai/v1".to_string()
}
fn default_model() -> String {
    "solar-pro3".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::default(),
            backend: BackendKind::default(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

// ============================================================================
// Storage / Worker / Events Configuration
// ============================================================================

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    config_dir().join("genome_watcher.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Background analysis worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sleep between polls when no unanalyzed posts are found
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay between consecutive classifications (upstream rate limits)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Posts scanned per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_pacing_ms() -> u64 {
    1500
}
fn default_batch_size() -> usize {
    50
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            pacing_ms: default_pacing_ms(),
            batch_size: default_batch_size(),
        }
    }
}

/// Event detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Identity shifts within one clock hour that make a cascade
    #[serde(default = "default_cascade_threshold")]
    pub cascade_threshold: usize,

    /// How many recent events the cascade scan looks at
    #[serde(default = "default_cascade_window")]
    pub cascade_window: usize,
}

fn default_cascade_threshold() -> usize {
    5
}
fn default_cascade_window() -> usize {
    200
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            cascade_threshold: default_cascade_threshold(),
            cascade_window: default_cascade_window(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets held at `warn`
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Offline mode: forces rule-based classification
    #[serde(default)]
    pub mock_mode: bool,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("UPSTAGE_API_KEY") {
            if !key.is_empty() {
                self.classifier.api_key = Some(key);
            }
        }

        if let Ok(flag) = std::env::var("GENOME_MOCK_MODE").or_else(|_| std::env::var("MOCK_MODE")) {
            self.mock_mode = parse_bool(&flag);
        }

        if let Ok(mode) = std::env::var("GENOME_CLASSIFIER_MODE") {
            match mode.parse() {
                Ok(mode) => self.classifier.mode = mode,
                Err(e) => tracing::warn!(error = %e, "Ignoring GENOME_CLASSIFIER_MODE"),
            }
        }

        if let Ok(path) = std::env::var("GENOME_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("GENOME_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    /// Strategy the orchestrator should actually run with.
    ///
    /// Mock mode always wins over the configured mode.
    pub fn effective_mode(&self) -> ClassifierMode {
        if self.mock_mode {
            ClassifierMode::Rules
        } else {
            self.classifier.mode
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let path = config_path();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
