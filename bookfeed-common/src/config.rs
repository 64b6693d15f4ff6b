//! Engine settings loading and resolution
//!
//! Settings live in a single TOML file. Every section has compiled defaults,
//! so a missing file (or a missing section) never prevents startup.
//!
//! Settings path priority:
//! 1. Explicit argument (highest priority)
//! 2. Environment variable (`BOOKFEED_CONFIG`)
//! 3. Per-user config dir (`~/.config/bookfeed/bookfeed.toml` on Linux)
//! 4. None - compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming the settings file
pub const SETTINGS_ENV_VAR: &str = "BOOKFEED_CONFIG";

/// Environment variables consulted for the generative provider key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["BOOKFEED_LLM_API_KEY", "ANTHROPIC_API_KEY"];

/// Top-level engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub logging: LoggingConfig,
    pub completion: CompletionConfig,
    pub validation: ValidationConfig,
    pub pipeline: PipelineConfig,
    pub layers: LayerPaths,
    pub schema: SchemaConfig,
}

/// Event-log verbosity for the durable session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Warnings and above, plus major decisions
    Minimal,
    /// Adds informational mapping and validation events
    #[default]
    Normal,
    /// Everything, including routing fall-throughs and raw completions
    Detailed,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Minimal => "minimal",
            Verbosity::Normal => "normal",
            Verbosity::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

impl FromStr for Verbosity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Verbosity::Minimal),
            "normal" => Ok(Verbosity::Normal),
            "detailed" => Ok(Verbosity::Detailed),
            other => Err(Error::InvalidInput(format!("Unknown verbosity: {}", other))),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Event-log verbosity for the session log
    pub verbosity: Verbosity,
    /// Session log destination (JSON lines); None disables persistence
    pub session_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbosity: Verbosity::Normal,
            session_log: None,
        }
    }
}

/// `[completion]` section - generative provider and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Disable to skip generative completion entirely
    pub enabled: bool,
    pub model: String,
    pub api_key: Option<String>,
    /// Messages endpoint override (proxies, test servers)
    pub endpoint: Option<String>,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub requests_per_minute: u32,
    pub max_tokens: u32,
    /// Maximum characters of book text included as prompt context
    pub context_char_budget: usize,
    /// Concurrent generative calls within one record
    pub max_concurrent_completions: usize,
    /// Leading calls that must all be unreachable before a run aborts
    pub unreachable_abort_threshold: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: None,
            endpoint: None,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            request_timeout_secs: 60,
            requests_per_minute: 50,
            max_tokens: 1024,
            context_char_budget: 40_000,
            max_concurrent_completions: 4,
            unreachable_abort_threshold: 5,
        }
    }
}

/// `[validation]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Apply validator suggestions (at most once per field per run)
    pub auto_correct: bool,
    /// Minimum similarity (0.0-1.0) for a vocabulary suggestion
    pub suggestion_threshold: f64,
    /// Territorial price must be at least this multiple of base × rate
    pub price_ratio_min: f64,
    /// Territorial price must be at most this multiple of base × rate
    pub price_ratio_max: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            auto_correct: false,
            suggestion_threshold: 0.6,
            price_ratio_min: 0.5,
            price_ratio_max: 2.0,
        }
    }
}

/// `[pipeline]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records processed concurrently within a batch
    pub max_parallel_records: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_records: 4,
        }
    }
}

/// `[layers]` section - configuration layer documents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPaths {
    pub global: Option<PathBuf>,
    pub publisher: Option<PathBuf>,
    pub imprint: Option<PathBuf>,
}

/// `[schema]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Distributor field schema; None uses the built-in catalog schema
    pub path: Option<PathBuf>,
}

/// Load engine settings from a TOML file
///
/// Unlike [`load_settings_or_default`], a missing or malformed file is an error.
pub fn load_settings(path: &Path) -> Result<EngineSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let settings: EngineSettings = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    settings.validate()?;
    Ok(settings)
}

/// Load engine settings, degrading to compiled defaults when no file exists
///
/// A file that exists but cannot be parsed is still an error: silently
/// ignoring a broken settings file would change every mapping decision.
pub fn load_settings_or_default(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) if path.exists() => {
            let settings = load_settings(path)?;
            info!("Engine settings loaded from {}", path.display());
            Ok(settings)
        }
        Some(path) => {
            warn!(
                "Settings file {} not found, using compiled defaults",
                path.display()
            );
            Ok(EngineSettings::default())
        }
        None => {
            info!("No settings file configured, using compiled defaults");
            Ok(EngineSettings::default())
        }
    }
}

/// Resolve the settings file path
pub fn resolve_settings_path(cli_arg: Option<&str>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: explicit argument
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config dir
    default_settings_path().filter(|p| p.exists())
}

/// Platform default settings location
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bookfeed").join("bookfeed.toml"))
}

/// Where a resolved API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Explicit,
    Environment,
    Toml,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeySource::Explicit => "explicit argument",
            KeySource::Environment => "environment",
            KeySource::Toml => "TOML",
        };
        f.write_str(name)
    }
}

/// Resolve the generative provider API key
///
/// **Priority:** explicit → environment → TOML
///
/// Returns `None` when no source holds a usable key; the engine then runs
/// without a generative provider.
pub fn resolve_api_key(
    explicit: Option<&str>,
    settings: &CompletionConfig,
) -> Option<(String, KeySource)> {
    let env_key = API_KEY_ENV_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|k| is_valid_key(k)));
    let explicit_key = explicit.filter(|k| is_valid_key(k)).map(str::to_string);
    let toml_key = settings.api_key.clone().filter(|k| is_valid_key(k));

    let mut sources = Vec::new();
    if explicit_key.is_some() {
        sources.push(KeySource::Explicit.to_string());
    }
    if env_key.is_some() {
        sources.push(KeySource::Environment.to_string());
    }
    if toml_key.is_some() {
        sources.push(KeySource::Toml.to_string());
    }

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "LLM API key found in multiple sources: {}. Using highest priority.",
            sources.join(", ")
        );
    }

    if let Some(key) = explicit_key {
        info!("LLM API key taken from explicit argument");
        return Some((key, KeySource::Explicit));
    }
    if let Some(key) = env_key {
        info!("LLM API key loaded from environment variable");
        return Some((key, KeySource::Environment));
    }
    if let Some(key) = toml_key {
        info!("LLM API key loaded from TOML config");
        return Some((key, KeySource::Toml));
    }
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

impl EngineSettings {
    /// Reject settings that cannot drive a run
    pub fn validate(&self) -> Result<()> {
        if self.completion.max_attempts == 0 {
            return Err(Error::Config(
                "completion.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.completion.requests_per_minute == 0 {
            return Err(Error::Config(
                "completion.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.validation.price_ratio_min > self.validation.price_ratio_max {
            return Err(Error::Config(format!(
                "validation.price_ratio_min ({}) exceeds price_ratio_max ({})",
                self.validation.price_ratio_min, self.validation.price_ratio_max
            )));
        }
        if !(0.0..=1.0).contains(&self.validation.suggestion_threshold) {
            return Err(Error::Config(
                "validation.suggestion_threshold must be within 0.0-1.0".to_string(),
            ));
        }
        Ok(())
    }
}
