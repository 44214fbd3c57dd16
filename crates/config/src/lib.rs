//! Configuration loading, validation, and management for hearth.
//!
//! Loads configuration from `~/.hearth/config.toml` (overridable with
//! `HEARTH_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.hearth/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hub connection settings
    #[serde(default)]
    pub hub: HubConfig,

    /// IANA timezone for cron evaluation (e.g. "America/Los_Angeles")
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Notebook directory (automations/, cues/, memory.md)
    #[serde(default = "default_notebook_dir")]
    pub notebook_dir: PathBuf,

    /// Path of the embedded database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Default LLM driver
    #[serde(default = "default_driver")]
    pub default_driver: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Runtime knobs
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Gateway (serve-mode status endpoint) settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-driver provider configurations. Multiple OpenAI-compatible
    /// endpoints are permitted, keyed by driver name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Model used by the LLM-as-judge grader
    #[serde(default = "default_judge_model")]
    pub judge_model: String,
}

fn default_timezone() -> String {
    "UTC".into()
}
fn default_notebook_dir() -> PathBuf {
    PathBuf::from("notebook")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("hearth.db")
}
fn default_driver() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_judge_model() -> String {
    "claude-sonnet-4-20250514".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("hub", &self.hub)
            .field("timezone", &self.timezone)
            .field("notebook_dir", &self.notebook_dir)
            .field("db_path", &self.db_path)
            .field("default_driver", &self.default_driver)
            .field("default_model", &self.default_model)
            .field("runtime", &self.runtime)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .field("judge_model", &self.judge_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_hub_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_hub_url() -> String {
    "http://localhost:8123".into()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            url: default_hub_url(),
            token: None,
        }
    }
}

impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum tool-loop iterations per job
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Bound on each tool call, seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Bound on each model call, seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Worker pool size; 0 = CPU count (min 2)
    #[serde(default)]
    pub workers: usize,

    /// Per-automation pending event depth; further events coalesce to latest
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Grace period for in-flight jobs at shutdown, seconds
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// In test mode `call-service` validates and never contacts the hub
    #[serde(default)]
    pub test_mode: bool,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_tool_timeout_secs() -> u64 {
    60
}
fn default_provider_timeout_secs() -> u64 {
    300
}
fn default_queue_depth() -> usize {
    16
}
fn default_shutdown_grace_secs() -> u64 {
    5
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            workers: 0,
            queue_depth: default_queue_depth(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            test_mode: false,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl RuntimeConfig {
    /// Effective worker pool size.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .max(2)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7391
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.hearth/config.toml),
    /// honoring the `HEARTH_CONFIG` path override.
    ///
    /// Environment variable overrides applied after file load:
    /// - `ANTHROPIC_API_KEY` → providers.anthropic.api_key
    /// - `OLLAMA_HOST` → providers.ollama.api_url
    /// - `OPENAI_<NAME>_KEY` → providers.<name>.api_key (lowercased)
    /// - `HEARTH_HUB_TOKEN` → hub.token
    /// - `PORT` → gateway.port
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = match std::env::var("HEARTH_CONFIG") {
            Ok(p) => PathBuf::from(p),
            Err(_) => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.providers.entry("anthropic".into()).or_default().api_key = Some(key);
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.providers.entry("ollama".into()).or_default().api_url = Some(host);
        }
        for (name, value) in std::env::vars() {
            if let Some(rest) = name.strip_prefix("OPENAI_") {
                if let Some(endpoint) = rest.strip_suffix("_KEY") {
                    self.providers
                        .entry(endpoint.to_lowercase())
                        .or_default()
                        .api_key = Some(value);
                }
            }
        }
        if let Ok(token) = std::env::var("HEARTH_HUB_TOKEN") {
            self.hub.token = Some(token);
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hearth")
    }

    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::ValidationError(format!("unknown timezone: {}", self.timezone)))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;

        if self.runtime.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.runtime.temperature) {
            return Err(ConfigError::ValidationError(
                "runtime.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            timezone: default_timezone(),
            notebook_dir: default_notebook_dir(),
            db_path: default_db_path(),
            default_driver: default_driver(),
            default_model: default_model(),
            runtime: RuntimeConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
            judge_model: default_judge_model(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
