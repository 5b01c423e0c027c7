//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Error;
use crate::response::ResponseFormat;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory path
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Model in `provider/model` form; no prefix means OpenAI
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Structured-output encoding requested from the model
    #[serde(default)]
    pub response_format: ResponseFormat,

    /// Maximum ReAct iterations per request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Messages of history rendered into each prompt
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Event log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSONL file receiving every trace event
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Per-string cap applied to event metadata (0 disables)
    #[serde(default = "default_max_detail")]
    pub max_detail: usize,
}

fn default_workspace() -> PathBuf {
    config_dir().join("workspace")
}

fn default_model_id() -> String {
    "lms/qwen/qwen3-vl-30b".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    32000
}

fn default_max_iterations() -> usize {
    8
}

fn default_history_limit() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> PathBuf {
    config_dir().join("observability.jsonl")
}

fn default_max_detail() -> usize {
    2000
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: default_log_path(),
            max_detail: default_max_detail(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model_id: default_model_id(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            response_format: ResponseFormat::default(),
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Apply environment overrides read through `env`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(model_id) = env("MODEL_ID").filter(|v| !v.trim().is_empty()) {
            self.model_id = model_id.trim().to_string();
        }
        if let Some(format) = env("RESPONSE_FORMAT") {
            match format.parse() {
                Ok(format) => self.response_format = format,
                Err(e) => warn!("Ignoring RESPONSE_FORMAT: {}", e),
            }
        }
        if let Some(n) = parse_env(&env, "MAX_ITERATIONS") {
            self.max_iterations = n;
        }
        if let Some(enabled) = env("OBSERVABILITY_ENABLED") {
            match parse_bool(&enabled) {
                Some(flag) => self.observability.enabled = flag,
                None => warn!("Ignoring OBSERVABILITY_ENABLED={:?}", enabled),
            }
        }
        if let Some(path) = env("OBSERVABILITY_LOG_PATH").filter(|v| !v.trim().is_empty()) {
            self.observability.log_path = PathBuf::from(path.trim());
        }
        if let Some(n) = parse_env(&env, "OBSERVABILITY_MAX_DETAIL") {
            self.observability.max_detail = n;
        }
    }
}

fn parse_env(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<usize> {
    let raw = env(name)?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", name, raw);
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".localagents")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration: the config file if present, else defaults, then
/// process environment overrides.
pub fn load() -> Result<Config> {
    let mut config = load_from(&config_path())?;
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Load a config file without environment overrides.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config at {:?}: {}", path, e)))
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write the default config (unless one exists) and bootstrap the workspace.
pub fn init() -> Result<Config> {
    let path = config_path();
    let config = load_from(&path)?;
    if !path.exists() {
        save_to(&config, &path)?;
    }
    std::fs::create_dir_all(&config.workspace)?;
    crate::templates::bootstrap_workspace(&config.workspace)?;
    Ok(config)
}
