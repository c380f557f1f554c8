//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Provider API keys are loaded from GOOGLE_AI_API_KEY / OPENROUTER_API_KEY
//! env vars or *_key_file paths, never stored in the TOML directly to avoid
//! leaking secrets. A missing key leaves the corresponding provider
//! unconfigured rather than failing startup.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Provider and pipeline settings
#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-provider HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Hard ceiling for one background analysis task
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// How long the primary stays flagged after quota exhaustion
    #[serde(default = "default_quota_cooldown")]
    pub quota_cooldown_secs: u64,
    #[serde(skip)]
    pub google_ai_key: Option<Secret<String>>,
    #[serde(skip)]
    pub openrouter_key: Option<Secret<String>>,
    /// Path to a file containing the Gemini key (alternative to GOOGLE_AI_API_KEY)
    #[serde(default)]
    pub google_ai_key_file: Option<PathBuf>,
    /// Path to a file containing the OpenRouter key (alternative to OPENROUTER_API_KEY)
    #[serde(default)]
    pub openrouter_key_file: Option<PathBuf>,
}

/// Credit accounting settings
#[derive(Debug, Deserialize)]
pub struct CreditsConfig {
    #[serde(default = "default_initial_balance")]
    pub initial_balance: u32,
    #[serde(default = "default_cost_per_analysis")]
    pub cost_per_analysis: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            task_timeout_secs: default_task_timeout(),
            quota_cooldown_secs: default_quota_cooldown(),
            google_ai_key: None,
            openrouter_key: None,
            google_ai_key_file: None,
            openrouter_key_file: None,
        }
    }
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            cost_per_analysis: default_cost_per_analysis(),
        }
    }
}

fn default_max_connections() -> usize {
    100
}

fn default_primary_model() -> String {
    gemini::DEFAULT_MODEL.to_string()
}

fn default_fallback_model() -> String {
    openrouter::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_request_timeout() -> u64 {
    300
}

fn default_task_timeout() -> u64 {
    600
}

fn default_quota_cooldown() -> u64 {
    3600
}

fn default_initial_balance() -> u32 {
    5
}

fn default_cost_per_analysis() -> u32 {
    1
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Key resolution order (for each provider):
    /// 1. env var (GOOGLE_AI_API_KEY / OPENROUTER_API_KEY)
    /// 2. *_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.analysis.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.analysis.task_timeout_secs < config.analysis.request_timeout_secs {
            return Err(common::Error::Config(format!(
                "task_timeout_secs ({}) must be at least request_timeout_secs ({})",
                config.analysis.task_timeout_secs, config.analysis.request_timeout_secs
            )));
        }
        if !(0.0..=2.0).contains(&config.analysis.temperature) {
            return Err(common::Error::Config(format!(
                "temperature must be between 0.0 and 2.0, got: {}",
                config.analysis.temperature
            )));
        }
        if config.credits.cost_per_analysis == 0 {
            return Err(common::Error::Config(
                "cost_per_analysis must be greater than 0".into(),
            ));
        }

        config.analysis.google_ai_key = resolve_key(
            "GOOGLE_AI_API_KEY",
            config.analysis.google_ai_key_file.as_deref(),
        )?;
        config.analysis.openrouter_key = resolve_key(
            "OPENROUTER_API_KEY",
            config.analysis.openrouter_key_file.as_deref(),
        )?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("analysis-api.toml")
    }
}

/// Resolve one API key: env var takes precedence over key file. An empty or
/// whitespace-only value counts as absent.
fn resolve_key(env_var: &str, key_file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Some(key) = Secret::from_env(env_var) {
        return Ok(Some(key));
    }
    if let Some(key_file) = key_file {
        let key = std::fs::read_to_string(key_file).map_err(|e| {
            common::Error::Config(format!(
                "failed to read key file {}: {e}",
                key_file.display()
            ))
        })?;
        let key = key.trim().to_owned();
        if !key.is_empty() {
            return Ok(Some(Secret::new(key)));
        }
    }
    Ok(None)
}
