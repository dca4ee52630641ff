//! Configuration loading and management.
//!
//! Loads settings from `~/.psychguide/config.toml` (or `$PSYCHGUIDE_CONFIG`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.
//!
//! The API key is not part of this file format. It is read
//! through a [`crate::secrets::SecretStore`] by [`resolver::ConfigResolver`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub mod resolver;

/// Default completion model.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
/// Default response length cap.
pub const DEFAULT_MAX_TOKENS: u32 = 280;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Secret name the API key is stored under.
pub const DEFAULT_SECRET_NAME: &str = "claude_api_key";
/// Default provider endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

// ── Top-level config ────────────────────────────────────────────

/// Top-level application configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Completion provider and model parameters (`[provider]`).
    pub provider: ProviderSettings,
    /// Timeout and retry policy for the outbound call (`[retry]`).
    pub retry: RetrySettings,
    /// Logging settings (`[logging]`).
    pub logging: LoggingSettings,
    /// Filesystem locations (`[paths]`).
    pub paths: PathsSettings,
}

impl AppConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// `explicit_path` wins over `$PSYCHGUIDE_CONFIG`, which wins over
    /// `~/.psychguide/config.toml`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if no home directory can be determined for the default path.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path_with(env)?,
        };
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using a custom env resolver.
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env("PSYCHGUIDE_CONFIG") {
            return Ok(PathBuf::from(p));
        }
        Ok(config_dir()?.join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the real environment.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("PSYCHGUIDE_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = env("PSYCHGUIDE_BASE_URL") {
            self.provider.base_url = v;
        }
        override_parsed(&env, "PSYCHGUIDE_MAX_TOKENS", &mut self.provider.max_tokens);
        override_parsed(&env, "PSYCHGUIDE_TEMPERATURE", &mut self.provider.temperature);
        override_parsed(&env, "PSYCHGUIDE_TIMEOUT_SECS", &mut self.retry.timeout_secs);
        override_parsed(&env, "PSYCHGUIDE_MAX_RETRIES", &mut self.retry.max_retries);
        if let Some(v) = env("PSYCHGUIDE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a field has the wrong type.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Secrets file location: configured path or `~/.psychguide/.env`.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn secrets_file(&self) -> Result<PathBuf> {
        match &self.paths.secrets_file {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(".env")),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) {
    if let Some(v) = env(var) {
        match v.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

/// Resolve the default config directory (`~/.psychguide/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".psychguide"))
}

// ── Provider settings ───────────────────────────────────────────

/// Completion provider settings (`[provider]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider endpoint base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens to generate. Must be positive.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
    /// Name of the API key in the secret store.
    pub secret_name: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            secret_name: DEFAULT_SECRET_NAME.to_owned(),
        }
    }
}

// ── Retry settings ──────────────────────────────────────────────

/// Timeout and retry policy for the outbound call (`[retry]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied per retry. Must be greater than 1.
    pub factor: f64,
    /// Random extra delay as a fraction of the computed delay.
    pub jitter_ratio: f64,
    /// Upper bound on a single backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            base_delay_ms: 500,
            factor: 2.0,
            jitter_ratio: 0.25,
            max_delay_ms: 10_000,
        }
    }
}

impl RetrySettings {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// First backoff delay.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff ceiling.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

// ── Logging / paths ─────────────────────────────────────────────

/// Logging settings (`[logging]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// Filesystem locations (`[paths]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsSettings {
    /// `.env` file holding the API key. Defaults to `~/.psychguide/.env`.
    pub secrets_file: Option<PathBuf>,
}

// ── Tests ───────────────────────────────────────────────────────
