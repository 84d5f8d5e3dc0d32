//! Runtime configuration.
//!
//! Resolved in layers, later ones winning:
//!   1. built-in defaults
//!   2. `config.json` in the platform config directory
//!      (Linux: ~/.config/snapstream/, macOS: ~/Library/Application Support/snapstream/)
//!   3. a `.env` file in the working directory
//!   4. process environment
//!
//! The analysis API key is never stored in `config.json`.

use crate::capture::StreamConstraints;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "snapstream";
const CONFIG_FILE: &str = "config.json";

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const KEYRING_SERVICE: &str = "snapstream";
const KEYRING_USER: &str = "analysis-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapConfig {
    /// Sampling period in timer mode.
    pub timer_period_ms: u64,
    pub show_cursor: bool,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            timer_period_ms: 2000,
            show_cursor: true,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl SnapConfig {
    /// Load every layer. A missing config file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            log::debug!("[CONFIG] No config file at {}", path.display());
            Self::default()
        };

        match dotenvy::dotenv() {
            Ok(env_path) => log::debug!("[CONFIG] Loaded {}", env_path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("[CONFIG] Ignoring unreadable .env: {}", e),
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        log::info!(
            "[CONFIG] timer={}ms cursor={} model={}",
            config.timer_period_ms,
            config.show_cursor,
            config.analysis.model
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SNAPSTREAM_*` overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("SNAPSTREAM_TIMER_PERIOD_MS") {
            self.timer_period_ms = parse_value("SNAPSTREAM_TIMER_PERIOD_MS", &v)?;
        }
        if let Some(v) = lookup("SNAPSTREAM_SHOW_CURSOR") {
            self.show_cursor = parse_bool("SNAPSTREAM_SHOW_CURSOR", &v)?;
        }
        if let Some(v) = lookup("SNAPSTREAM_ANALYSIS_ENDPOINT") {
            self.analysis.endpoint = v;
        }
        if let Some(v) = lookup("SNAPSTREAM_ANALYSIS_MODEL") {
            self.analysis.model = v;
        }
        if let Some(v) = lookup("SNAPSTREAM_ANALYSIS_TIMEOUT_SECS") {
            self.analysis.timeout_secs = parse_value("SNAPSTREAM_ANALYSIS_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer_period_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timerPeriodMs",
                value: "0".to_string(),
            });
        }
        if self.analysis.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "analysis.timeoutSecs",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_millis(self.timer_period_ms)
    }

    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            show_cursor: self.show_cursor,
            audio: false,
        }
    }
}

/// Platform config directory for SnapStream.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Analysis API key: environment first, then the OS keyring.
pub fn resolve_api_key() -> Option<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Some(key);
        }
        log::warn!("[CONFIG] {} is set but EMPTY", API_KEY_ENV);
    }

    let entry = match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
        Ok(entry) => entry,
        Err(e) => {
            log::debug!("[CONFIG] Keyring unavailable: {}", e);
            return None;
        }
    };
    match entry.get_password() {
        Ok(key) if !key.trim().is_empty() => Some(key),
        Ok(_) => None,
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("[CONFIG] Keyring lookup failed: {}", e);
            None
        }
    }
}

/// Store the analysis API key in the OS keyring.
pub fn store_api_key(key: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .and_then(|entry| entry.set_password(key))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Keyring error: {0}")]
    Keyring(String),
}
