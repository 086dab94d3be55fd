/*
 * Configuration management for the dashboard client
 */

use crate::models::{ArbviewError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8888/api/v1";
pub const MIN_TIMEOUT_SECS: u64 = 5;
pub const MAX_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub view: ViewConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: MAX_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
    pub page_size: usize,
    pub settings_path: PathBuf,
    /// System appearance used while the theme is `auto`.
    pub prefers_dark: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::new(DEFAULT_BACKEND_URL),
            view: ViewConfig {
                page_size: crate::table::DEFAULT_PAGE_SIZE,
                settings_path: PathBuf::from(".arbview/settings.json"),
                prefers_dark: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("ARBVIEW_BACKEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend.base_url);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ArbviewError::ConfigError(format!(
                "ARBVIEW_BACKEND_URL must be an http(s) URL, got {base_url}"
            )));
        }

        let timeout_secs = match lookup("ARBVIEW_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| ArbviewError::ConfigError(format!("Invalid timeout: {e}")))?
                .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
            None => defaults.backend.timeout_secs,
        };

        let page_size = match lookup("ARBVIEW_PAGE_SIZE") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) => return Err(ArbviewError::ConfigError("Page size must be positive".to_string())),
                Ok(size) => size,
                Err(e) => return Err(ArbviewError::ConfigError(format!("Invalid page size: {e}"))),
            },
            None => defaults.view.page_size,
        };

        Ok(Config {
            backend: BackendConfig { base_url, timeout_secs },
            view: ViewConfig {
                page_size,
                settings_path: lookup("ARBVIEW_SETTINGS_PATH")
                    .map_or(defaults.view.settings_path, PathBuf::from),
                prefers_dark: lookup("ARBVIEW_PREFERS_DARK")
                    .is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "dark")),
            },
            logging: LoggingConfig {
                level: lookup("LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: lookup("LOG_FORMAT")
                    .unwrap_or_else(|| "pretty".to_string())
                    .parse()
                    .unwrap_or(LogFormat::Pretty),
            },
        })
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ArbviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" | "plain" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ArbviewError::ConfigError(format!("Unknown log format: {s}"))),
        }
    }
}
