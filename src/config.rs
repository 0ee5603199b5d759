use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::{
    Result,
    eyre::{Context, bail, eyre},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::provider_rs::client::DEFAULT_API_BASE_URL;
use crate::sync::EngineSettings;
use crate::sync::applier::MAX_BATCH_SIZE;
use crate::sync::matcher::DEFAULT_FUZZY_THRESHOLD;
use crate::sync::rate_limit::ProviderRateLimiter;
use crate::sync::reader::DEFAULT_PAGE_SIZE;
use crate::sync::remote::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/playlist-sync/playlist-sync.db".to_string(),
        }
    }
}

/// Connection and pacing settings for the remote provider. Durations use
/// humantime syntax (`250ms`, `10s`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub api_base_url: String,
    pub requests_per_second: u32,
    pub burst: u32,
    pub max_batch_size: usize,
    pub max_attempts: u32,
    pub base_backoff: String,
    pub max_backoff: String,
    pub page_size: u32,
    pub request_timeout: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "spotify".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            requests_per_second: 10,
            burst: 10,
            max_batch_size: MAX_BATCH_SIZE,
            max_attempts: 3,
            base_backoff: "250ms".to_string(),
            max_backoff: "10s".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub pass_deadline: String,
    pub fuzzy_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pass_deadline: "60s".to_string(),
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint; spans are only exported when set.
    pub otlp_endpoint: Option<String>,
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            filter: "info".to_string(),
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .wrap_err_with(|| format!("Invalid duration for {}: {:?}", field, value))
}

fn non_zero(field: &str, value: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(value).ok_or_else(|| eyre!("{} must be greater than zero", field))
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        config.engine_settings()?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("playlist-sync").join("config.toml"))
    }

    /// Load the default config file, falling back to built-in defaults when
    /// it has not been created yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory on this platform"))?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::from_file(&config_path)
    }

    /// Write the default config, unless a file already exists.
    pub fn create_default() -> Result<PathBuf> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory on this platform"))?;
        Self::default().write_new(&config_path)?;
        Ok(config_path)
    }

    fn write_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            tracing::info!(path = %path.display(), "Config file already exists");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).wrap_err("Failed to serialize default config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.database.path)
    }

    pub fn api_base_url(&self) -> Result<Url> {
        Url::parse(&self.provider.api_base_url)
            .wrap_err_with(|| format!("Invalid provider api_base_url: {}", self.provider.api_base_url))
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration("provider.request_timeout", &self.provider.request_timeout)
    }

    pub fn rate_limiter(&self) -> Result<ProviderRateLimiter> {
        Ok(ProviderRateLimiter::new(
            non_zero("provider.requests_per_second", self.provider.requests_per_second)?,
            non_zero("provider.burst", self.provider.burst)?,
        ))
    }

    /// Validated engine tunables.
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        let provider = &self.provider;
        if !(1..=MAX_BATCH_SIZE).contains(&provider.max_batch_size) {
            bail!("provider.max_batch_size must be between 1 and {}", MAX_BATCH_SIZE);
        }
        if !(1..=DEFAULT_PAGE_SIZE).contains(&provider.page_size) {
            bail!("provider.page_size must be between 1 and {}", DEFAULT_PAGE_SIZE);
        }
        if !(self.sync.fuzzy_threshold > 0.0 && self.sync.fuzzy_threshold <= 1.0) {
            bail!("sync.fuzzy_threshold must be in (0, 1]");
        }
        non_zero("provider.max_attempts", provider.max_attempts)?;

        Ok(EngineSettings {
            fuzzy_threshold: self.sync.fuzzy_threshold,
            page_size: provider.page_size,
            max_batch_size: provider.max_batch_size,
            pass_deadline: parse_duration("sync.pass_deadline", &self.sync.pass_deadline)?,
            retry: RetryPolicy {
                max_attempts: provider.max_attempts,
                base_delay: parse_duration("provider.base_backoff", &provider.base_backoff)?,
                max_delay: parse_duration("provider.max_backoff", &provider.max_backoff)?,
            },
        })
    }
}
