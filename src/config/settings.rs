//! Configuration settings for fieldqueue.
//!
//! Settings are loaded from `~/.fieldqueue/config.yaml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::QueueError;
use crate::queue::{ReplayConfig, MAX_RETRIES};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Queue storage settings.
    pub queue: QueueSettings,
    /// Replay policy settings.
    pub replay: ReplaySettings,
    /// HTTP delivery settings.
    pub delivery: DeliveryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default = "default_color")]
    pub color: ColorSetting,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

/// Queue storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QueueSettings {
    /// Database file; defaults to `queue.db` under the data root.
    pub database: Option<PathBuf>,
}

/// Replay policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Explicit delivery failures tolerated before an action is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-action delivery timeout in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
    /// Count indeterminate failures (errors, timeouts) toward `max_retries`.
    #[serde(default)]
    pub count_indeterminate: bool,
    /// Seconds between background replay passes in `watch` mode.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

/// HTTP delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Base URL prepended to relative queued URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Timeout applied to each HTTP request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_color() -> ColorSetting {
    ColorSetting::Auto
}

const fn default_max_retries() -> u32 {
    MAX_RETRIES
}

const fn default_delivery_timeout() -> u64 {
    30
}

const fn default_interval() -> u64 {
    60
}

const fn default_request_timeout() -> u64 {
    20
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: default_color(),
        }
    }
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delivery_timeout_secs: default_delivery_timeout(),
            count_indeterminate: false,
            interval_secs: default_interval(),
        }
    }
}

impl ReplaySettings {
    /// Build the engine policy from these settings.
    #[must_use]
    pub fn to_replay_config(&self) -> ReplayConfig {
        ReplayConfig {
            max_retries: self.max_retries,
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
            count_indeterminate: self.count_indeterminate,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &Path) -> Result<Self, QueueError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            QueueError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            QueueError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &Path) -> Result<(), QueueError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| QueueError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            QueueError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Resolve the database path: explicit setting, else the data root default.
    #[must_use]
    pub fn database_path(&self, paths: &Paths) -> PathBuf {
        self.queue
            .database
            .clone()
            .unwrap_or_else(|| paths.database.clone())
    }
}
