//! Configuration for emotion-pulse.

use crate::core::aggregation::{AggregationConfig, DEFAULT_WINDOW_MINUTES};
use crate::core::recorder::DEFAULT_MIN_INTERVAL;
use crate::core::windowing::BusinessHours;
use crate::store::DB_FILENAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum time between two persisted records
    #[serde(with = "duration_serde")]
    pub min_log_interval: Duration,

    /// Rolling window length in minutes
    pub window_minutes: u32,

    /// Inclusive time-of-day range for the full-day distribution
    pub business_hours: BusinessHours,

    /// How often the dashboard re-runs the aggregate queries
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,

    /// Event store database file
    pub database_path: PathBuf,

    /// Path for recorder statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emotion-pulse");

        Self {
            min_log_interval: DEFAULT_MIN_INTERVAL,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            business_hours: BusinessHours::default(),
            refresh_interval: Duration::from_secs(60),
            database_path: data_dir.join(DB_FILENAME),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emotion-pulse")
            .join("config.json")
    }

    /// Where recorder statistics are persisted between sessions.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("recorder_stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Reject settings the aggregate queries cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_minutes == 0 {
            return Err(ConfigError::Invalid(
                "window_minutes must be at least 1".to_string(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "refresh_interval must be at least 1 second".to_string(),
            ));
        }
        if !self.business_hours.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "business_hours start {} is after end {}",
                self.business_hours.start, self.business_hours.end
            )));
        }
        Ok(())
    }

    pub fn aggregation(&self) -> AggregationConfig {
        AggregationConfig {
            window_minutes: self.window_minutes,
            business_hours: self.business_hours,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
