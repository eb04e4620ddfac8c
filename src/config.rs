//! Configuration for the sensor report agent.

use crate::store::StorePaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path for storing the transparency log
    pub data_path: PathBuf,

    /// Firebase Realtime Database base URL (e.g. `https://<db>.firebaseio.com`)
    pub database_url: Option<String>,

    /// Store nodes for each event stream
    pub paths: StorePaths,

    /// Maximum range reported by replayed proximity sensors
    pub proximity_max_range: f64,

    /// Motion band thresholds
    pub motion: MotionThresholds,

    /// Writes waiting for the store before new ones are dropped
    pub write_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-report-agent");

        Self {
            data_path: data_dir,
            database_url: None,
            paths: StorePaths::default(),
            proximity_max_range: 5.0,
            motion: MotionThresholds::default(),
            write_queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-report-agent")
            .join("config.json")
    }

    /// Path of the persisted transparency statistics.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Thresholds for the motion classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionThresholds {
    /// Magnitude (in g) above which a sample is a shake
    pub shake_threshold_g: f64,
    /// Magnitude (in g) above which a sample is light motion
    pub light_motion_threshold_g: f64,
    /// Minimum time between two counted shakes
    #[serde(with = "duration_millis")]
    pub shake_debounce: Duration,
    /// Standard gravity used to normalize each axis (m/s²)
    pub gravity: f64,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            shake_threshold_g: 2.7,
            light_motion_threshold_g: 1.2,
            shake_debounce: Duration::from_millis(500),
            gravity: 9.8,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serde support for Duration as whole milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
