//! Persistent settings
//!
//! Detector parameters, calibration coefficients and session timing in one
//! JSON file at `<config_dir>/blackhole/settings.json`. Every field has a
//! default, so partial files load, but a file that exists and cannot be
//! parsed or validated is reported instead of being replaced by defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::model::{CalibrationCoefficients, CalibrationError};
use crate::detection::config::{DetectorConfig, DetectorConfigError};

/// Errors loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid detector settings: {0}")]
    Detector(#[from] DetectorConfigError),

    #[error("invalid calibration settings: {0}")]
    Calibration(#[from] CalibrationError),
}

fn default_poll_interval_ms() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_MS
}

fn default_warmup_ms() -> u64 {
    crate::DEFAULT_WARMUP_MS
}

/// Timing of the measurement session around the detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between polls of the detector logs
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sensor settling time before the detector is armed
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            warmup_ms: default_warmup_ms(),
        }
    }
}

/// Everything persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub calibration: CalibrationCoefficients,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Settings {
    /// Settings file path: `<config_dir>/blackhole/settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blackhole")
            .join("settings.json")
    }

    /// Check detector parameters and calibration coefficients
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        self.calibration.validate()?;
        Ok(())
    }

    /// Load settings, using defaults only when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No settings file found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Settings =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        tracing::info!(path = %path.display(), "Loaded settings from disk");
        Ok(settings)
    }

    /// Save settings, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Settings saved to disk");
        Ok(())
    }
}
