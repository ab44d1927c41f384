//! Detector thresholds and timing parameters

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in detector parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorConfigError {
    #[error("{name} must be finite, got {value}")]
    NonFiniteThreshold { name: &'static str, value: f64 },

    #[error("buffer capacity must be at least 1")]
    ZeroCapacity,

    #[error("minimum dwell must be at least 1 ms")]
    ZeroDwell,

    #[error("crossing timeout ({timeout_ms} ms) must exceed the minimum dwell ({dwell_ms} ms)")]
    TimeoutShorterThanDwell { timeout_ms: u64, dwell_ms: u64 },

    #[error("detector must be stopped before it can be reconfigured")]
    Running,
}

/// Direction in which an acoustic threshold must be crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingDirection {
    /// From at-or-below the threshold to strictly above it
    #[default]
    Rising,
    /// From at-or-above the threshold to strictly below it
    Falling,
}

impl CrossingDirection {
    /// Whether moving from `prev` to `current` crosses `threshold`
    ///
    /// Without a previous sample, the current level alone decides.
    ///
    /// # Example
    /// ```
    /// use blackhole_core::detection::config::CrossingDirection;
    ///
    /// assert!(CrossingDirection::Rising.crossed(0.5, Some(0.1), 0.6));
    /// assert!(!CrossingDirection::Rising.crossed(0.5, Some(0.7), 0.6));
    /// ```
    pub fn crossed(self, threshold: f64, prev: Option<f64>, current: f64) -> bool {
        match self {
            CrossingDirection::Rising => {
                current > threshold && prev.map_or(true, |p| p <= threshold)
            }
            CrossingDirection::Falling => {
                current < threshold && prev.map_or(true, |p| p >= threshold)
            }
        }
    }
}

fn default_trigger_threshold() -> f64 {
    2.0
}

fn default_first_threshold() -> f64 {
    0.5
}

fn default_second_threshold() -> f64 {
    0.3
}

fn default_min_dwell_ms() -> u64 {
    50
}

fn default_cooldown_ms() -> u64 {
    500
}

fn default_crossing_timeout_ms() -> u64 {
    3000
}

fn default_buffer_capacity() -> usize {
    crate::DEFAULT_BUFFER_CAPACITY
}

/// Detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Motion magnitude that must be exceeded to trigger
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f64,
    /// Level of the first acoustic crossing
    #[serde(default = "default_first_threshold")]
    pub first_threshold: f64,
    #[serde(default)]
    pub first_direction: CrossingDirection,
    /// Level of the second acoustic crossing
    #[serde(default = "default_second_threshold")]
    pub second_threshold: f64,
    #[serde(default)]
    pub second_direction: CrossingDirection,
    /// Minimum time between the two crossings (debounce)
    #[serde(default = "default_min_dwell_ms")]
    pub min_dwell_ms: u64,
    /// Quiet period after a completed cycle
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Maximum wait for each expected crossing
    #[serde(default = "default_crossing_timeout_ms")]
    pub crossing_timeout_ms: u64,
    /// Samples retained per stream
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: default_trigger_threshold(),
            first_threshold: default_first_threshold(),
            first_direction: CrossingDirection::Rising,
            second_threshold: default_second_threshold(),
            second_direction: CrossingDirection::Rising,
            min_dwell_ms: default_min_dwell_ms(),
            cooldown_ms: default_cooldown_ms(),
            crossing_timeout_ms: default_crossing_timeout_ms(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl DetectorConfig {
    /// Check that the parameters describe a usable detector
    pub fn validate(&self) -> Result<(), DetectorConfigError> {
        for (name, value) in [
            ("trigger_threshold", self.trigger_threshold),
            ("first_threshold", self.first_threshold),
            ("second_threshold", self.second_threshold),
        ] {
            if !value.is_finite() {
                return Err(DetectorConfigError::NonFiniteThreshold { name, value });
            }
        }
        if self.buffer_capacity == 0 {
            return Err(DetectorConfigError::ZeroCapacity);
        }
        // A zero delta would hit the power law with a negative exponent
        if self.min_dwell_ms == 0 {
            return Err(DetectorConfigError::ZeroDwell);
        }
        if self.crossing_timeout_ms <= self.min_dwell_ms {
            return Err(DetectorConfigError::TimeoutShorterThanDwell {
                timeout_ms: self.crossing_timeout_ms,
                dwell_ms: self.min_dwell_ms,
            });
        }
        Ok(())
    }
}
