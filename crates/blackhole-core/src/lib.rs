//! Blackhole Core - Streaming event detection and calibration
//!
//! This library correlates a motion (angular-rate) stream with an acoustic
//! amplitude stream to time a physical event: a motion trigger followed by
//! two acoustic threshold crossings. The elapsed time between the crossings
//! is converted into a calibrated physical value with a power-law model.

pub mod calibration;
pub mod config;
pub mod detection;
pub mod sensor;
pub mod session;

pub use calibration::model::{CalibrationCoefficients, DisplayUnit, RegressionTriple};
pub use config::Settings;
pub use detection::config::DetectorConfig;
pub use detection::detector::EventDetector;
pub use detection::state::{DetectionState, EventRecord, FlagChangeLogEntry};
pub use sensor::buffer::SampleBuffer;
pub use sensor::sample::{AcousticSample, MotionSample, SensorSample, Timestamp};
pub use session::measurement::MeasurementSession;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default capacity of each per-stream sample buffer.
///
/// Roughly 1.4 seconds of audio at 48kHz, several seconds of motion data.
pub const DEFAULT_BUFFER_CAPACITY: usize = 65536;

/// Default interval between session polls of the detector logs
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default sensor warmup before the detector is armed
pub const DEFAULT_WARMUP_MS: u64 = 7000;
