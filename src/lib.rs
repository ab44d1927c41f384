//! Blackhole - depth measurement from motion and acoustic sensor streams
//!
//! This library re-exports the detector, calibration model and measurement
//! session from `blackhole-core`. The `blackhole` binary replays recorded
//! sample streams through them.

pub use blackhole_core::calibration;
pub use blackhole_core::config;
pub use blackhole_core::detection;
pub use blackhole_core::sensor;
pub use blackhole_core::session;

pub use blackhole_core::{
    AcousticSample, CalibrationCoefficients, DetectionState, DetectorConfig, DisplayUnit,
    EventDetector, EventRecord, FlagChangeLogEntry, MeasurementSession, MotionSample,
    RegressionTriple, SampleBuffer, SensorSample, Settings, Timestamp,
};
pub use blackhole_core::{BUILD_DATE, DEFAULT_BUFFER_CAPACITY, VERSION};
