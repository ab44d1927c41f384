//! Typed samples delivered by the motion and acoustic sources
//!
//! Both sources stamp samples with milliseconds on the same monotonic
//! clock. They are not synchronized with each other beyond that.

use serde::{Deserialize, Serialize};

/// Milliseconds on the monotonic clock shared by both sensor sources
pub type Timestamp = u64;

/// Anything that carries a sample timestamp
pub trait Timestamped {
    /// Timestamp of this sample in milliseconds
    fn timestamp(&self) -> Timestamp;
}

/// One acoustic amplitude reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcousticSample {
    /// Capture time in milliseconds
    pub timestamp: Timestamp,
    /// Signed amplitude
    pub amplitude: f64,
}

impl AcousticSample {
    pub fn new(timestamp: Timestamp, amplitude: f64) -> Self {
        Self {
            timestamp,
            amplitude,
        }
    }
}

/// One angular-rate reading, reduced to its magnitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Capture time in milliseconds
    pub timestamp: Timestamp,
    /// Magnitude of the 3-axis angular rate
    pub magnitude: f64,
}

impl MotionSample {
    pub fn new(timestamp: Timestamp, magnitude: f64) -> Self {
        Self {
            timestamp,
            magnitude,
        }
    }

    /// Build a sample from raw gyroscope axes
    ///
    /// The magnitude is the Euclidean norm of the three rates.
    ///
    /// # Example
    /// ```
    /// use blackhole_core::sensor::sample::MotionSample;
    ///
    /// let sample = MotionSample::from_axes(10, 3.0, 4.0, 0.0);
    /// assert!((sample.magnitude - 5.0).abs() < 1e-12);
    /// ```
    pub fn from_axes(timestamp: Timestamp, x: f64, y: f64, z: f64) -> Self {
        Self {
            timestamp,
            magnitude: x.hypot(y).hypot(z),
        }
    }
}

impl Timestamped for AcousticSample {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Timestamped for MotionSample {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Which physical source a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Motion,
    Sound,
}

impl SensorKind {
    /// Stable on-disk tag for the raw recorder
    pub fn tag(self) -> u8 {
        match self {
            SensorKind::Motion => 1,
            SensorKind::Sound => 2,
        }
    }

    /// Inverse of [`SensorKind::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(SensorKind::Motion),
            2 => Some(SensorKind::Sound),
            _ => None,
        }
    }
}

/// A sample from either source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorSample {
    Motion(MotionSample),
    Sound(AcousticSample),
}

impl SensorSample {
    /// Source of this sample
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorSample::Motion(_) => SensorKind::Motion,
            SensorSample::Sound(_) => SensorKind::Sound,
        }
    }

    /// Scalar value: magnitude for motion, amplitude for sound
    pub fn value(&self) -> f64 {
        match self {
            SensorSample::Motion(m) => m.magnitude,
            SensorSample::Sound(s) => s.amplitude,
        }
    }
}

impl Timestamped for SensorSample {
    fn timestamp(&self) -> Timestamp {
        match self {
            SensorSample::Motion(m) => m.timestamp,
            SensorSample::Sound(s) => s.timestamp,
        }
    }
}

impl From<MotionSample> for SensorSample {
    fn from(sample: MotionSample) -> Self {
        SensorSample::Motion(sample)
    }
}

impl From<AcousticSample> for SensorSample {
    fn from(sample: AcousticSample) -> Self {
        SensorSample::Sound(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_from_axes() {
        let sample = MotionSample::from_axes(0, 1.0, 2.0, 2.0);
        assert!((sample.magnitude - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_from_large_axes_stays_finite() {
        let sample = MotionSample::from_axes(0, 3e200, 4e200, 0.0);
        assert!(sample.magnitude.is_finite());
        assert!((sample.magnitude / 5e200 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sensor_sample_accessors() {
        let motion: SensorSample = MotionSample::new(10, 2.5).into();
        let sound: SensorSample = AcousticSample::new(20, -0.4).into();

        assert_eq!(motion.kind(), SensorKind::Motion);
        assert_eq!(motion.timestamp(), 10);
        assert_eq!(motion.value(), 2.5);

        assert_eq!(sound.kind(), SensorKind::Sound);
        assert_eq!(sound.timestamp(), 20);
        assert_eq!(sound.value(), -0.4);
    }

    #[test]
    fn test_kind_tags() {
        for kind in [SensorKind::Motion, SensorKind::Sound] {
            assert_eq!(SensorKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(SensorKind::from_tag(0), None);
    }
}
