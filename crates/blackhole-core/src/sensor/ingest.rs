//! Parsing of newline-delimited JSON sample records
//!
//! Each line is one sample:
//!
//! ```text
//! {"kind":"motion","timestamp":10,"magnitude":2.5}
//! {"kind":"motion","timestamp":12,"x":0.1,"y":2.4,"z":0.0}
//! {"kind":"sound","timestamp":15,"amplitude":0.1}
//! ```
//!
//! Records of unknown kind or with missing fields are rejected here, so
//! only well-formed [`SensorSample`]s reach the detector. Extra fields are
//! ignored.

use std::io::BufRead;

use serde::Deserialize;
use thiserror::Error;

use super::sample::{AcousticSample, MotionSample, SensorSample, Timestamp};

/// Errors raised while reading sample records
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("line {line}: malformed sample record: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: motion record needs either magnitude or all of x, y, z")]
    IncompleteMotion { line: usize },

    #[error("failed to read sample stream: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawRecord {
    Motion {
        timestamp: Timestamp,
        magnitude: Option<f64>,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    },
    Sound {
        timestamp: Timestamp,
        amplitude: f64,
    },
}

/// Parse a single record
///
/// `line` is only used for error messages.
///
/// # Example
/// ```
/// use blackhole_core::sensor::ingest::parse_record;
/// use blackhole_core::sensor::sample::SensorSample;
///
/// let sample = parse_record(r#"{"kind":"sound","timestamp":20,"amplitude":0.6}"#, 1).unwrap();
/// assert!(matches!(sample, SensorSample::Sound(s) if s.timestamp == 20));
/// ```
pub fn parse_record(text: &str, line: usize) -> Result<SensorSample, IngestError> {
    let raw: RawRecord =
        serde_json::from_str(text).map_err(|source| IngestError::Malformed { line, source })?;

    match raw {
        RawRecord::Motion {
            timestamp,
            magnitude: Some(magnitude),
            ..
        } => Ok(MotionSample::new(timestamp, magnitude).into()),
        RawRecord::Motion {
            timestamp,
            magnitude: None,
            x: Some(x),
            y: Some(y),
            z: Some(z),
        } => Ok(MotionSample::from_axes(timestamp, x, y, z).into()),
        RawRecord::Motion { .. } => Err(IngestError::IncompleteMotion { line }),
        RawRecord::Sound {
            timestamp,
            amplitude,
        } => Ok(AcousticSample::new(timestamp, amplitude).into()),
    }
}

/// Iterate over the records of a reader
///
/// Blank lines and lines starting with `#` are skipped. Each item carries
/// its own error so a caller can log a bad line and keep going.
pub fn read_records<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<SensorSample, IngestError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(i, line)| match line {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(parse_record(trimmed, i + 1))
                }
            }
            Err(e) => Some(Err(IngestError::Io(e))),
        })
}
