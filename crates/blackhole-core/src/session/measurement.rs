//! Measurement session
//!
//! Drives an [`EventDetector`] through its lifecycle and turns the events
//! it emits into calibrated measurements. The session reads the detector
//! logs through its own [`LogCursor`], so other consumers of the same
//! detector are unaffected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::model::{
    convert, convert_reference, scale_for_display, CalibrationCoefficients, CalibrationError,
    DisplayValue,
};
use crate::detection::detector::EventDetector;
use crate::detection::log::LogCursor;
use crate::detection::state::{DetectionState, EventRecord, FlagChangeLogEntry};
use crate::sensor::sample::Timestamp;

use super::store::{ResultStats, ResultStore};

/// One completed cycle with its calibrated values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub record: EventRecord,
    /// Trigger time relative to the session start
    pub elapsed_ms: u64,
    /// Interval between the two crossings
    pub delta_seconds: f64,
    /// Value from the reference triple, for offline comparison
    pub reference_value: f64,
    /// Value from the runtime triple, the one shown to the user
    pub runtime_value: f64,
}

impl MeasurementResult {
    /// Convert a detector record with the given coefficients
    pub fn from_record(
        record: EventRecord,
        origin: Timestamp,
        coeffs: &CalibrationCoefficients,
    ) -> Self {
        let delta_seconds = record.delta_seconds();
        Self {
            record,
            elapsed_ms: record.tr_time.saturating_sub(origin),
            delta_seconds,
            reference_value: convert_reference(delta_seconds, coeffs),
            runtime_value: convert(delta_seconds, coeffs),
        }
    }
}

/// Outcome of one [`MeasurementSession::poll`]
#[derive(Debug, Clone, PartialEq)]
pub struct PollSummary {
    /// Detector state at the time of the poll
    pub state: DetectionState,
    /// Results converted during this poll
    pub new_results: Vec<MeasurementResult>,
    /// Flag changes drained during this poll
    pub new_flag_changes: Vec<FlagChangeLogEntry>,
    /// The detector was reset since the previous poll
    pub reset: bool,
}

/// Lifecycle and result bookkeeping around one shared detector
pub struct MeasurementSession {
    detector: Arc<EventDetector>,
    coeffs: CalibrationCoefficients,
    cursor: LogCursor,
    store: ResultStore,
    /// Detector timestamp at `start()`
    origin: Timestamp,
    started_at: Option<DateTime<Utc>>,
}

impl MeasurementSession {
    /// Create a session; coefficients are validated up front
    pub fn new(
        detector: Arc<EventDetector>,
        coeffs: CalibrationCoefficients,
    ) -> Result<Self, CalibrationError> {
        coeffs.validate()?;
        Ok(Self {
            detector,
            coeffs,
            cursor: LogCursor::new(),
            store: ResultStore::new(),
            origin: 0,
            started_at: None,
        })
    }

    /// Arm the detector and mark the session origin
    pub fn start(&mut self) {
        if self.detector.state().is_running() {
            return;
        }
        self.origin = self.detector.clock();
        self.started_at = Some(Utc::now());
        self.detector.start();
        tracing::info!(origin = self.origin, "session_started");
    }

    /// Stop the detector, keeping logs and results
    pub fn pause(&mut self) {
        self.detector.stop();
        tracing::info!(results = self.store.len(), "session_paused");
    }

    /// Re-arm after a pause, keeping results and origin
    pub fn restart(&mut self) {
        if self.started_at.is_none() {
            self.start();
            return;
        }
        self.detector.start();
        tracing::info!(results = self.store.len(), "session_restarted");
    }

    /// Clear the detector and all results
    pub fn reset(&mut self) {
        self.detector.reset();
        self.store.clear();
        self.origin = 0;
        self.started_at = None;
        // Move the cursor into the new epoch
        self.detector.poll_since(&mut self.cursor);
        tracing::info!("session_reset");
    }

    /// Drain new detector entries and convert new events
    pub fn poll(&mut self) -> PollSummary {
        let delta = self.detector.poll_since(&mut self.cursor);
        if delta.reset {
            tracing::warn!("detector_reset_externally");
            self.store.clear();
        }

        self.store.record_flag_changes(&delta.flag_changes);
        let new_results: Vec<MeasurementResult> = delta
            .events
            .iter()
            .map(|record| MeasurementResult::from_record(*record, self.origin, &self.coeffs))
            .collect();
        for result in &new_results {
            tracing::info!(
                elapsed_ms = result.elapsed_ms,
                delta_seconds = result.delta_seconds,
                value = result.runtime_value,
                partial = result.record.partial,
                "measurement_recorded"
            );
            self.store.record(*result);
        }

        PollSummary {
            state: delta.state,
            new_results,
            new_flag_changes: delta.flag_changes,
            reset: delta.reset,
        }
    }

    /// Replace the coefficients and recompute stored results
    pub fn apply_calibration(
        &mut self,
        coeffs: CalibrationCoefficients,
    ) -> Result<(), CalibrationError> {
        coeffs.validate()?;
        self.coeffs = coeffs;
        self.store.recompute(&self.coeffs);
        tracing::info!(results = self.store.len(), unit = %self.coeffs.unit, "calibration_applied");
        Ok(())
    }

    /// Display value of a result with the current coefficients
    pub fn display(&self, result: &MeasurementResult) -> DisplayValue {
        scale_for_display(result.runtime_value, &self.coeffs)
    }

    /// Display value of the most recent result
    pub fn latest_display(&self) -> Option<DisplayValue> {
        self.store.latest().map(|result| self.display(result))
    }

    pub fn detector(&self) -> &Arc<EventDetector> {
        &self.detector
    }

    pub fn coefficients(&self) -> &CalibrationCoefficients {
        &self.coeffs
    }

    pub fn results(&self) -> &[MeasurementResult] {
        self.store.results()
    }

    /// Flag changes mirrored so far
    pub fn flag_changes(&self) -> &[FlagChangeLogEntry] {
        self.store.flag_changes()
    }

    pub fn stats(&self) -> &ResultStats {
        self.store.stats()
    }

    pub fn origin(&self) -> Timestamp {
        self.origin
    }

    /// Wall-clock time of the last `start()`
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn state(&self) -> DetectionState {
        self.detector.state()
    }
}
