//! Storage of converted measurements
//!
//! Keeps every result of the session together with a mirror of the
//! detector flag-change log, and running statistics over the runtime
//! values.

use crate::calibration::model::{convert, convert_reference, CalibrationCoefficients};
use crate::detection::state::FlagChangeLogEntry;

use super::measurement::MeasurementResult;

/// Running statistics over stored results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultStats {
    /// Number of results
    pub count: u64,
    /// Smallest runtime value
    pub min_value: Option<f64>,
    /// Largest runtime value
    pub max_value: Option<f64>,
    /// Average runtime value
    pub mean_value: Option<f64>,
    /// Results built from truncated lookback history
    pub partial_count: u64,
    /// Runtime value of the most recent result
    pub current_value: Option<f64>,
    sum: f64,
}

impl ResultStats {
    fn record(&mut self, result: &MeasurementResult) {
        let value = result.runtime_value;
        self.count += 1;
        self.sum += value;
        self.min_value = Some(self.min_value.map_or(value, |m| m.min(value)));
        self.max_value = Some(self.max_value.map_or(value, |m| m.max(value)));
        self.mean_value = Some(self.sum / self.count as f64);
        self.current_value = Some(value);
        if result.record.partial {
            self.partial_count += 1;
        }
    }
}

/// Results and diagnostics of one measurement session
#[derive(Debug, Default)]
pub struct ResultStore {
    results: Vec<MeasurementResult>,
    flag_changes: Vec<FlagChangeLogEntry>,
    stats: ResultStats,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a converted measurement
    pub fn record(&mut self, result: MeasurementResult) {
        self.stats.record(&result);
        self.results.push(result);
    }

    /// Mirror flag changes drained from the detector
    pub fn record_flag_changes(&mut self, entries: &[FlagChangeLogEntry]) {
        self.flag_changes.extend_from_slice(entries);
    }

    pub fn results(&self) -> &[MeasurementResult] {
        &self.results
    }

    pub fn flag_changes(&self) -> &[FlagChangeLogEntry] {
        &self.flag_changes
    }

    pub fn stats(&self) -> &ResultStats {
        &self.stats
    }

    /// Most recent result
    pub fn latest(&self) -> Option<&MeasurementResult> {
        self.results.last()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Re-run the conversion of every stored result with new coefficients
    pub fn recompute(&mut self, coeffs: &CalibrationCoefficients) {
        self.stats = ResultStats::default();
        for result in &mut self.results {
            result.runtime_value = convert(result.delta_seconds, coeffs);
            result.reference_value = convert_reference(result.delta_seconds, coeffs);
            self.stats.record(result);
        }
    }

    /// Drop all results, mirrored log entries and statistics
    pub fn clear(&mut self) {
        self.results.clear();
        self.flag_changes.clear();
        self.stats = ResultStats::default();
    }
}
