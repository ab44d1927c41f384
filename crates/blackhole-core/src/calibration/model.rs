//! Power-law calibration model
//!
//! The interval between the two acoustic crossings is mapped to a physical
//! value with `a * t^b + c`. Two coefficient triples exist: the runtime
//! triple drives every live measurement, the reference triple is kept for
//! offline comparison against a ground-truth instrument.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::state::EventRecord;

/// Errors in calibration coefficients
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("missing value for {field}")]
    Missing { field: &'static str },

    #[error("{field} is not a number: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("unknown display unit: {0:?}")]
    UnknownUnit(String),
}

/// Coefficients of `a * t^b + c`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionTriple {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl RegressionTriple {
    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Triple fitted against the external reference instrument
    pub const REFERENCE: RegressionTriple = RegressionTriple::new(4.5741, -1.336, 0.0);

    /// Triple used for live measurements
    pub const RUNTIME: RegressionTriple = RegressionTriple::new(2.7543, -1.513, -0.1557);

    /// `a * x^b + c`
    pub fn evaluate(&self, x: f64) -> f64 {
        self.a * x.powf(self.b) + self.c
    }

    fn validate(&self, prefix: &'static [&'static str; 3]) -> Result<(), CalibrationError> {
        for (&field, value) in prefix.iter().zip([self.a, self.b, self.c]) {
            if !value.is_finite() {
                return Err(CalibrationError::NonFinite { field, value });
            }
        }
        Ok(())
    }
}

/// Unit the calibrated value is displayed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayUnit {
    #[default]
    Meters,
    Feet,
    MetersPerStep,
    FeetPerStep,
}

impl DisplayUnit {
    pub const ALL: [DisplayUnit; 4] = [
        DisplayUnit::Meters,
        DisplayUnit::Feet,
        DisplayUnit::MetersPerStep,
        DisplayUnit::FeetPerStep,
    ];

    /// Suffix shown next to a value
    pub fn label(self) -> &'static str {
        match self {
            DisplayUnit::Meters => "m",
            DisplayUnit::Feet => "ft",
            DisplayUnit::MetersPerStep => "m/steps",
            DisplayUnit::FeetPerStep => "ft/steps",
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DisplayUnit {
    type Err = CalibrationError;

    /// Accepts labels ("m/steps"), settings keys ("mPerSteps") and the
    /// serialized names ("meters_per_step").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m" | "meters" => Ok(DisplayUnit::Meters),
            "ft" | "feet" => Ok(DisplayUnit::Feet),
            "m/steps" | "mPerSteps" | "meters_per_step" => Ok(DisplayUnit::MetersPerStep),
            "ft/steps" | "ftPerSteps" | "feet_per_step" => Ok(DisplayUnit::FeetPerStep),
            other => Err(CalibrationError::UnknownUnit(other.to_string())),
        }
    }
}

fn default_m_per_m() -> f64 {
    1.0
}

fn default_ft_per_m() -> f64 {
    3.28084
}

fn default_m_per_steps() -> f64 {
    0.8
}

fn default_ft_per_steps() -> f64 {
    2.3
}

/// Conversion factor of each display unit relative to meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitFactors {
    #[serde(default = "default_m_per_m")]
    pub m_per_m: f64,
    #[serde(default = "default_ft_per_m")]
    pub ft_per_m: f64,
    #[serde(default = "default_m_per_steps")]
    pub m_per_steps: f64,
    #[serde(default = "default_ft_per_steps")]
    pub ft_per_steps: f64,
}

impl Default for UnitFactors {
    fn default() -> Self {
        Self {
            m_per_m: default_m_per_m(),
            ft_per_m: default_ft_per_m(),
            m_per_steps: default_m_per_steps(),
            ft_per_steps: default_ft_per_steps(),
        }
    }
}

impl UnitFactors {
    pub fn factor(&self, unit: DisplayUnit) -> f64 {
        match unit {
            DisplayUnit::Meters => self.m_per_m,
            DisplayUnit::Feet => self.ft_per_m,
            DisplayUnit::MetersPerStep => self.m_per_steps,
            DisplayUnit::FeetPerStep => self.ft_per_steps,
        }
    }
}

fn default_reference() -> RegressionTriple {
    RegressionTriple::REFERENCE
}

fn default_runtime() -> RegressionTriple {
    RegressionTriple::RUNTIME
}

fn default_user_parameter() -> f64 {
    1.0
}

/// Regression and unit parameters of a measurement session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCoefficients {
    /// Offline validation model, never used for live values
    #[serde(default = "default_reference")]
    pub reference: RegressionTriple,
    /// Live measurement model, always required when deserialized
    pub runtime: RegressionTriple,
    /// User scale multiplier applied for display
    #[serde(default = "default_user_parameter")]
    pub user_parameter: f64,
    #[serde(default)]
    pub unit: DisplayUnit,
    #[serde(default)]
    pub unit_factors: UnitFactors,
}

impl Default for CalibrationCoefficients {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            runtime: default_runtime(),
            user_parameter: default_user_parameter(),
            unit: DisplayUnit::default(),
            unit_factors: UnitFactors::default(),
        }
    }
}

impl CalibrationCoefficients {
    /// Reject coefficients that would produce non-finite output
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.reference
            .validate(&["reference.a", "reference.b", "reference.c"])?;
        self.runtime
            .validate(&["runtime.a", "runtime.b", "runtime.c"])?;
        if !self.user_parameter.is_finite() {
            return Err(CalibrationError::NonFinite {
                field: "user_parameter",
                value: self.user_parameter,
            });
        }
        for unit in DisplayUnit::ALL {
            let value = self.unit_factors.factor(unit);
            if !value.is_finite() {
                return Err(CalibrationError::NonFinite {
                    field: "unit_factors",
                    value,
                });
            }
        }
        Ok(())
    }

    /// Factor of the selected unit relative to meters
    pub fn unit_factor(&self) -> f64 {
        self.unit_factors.factor(self.unit)
    }
}

/// Convert a crossing interval with the runtime triple
///
/// `delta_seconds` is positive and finite for every record the detector
/// emits, since the dwell is at least one millisecond.
///
/// # Example
/// ```
/// use blackhole_core::calibration::model::{convert, CalibrationCoefficients};
///
/// let coeffs = CalibrationCoefficients::default();
/// let value = convert(0.2, &coeffs);
/// assert!((value - (2.7543 * 0.2f64.powf(-1.513) - 0.1557)).abs() < 1e-12);
/// ```
pub fn convert(delta_seconds: f64, coeffs: &CalibrationCoefficients) -> f64 {
    coeffs.runtime.evaluate(delta_seconds)
}

/// Convert a crossing interval with the reference triple
pub fn convert_reference(delta_seconds: f64, coeffs: &CalibrationCoefficients) -> f64 {
    coeffs.reference.evaluate(delta_seconds)
}

/// Apply the user multiplier and the selected unit factor
pub fn scale_for_display(value: f64, coeffs: &CalibrationCoefficients) -> DisplayValue {
    DisplayValue {
        value: value * coeffs.user_parameter * coeffs.unit_factor(),
        unit: coeffs.unit,
    }
}

/// Crossing interval of a record in seconds
pub fn delta_seconds(record: &EventRecord) -> f64 {
    record.delta_seconds()
}

/// A value ready to show, formatted with one decimal place
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayValue {
    pub value: f64,
    pub unit: DisplayUnit,
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} {}", self.value, self.unit.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_convert_matches_power_law() {
        let coeffs = CalibrationCoefficients {
            runtime: RegressionTriple::new(2.7543, -1.513, -0.1557),
            ..Default::default()
        };
        let expected = 2.7543 * 0.2f64.powf(-1.513) + (-0.1557);
        assert_relative_eq!(convert(0.2, &coeffs), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_convert_is_deterministic() {
        let coeffs = CalibrationCoefficients::default();
        for delta in [0.001, 0.05, 0.2, 1.7, 12.0] {
            assert_eq!(
                convert(delta, &coeffs).to_bits(),
                convert(delta, &coeffs).to_bits()
            );
        }
    }

    #[test]
    fn test_reference_uses_its_own_triple() {
        let coeffs = CalibrationCoefficients::default();
        assert_relative_eq!(
            convert_reference(0.5, &coeffs),
            4.5741 * 0.5f64.powf(-1.336),
            epsilon = 1e-12
        );
        assert!((convert_reference(0.5, &coeffs) - convert(0.5, &coeffs)).abs() > 1e-3);
    }

    #[test]
    fn test_scale_for_display() {
        let mut coeffs = CalibrationCoefficients {
            user_parameter: 2.0,
            unit: DisplayUnit::Feet,
            ..Default::default()
        };
        let shown = scale_for_display(10.0, &coeffs);
        assert_relative_eq!(shown.value, 65.6168, epsilon = 1e-9);
        assert_eq!(shown.to_string(), "65.6 ft");

        coeffs.unit = DisplayUnit::MetersPerStep;
        coeffs.user_parameter = 1.0;
        assert_eq!(scale_for_display(10.0, &coeffs).to_string(), "8.0 m/steps");
    }

    #[test]
    fn test_delta_seconds() {
        let record = EventRecord {
            tr_time: 10,
            ts1_time: 20,
            ts2_time: 220,
            partial: false,
        };
        assert_relative_eq!(delta_seconds(&record), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("mPerSteps".parse::<DisplayUnit>(), Ok(DisplayUnit::MetersPerStep));
        assert_eq!("ft/steps".parse::<DisplayUnit>(), Ok(DisplayUnit::FeetPerStep));
        assert_eq!(" m ".parse::<DisplayUnit>(), Ok(DisplayUnit::Meters));
        assert!(matches!(
            "yards".parse::<DisplayUnit>(),
            Err(CalibrationError::UnknownUnit(_))
        ));
        for unit in DisplayUnit::ALL {
            assert_eq!(unit.label().parse::<DisplayUnit>(), Ok(unit));
        }
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let coeffs = CalibrationCoefficients {
            runtime: RegressionTriple::new(2.0, f64::NAN, 0.0),
            ..Default::default()
        };
        assert!(matches!(
            coeffs.validate(),
            Err(CalibrationError::NonFinite {
                field: "runtime.b",
                ..
            })
        ));
        assert!(CalibrationCoefficients::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_defaults_everything_but_runtime() {
        let coeffs: CalibrationCoefficients = serde_json::from_str(
            r#"{"runtime": {"a": 3.0, "b": -1.4, "c": 0.0}, "unit": "feet", "user_parameter": 1.1}"#,
        )
        .unwrap();
        assert_eq!(coeffs.runtime, RegressionTriple::new(3.0, -1.4, 0.0));
        assert_eq!(coeffs.reference, RegressionTriple::REFERENCE);
        assert_eq!(coeffs.unit, DisplayUnit::Feet);
        assert_relative_eq!(coeffs.unit_factor(), 3.28084);
    }

    #[test]
    fn test_missing_runtime_triple_is_rejected() {
        let result: Result<CalibrationCoefficients, _> =
            serde_json::from_str(r#"{"unit": "feet", "user_parameter": 1.1}"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("runtime"), "{}", err);
    }
}
