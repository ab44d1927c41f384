//! Coefficients as typed by a user
//!
//! Values arrive as free text from a settings form and are checked here,
//! before anything reaches the conversion functions.

use serde::{Deserialize, Serialize};

use super::model::{
    CalibrationCoefficients, CalibrationError, DisplayUnit, RegressionTriple, UnitFactors,
};

/// Raw settings form, every field optional text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationForm {
    pub reference_a: Option<String>,
    pub reference_b: Option<String>,
    pub reference_c: Option<String>,
    pub runtime_a: Option<String>,
    pub runtime_b: Option<String>,
    pub runtime_c: Option<String>,
    pub user_parameter: Option<String>,
    pub unit: Option<String>,
}

/// Parse one optional field; blank text counts as missing
fn parse_field(field: &'static str, text: Option<&str>) -> Result<Option<f64>, CalibrationError> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let value: f64 = text.parse().map_err(|_| CalibrationError::NotNumeric {
        field,
        value: text.to_string(),
    })?;
    if !value.is_finite() {
        return Err(CalibrationError::NonFinite { field, value });
    }
    Ok(Some(value))
}

fn require(field: &'static str, text: Option<&str>) -> Result<f64, CalibrationError> {
    parse_field(field, text)?.ok_or(CalibrationError::Missing { field })
}

impl CalibrationCoefficients {
    /// Build coefficients from form input
    ///
    /// The runtime triple is mandatory. Missing reference fields fall back
    /// to the shipped reference triple, a missing multiplier to 1.0 and a
    /// missing unit to meters. Unit factors are not user-editable.
    ///
    /// # Example
    /// ```
    /// use blackhole_core::calibration::input::CalibrationForm;
    /// use blackhole_core::calibration::model::{CalibrationCoefficients, DisplayUnit};
    ///
    /// let form = CalibrationForm {
    ///     runtime_a: Some("2.7543".into()),
    ///     runtime_b: Some("-1.513".into()),
    ///     runtime_c: Some("-0.1557".into()),
    ///     unit: Some("ftPerSteps".into()),
    ///     ..Default::default()
    /// };
    /// let coeffs = CalibrationCoefficients::from_form(&form).unwrap();
    /// assert_eq!(coeffs.unit, DisplayUnit::FeetPerStep);
    /// ```
    pub fn from_form(form: &CalibrationForm) -> Result<Self, CalibrationError> {
        let runtime = RegressionTriple::new(
            require("runtime_a", form.runtime_a.as_deref())?,
            require("runtime_b", form.runtime_b.as_deref())?,
            require("runtime_c", form.runtime_c.as_deref())?,
        );

        let mut reference = RegressionTriple::REFERENCE;
        for (field, text, slot) in [
            ("reference_a", form.reference_a.as_deref(), &mut reference.a),
            ("reference_b", form.reference_b.as_deref(), &mut reference.b),
            ("reference_c", form.reference_c.as_deref(), &mut reference.c),
        ] {
            match parse_field(field, text)? {
                Some(value) => *slot = value,
                None => tracing::warn!(field, default = *slot, "reference_coefficient_defaulted"),
            }
        }

        let user_parameter = parse_field("user_parameter", form.user_parameter.as_deref())?
            .unwrap_or(1.0);
        let unit: DisplayUnit = match form.unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(text) => text.parse()?,
            None => Default::default(),
        };

        let coeffs = Self {
            reference,
            runtime,
            user_parameter,
            unit,
            unit_factors: UnitFactors::default(),
        };
        tracing::debug!(?coeffs, "calibration_parsed");
        Ok(coeffs)
    }

    /// Form pre-filled with these coefficients
    pub fn to_form(&self) -> CalibrationForm {
        CalibrationForm {
            reference_a: Some(self.reference.a.to_string()),
            reference_b: Some(self.reference.b.to_string()),
            reference_c: Some(self.reference.c.to_string()),
            runtime_a: Some(self.runtime.a.to_string()),
            runtime_b: Some(self.runtime.b.to_string()),
            runtime_c: Some(self.runtime.c.to_string()),
            user_parameter: Some(self.user_parameter.to_string()),
            unit: Some(self.unit.label().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_form() -> CalibrationForm {
        CalibrationForm {
            runtime_a: Some("3.0".into()),
            runtime_b: Some(" -1.2 ".into()),
            runtime_c: Some("0".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_runtime_fields_required() {
        let form = CalibrationForm {
            runtime_c: None,
            ..runtime_form()
        };
        assert_eq!(
            CalibrationCoefficients::from_form(&form),
            Err(CalibrationError::Missing { field: "runtime_c" })
        );

        let form = CalibrationForm {
            runtime_a: Some("   ".into()),
            ..runtime_form()
        };
        assert_eq!(
            CalibrationCoefficients::from_form(&form),
            Err(CalibrationError::Missing { field: "runtime_a" })
        );
    }

    #[test]
    fn test_non_numeric_rejected() {
        let form = CalibrationForm {
            runtime_b: Some("abc".into()),
            ..runtime_form()
        };
        assert!(matches!(
            CalibrationCoefficients::from_form(&form),
            Err(CalibrationError::NotNumeric {
                field: "runtime_b",
                ..
            })
        ));

        let form = CalibrationForm {
            reference_a: Some("1,5".into()),
            ..runtime_form()
        };
        assert!(CalibrationCoefficients::from_form(&form).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let form = CalibrationForm {
            runtime_a: Some("inf".into()),
            ..runtime_form()
        };
        assert!(matches!(
            CalibrationCoefficients::from_form(&form),
            Err(CalibrationError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_reference_falls_back_per_field() {
        let form = CalibrationForm {
            reference_b: Some("-2".into()),
            ..runtime_form()
        };
        let coeffs = CalibrationCoefficients::from_form(&form).unwrap();
        assert_eq!(coeffs.runtime, RegressionTriple::new(3.0, -1.2, 0.0));
        assert_eq!(coeffs.reference.a, RegressionTriple::REFERENCE.a);
        assert_eq!(coeffs.reference.b, -2.0);
        assert_eq!(coeffs.user_parameter, 1.0);
        assert_eq!(coeffs.unit, DisplayUnit::Meters);
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let form = CalibrationForm {
            unit: Some("furlong".into()),
            ..runtime_form()
        };
        assert_eq!(
            CalibrationCoefficients::from_form(&form),
            Err(CalibrationError::UnknownUnit("furlong".into()))
        );
    }

    #[test]
    fn test_to_form_parses_back() {
        let coeffs = CalibrationCoefficients {
            unit: DisplayUnit::Feet,
            user_parameter: 1.25,
            ..Default::default()
        };
        assert_eq!(
            CalibrationCoefficients::from_form(&coeffs.to_form()).unwrap(),
            coeffs
        );
    }
}
