//! Conversion of crossing intervals into calibrated physical values
//!
//! - `model`: coefficient types and the power-law conversion
//! - `input`: validation of user-entered coefficients

pub mod input;
pub mod model;

pub use input::CalibrationForm;
pub use model::{
    convert, convert_reference, delta_seconds, scale_for_display, CalibrationCoefficients,
    CalibrationError, DisplayUnit, DisplayValue, RegressionTriple, UnitFactors,
};
