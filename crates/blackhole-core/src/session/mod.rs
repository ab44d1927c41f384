//! Measurement session on top of the detector
//!
//! - `measurement`: lifecycle, polling and conversion of completed cycles
//! - `store`: converted results and running statistics

pub mod measurement;
pub mod store;

pub use measurement::{MeasurementResult, MeasurementSession, PollSummary};
pub use store::{ResultStats, ResultStore};
