//! Detection state machine
//!
//! - `state`: states, transition table, log and event records
//! - `config`: thresholds and timing
//! - `detector`: the `EventDetector` that drives the machine from samples
//! - `log`: cursors, deltas and notifications for log consumers

pub mod config;
pub mod detector;
pub mod log;
pub mod state;
