//! Sensor sample handling
//!
//! This module contains everything that touches raw samples:
//! - Typed motion and acoustic samples ([`sample`])
//! - Bounded per-stream history with lookback ([`buffer`])
//! - Parsing of newline-delimited JSON sample records ([`ingest`])
//! - Optional raw sample recording to disk ([`recorder`])

pub mod buffer;
pub mod ingest;
pub mod recorder;
pub mod sample;
