//! Bounded per-stream sample history
//!
//! Keeps the most recent N samples of one stream so the detector can look
//! back across the acquisition latency between the two sensors.

use std::collections::VecDeque;

use super::sample::{Timestamp, Timestamped};

/// Result of a lookback query
#[derive(Debug, Clone, PartialEq)]
pub struct Lookback<T> {
    /// Retained samples at or after the requested timestamp, oldest first
    pub samples: Vec<T>,
    /// True when samples at or after the requested timestamp were evicted
    pub truncated: bool,
}

/// Fixed-capacity ring of timestamped samples
///
/// Pushing into a full buffer discards the oldest sample. Timestamps are
/// expected to be non-decreasing; the detector rejects out-of-order samples
/// before they get here.
///
/// # Example
/// ```
/// use blackhole_core::sensor::buffer::SampleBuffer;
/// use blackhole_core::sensor::sample::AcousticSample;
///
/// let mut buffer = SampleBuffer::new(2);
/// buffer.push(AcousticSample::new(0, 0.1));
/// buffer.push(AcousticSample::new(10, 0.2));
/// buffer.push(AcousticSample::new(20, 0.3));
///
/// let lookback = buffer.samples_since(0);
/// assert_eq!(lookback.samples.len(), 2);
/// assert!(lookback.truncated);
/// ```
#[derive(Debug, Clone)]
pub struct SampleBuffer<T> {
    /// Maximum number of retained samples
    capacity: usize,
    /// Retained samples, oldest at the front
    samples: VecDeque<T>,
    /// Total samples discarded because the buffer was full
    evicted: u64,
    /// Timestamp of the newest evicted sample
    last_evicted: Option<Timestamp>,
}

impl<T: Timestamped + Clone> SampleBuffer<T> {
    /// Create an empty buffer holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(4096)),
            evicted: 0,
            last_evicted: None,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: T) {
        if self.samples.len() >= self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.evicted += 1;
                self.last_evicted = Some(old.timestamp());
            }
        }
        self.samples.push_back(sample);
    }

    /// All retained samples with `timestamp >= since`, oldest first
    ///
    /// `truncated` is set when the buffer has already discarded a sample
    /// inside the requested range, so the caller is working with partial
    /// history.
    pub fn samples_since(&self, since: Timestamp) -> Lookback<T> {
        let start = self.samples.partition_point(|s| s.timestamp() < since);
        let samples = self.samples.range(start..).cloned().collect();
        let truncated = self.last_evicted.is_some_and(|t| t >= since);
        Lookback { samples, truncated }
    }

    /// Newest retained sample
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    /// Oldest retained sample
    pub fn oldest(&self) -> Option<&T> {
        self.samples.front()
    }

    /// Retained sample immediately before the first one at or after `since`
    pub fn last_before(&self, since: Timestamp) -> Option<&T> {
        let start = self.samples.partition_point(|s| s.timestamp() < since);
        start.checked_sub(1).and_then(|i| self.samples.get(i))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples discarded since creation or the last clear
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Drop all samples and eviction bookkeeping
    pub fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
        self.last_evicted = None;
    }
}
