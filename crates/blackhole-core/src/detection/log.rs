//! Consumer-side views of the detector logs
//!
//! Each consumer keeps its own [`LogCursor`] and asks the detector for what
//! it has not seen yet, or subscribes to a notification channel.

use super::state::{DetectionState, EventRecord, FlagChangeLogEntry};

/// Read position of one consumer in the detector logs
///
/// The epoch changes whenever the detector is reset, which tells the cursor
/// to start over from the beginning of the new logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCursor {
    pub(crate) epoch: u64,
    pub(crate) flag_offset: usize,
    pub(crate) event_offset: usize,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flag changes already consumed
    pub fn flag_offset(&self) -> usize {
        self.flag_offset
    }

    /// Number of events already consumed
    pub fn event_offset(&self) -> usize {
        self.event_offset
    }
}

/// Entries appended since a cursor last polled
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorDelta {
    /// The detector was reset since the last poll; earlier entries are gone
    pub reset: bool,
    /// State at the time of the poll
    pub state: DetectionState,
    pub flag_changes: Vec<FlagChangeLogEntry>,
    pub events: Vec<EventRecord>,
}

impl DetectorDelta {
    pub fn is_empty(&self) -> bool {
        !self.reset && self.flag_changes.is_empty() && self.events.is_empty()
    }
}

/// Pushed to subscribers as entries are appended
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorNotification {
    FlagChange(FlagChangeLogEntry),
    Event(EventRecord),
    /// Logs were cleared by an explicit reset
    Reset,
}

/// Consistent view of the detector taken under one lock acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSnapshot {
    pub state: DetectionState,
    pub flag_changes: Vec<FlagChangeLogEntry>,
    pub events: Vec<EventRecord>,
    pub motion_buffered: usize,
    pub sound_buffered: usize,
    pub motion_evicted: u64,
    pub sound_evicted: u64,
    pub rejected: u64,
    pub epoch: u64,
}
