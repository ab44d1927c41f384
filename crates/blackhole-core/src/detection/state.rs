//! Detection states, the transition table, and the records the detector emits

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sensor::sample::{SensorKind, Timestamp};

/// Phase of the detection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    /// Not running; samples are buffered only
    Idle,
    /// Waiting for a motion trigger
    Armed,
    /// Trigger recorded (transient)
    Triggered,
    /// Waiting for the first acoustic crossing
    AwaitingFirstCrossing,
    /// Waiting for the second acoustic crossing
    AwaitingSecondCrossing,
    /// Quiet period after a completed cycle
    Cooldown,
}

impl DetectionState {
    pub const ALL: [DetectionState; 6] = [
        DetectionState::Idle,
        DetectionState::Armed,
        DetectionState::Triggered,
        DetectionState::AwaitingFirstCrossing,
        DetectionState::AwaitingSecondCrossing,
        DetectionState::Cooldown,
    ];

    /// True once `start()` was called and `stop()` was not
    pub fn is_running(self) -> bool {
        self != DetectionState::Idle
    }

    /// True while a trigger is being tracked towards an event
    pub fn in_cycle(self) -> bool {
        matches!(
            self,
            DetectionState::Triggered
                | DetectionState::AwaitingFirstCrossing
                | DetectionState::AwaitingSecondCrossing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionState::Idle => "IDLE",
            DetectionState::Armed => "ARMED",
            DetectionState::Triggered => "TRIGGERED",
            DetectionState::AwaitingFirstCrossing => "AWAITING_FIRST_CROSSING",
            DetectionState::AwaitingSecondCrossing => "AWAITING_SECOND_CROSSING",
            DetectionState::Cooldown => "COOLDOWN",
        }
    }
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified input driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputClass {
    Start,
    Stop,
    /// Motion magnitude above the trigger threshold
    MotionAboveThreshold,
    /// Internal step out of a transient state
    Advance,
    /// Acoustic sample crossing the first threshold
    FirstCrossing,
    /// Acoustic sample crossing the second threshold after the dwell
    SecondCrossing,
    CooldownElapsed,
    CrossingTimeout,
    /// A sample that matches nothing above
    Ordinary,
    /// A sample rejected at the ingestion boundary
    Anomaly,
}

impl InputClass {
    pub const ALL: [InputClass; 10] = [
        InputClass::Start,
        InputClass::Stop,
        InputClass::MotionAboveThreshold,
        InputClass::Advance,
        InputClass::FirstCrossing,
        InputClass::SecondCrossing,
        InputClass::CooldownElapsed,
        InputClass::CrossingTimeout,
        InputClass::Ordinary,
        InputClass::Anomaly,
    ];
}

/// The transition table
///
/// Total over every (state, input) pair. Pairs with no listed transition
/// keep the current state.
pub fn transition(state: DetectionState, input: InputClass) -> DetectionState {
    use DetectionState::*;
    use InputClass::*;

    match (state, input) {
        (_, Stop) => Idle,
        (Idle, Start) => Armed,
        (Armed, MotionAboveThreshold) => Triggered,
        (Triggered, Advance) => AwaitingFirstCrossing,
        (AwaitingFirstCrossing, FirstCrossing) => AwaitingSecondCrossing,
        (AwaitingSecondCrossing, SecondCrossing) => Cooldown,
        (AwaitingFirstCrossing | AwaitingSecondCrossing, CrossingTimeout) => Armed,
        (Cooldown, CooldownElapsed) => Armed,
        (current, _) => current,
    }
}

/// Why a sample was rejected at the ingestion boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RejectReason {
    /// Timestamp older than the newest accepted sample of the same stream
    OutOfOrder {
        stream: SensorKind,
        newest: Timestamp,
    },
    /// NaN or infinite amplitude / magnitude
    NonFinite { stream: SensorKind },
}

/// What caused a flag change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    Started,
    Stopped,
    Triggered,
    Tracking,
    FirstCrossing,
    SecondCrossing,
    CooldownElapsed,
    TimedOut,
    RejectedSample(RejectReason),
}

/// One diagnostic record of a state change
///
/// Rejected samples are logged with `from == to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagChangeLogEntry {
    /// Timestamp of the sample (or clock) that caused the change
    pub timestamp: Timestamp,
    pub from: DetectionState,
    pub to: DetectionState,
    pub cause: TransitionCause,
}

/// One completed detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Motion trigger timestamp
    pub tr_time: Timestamp,
    /// First acoustic crossing timestamp
    pub ts1_time: Timestamp,
    /// Second acoustic crossing timestamp
    pub ts2_time: Timestamp,
    /// Lookback history was evicted before the cycle could inspect it
    pub partial: bool,
}

impl EventRecord {
    /// Time between the two crossings in milliseconds
    pub fn delta_ms(&self) -> u64 {
        self.ts2_time.saturating_sub(self.ts1_time)
    }

    /// Time between the two crossings in seconds
    pub fn delta_seconds(&self) -> f64 {
        self.delta_ms() as f64 * 0.001
    }
}
