//! Two-stream event detector
//!
//! Correlates a motion stream with an acoustic stream. A motion magnitude
//! above the trigger threshold starts a cycle; the cycle completes when the
//! acoustic amplitude crosses the first threshold and then, after a minimum
//! dwell, the second threshold. Each completed cycle becomes an
//! [`EventRecord`]; every state change is appended to a flag-change log.
//!
//! ## Concurrency
//!
//! All mutable state sits behind one mutex. Motion and acoustic samples
//! delivered from different threads are applied atomically in some total
//! order, and readers always see a consistent snapshot. No operation
//! blocks beyond taking that lock: notifications use `try_send` and the raw
//! sink contract forbids blocking.
//!
//! ## Timing
//!
//! The detector has no clock of its own. Timeouts and cooldown are
//! evaluated against the newest accepted sample timestamp of either
//! stream, or against [`EventDetector::tick`]. The lookback replay after a
//! late trigger is held to the same timeout. A trigger timestamped before
//! the end of the previous cycle's cooldown (or before a timed-out cycle's
//! deadline) is ignored, however late it arrives.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::config::{DetectorConfig, DetectorConfigError};
use super::log::{DetectorDelta, DetectorNotification, DetectorSnapshot, LogCursor};
use super::state::{
    transition, DetectionState, EventRecord, FlagChangeLogEntry, InputClass, RejectReason,
    TransitionCause,
};
use crate::sensor::buffer::{Lookback, SampleBuffer};
use crate::sensor::recorder::RawSampleSink;
use crate::sensor::sample::{
    AcousticSample, MotionSample, SensorKind, SensorSample, Timestamp, Timestamped,
};

/// Default capacity of a subscriber channel
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Progress of the cycle currently being tracked
#[derive(Debug, Clone, Copy)]
struct Cycle {
    tr_time: Timestamp,
    ts1_time: Option<Timestamp>,
    /// Start of the current awaiting phase, for the crossing timeout
    phase_since: Timestamp,
    partial: bool,
}

struct Inner {
    config: DetectorConfig,
    state: DetectionState,
    motion: SampleBuffer<MotionSample>,
    sound: SampleBuffer<AcousticSample>,
    flag_log: Vec<FlagChangeLogEntry>,
    events: Vec<EventRecord>,
    cycle: Option<Cycle>,
    cooldown_since: Option<Timestamp>,
    /// Earliest trigger timestamp not covered by the previous cycle
    rearm_at: Option<Timestamp>,
    /// Newest accepted timestamp of either stream (or tick)
    clock: Timestamp,
    epoch: u64,
    rejected: u64,
    subscribers: Vec<Sender<DetectorNotification>>,
    raw_sink: Option<Box<dyn RawSampleSink>>,
}

/// Streaming event detector
///
/// Constructed explicitly and shared by reference (typically in an `Arc`)
/// between the sensor adapters and the measurement session.
///
/// # Example
/// ```
/// use blackhole_core::detection::config::DetectorConfig;
/// use blackhole_core::detection::detector::EventDetector;
/// use blackhole_core::sensor::sample::{AcousticSample, MotionSample};
///
/// let detector = EventDetector::new(DetectorConfig::default()).unwrap();
/// detector.start();
///
/// detector.input_motion(MotionSample::new(0, 1.0));
/// detector.input_motion(MotionSample::new(10, 2.5));
/// for (t, a) in [(15, 0.1), (20, 0.6), (60, 0.2), (120, 0.4)] {
///     detector.input_sound(AcousticSample::new(t, a));
/// }
///
/// let events = detector.event_data_list();
/// assert_eq!(events.len(), 1);
/// assert_eq!((events[0].tr_time, events[0].ts1_time, events[0].ts2_time), (10, 20, 120));
/// ```
pub struct EventDetector {
    inner: Mutex<Inner>,
}

impl EventDetector {
    /// Create an idle detector with the given parameters
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorConfigError> {
        config.validate()?;
        let capacity = config.buffer_capacity;
        Ok(Self {
            inner: Mutex::new(Inner {
                config,
                state: DetectionState::Idle,
                motion: SampleBuffer::new(capacity),
                sound: SampleBuffer::new(capacity),
                flag_log: Vec::new(),
                events: Vec::new(),
                cycle: None,
                cooldown_since: None,
                rearm_at: None,
                clock: 0,
                epoch: 0,
                rejected: 0,
                subscribers: Vec::new(),
                raw_sink: None,
            }),
        })
    }

    /// A panic while holding the lock leaves the state consistent between
    /// transitions, so a poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the detector. No effect unless idle.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.state != DetectionState::Idle {
            tracing::debug!(state = %inner.state, "start_ignored_already_running");
            return;
        }
        inner.cycle = None;
        inner.cooldown_since = None;
        let now = inner.clock;
        inner.apply(InputClass::Start, now, TransitionCause::Started);
    }

    /// Return to idle from any state, abandoning an in-flight cycle
    ///
    /// Buffers and logs are kept for inspection.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.state == DetectionState::Idle {
            return;
        }
        if inner.cycle.take().is_some() {
            tracing::info!(state = %inner.state, "cycle_abandoned_by_stop");
        }
        inner.cooldown_since = None;
        let now = inner.clock;
        inner.apply(InputClass::Stop, now, TransitionCause::Stopped);
    }

    /// Clear buffers, logs, the clock and any cycle, and return to idle
    ///
    /// Cursors notice the reset through the log epoch.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = DetectionState::Idle;
        inner.motion.clear();
        inner.sound.clear();
        inner.flag_log.clear();
        inner.events.clear();
        inner.cycle = None;
        inner.cooldown_since = None;
        inner.rearm_at = None;
        inner.clock = 0;
        inner.rejected = 0;
        inner.epoch += 1;
        inner.notify(DetectorNotification::Reset);
        tracing::info!(epoch = inner.epoch, "detector_reset");
    }

    /// Replace the parameters; only allowed while idle
    ///
    /// Buffers are rebuilt with the new capacity.
    pub fn reconfigure(&self, config: DetectorConfig) -> Result<(), DetectorConfigError> {
        config.validate()?;
        let mut inner = self.lock();
        if inner.state != DetectionState::Idle {
            return Err(DetectorConfigError::Running);
        }
        if config.buffer_capacity != inner.config.buffer_capacity {
            inner.motion = SampleBuffer::new(config.buffer_capacity);
            inner.sound = SampleBuffer::new(config.buffer_capacity);
        }
        inner.config = config;
        Ok(())
    }

    /// Ingest one motion sample
    pub fn input_motion(&self, sample: MotionSample) {
        self.lock().ingest_motion(sample);
    }

    /// Ingest one acoustic sample
    pub fn input_sound(&self, sample: AcousticSample) {
        self.lock().ingest_sound(sample);
    }

    /// Ingest a sample from either stream
    pub fn input(&self, sample: SensorSample) {
        match sample {
            SensorSample::Motion(m) => self.input_motion(m),
            SensorSample::Sound(s) => self.input_sound(s),
        }
    }

    /// Advance the detector clock without a sample
    ///
    /// Lets an orchestrator expire timeouts and cooldown when both sources
    /// are silent. Timestamps older than the clock are ignored.
    pub fn tick(&self, now: Timestamp) {
        let mut inner = self.lock();
        if now < inner.clock {
            return;
        }
        inner.clock = now;
        inner.advance_clock(now);
    }

    /// Current state
    pub fn state(&self) -> DetectionState {
        self.lock().state
    }

    /// Newest timestamp the detector has seen
    pub fn clock(&self) -> Timestamp {
        self.lock().clock
    }

    /// Parameters in use
    pub fn config(&self) -> DetectorConfig {
        self.lock().config.clone()
    }

    /// All state changes of this session, oldest first
    pub fn flag_change_log(&self) -> Vec<FlagChangeLogEntry> {
        self.lock().flag_log.clone()
    }

    /// All completed cycles of this session, oldest first
    pub fn event_data_list(&self) -> Vec<EventRecord> {
        self.lock().events.clone()
    }

    /// Number of samples rejected at the ingestion boundary
    pub fn rejected_count(&self) -> u64 {
        self.lock().rejected
    }

    /// Buffered motion samples at or after `since`
    pub fn motion_since(&self, since: Timestamp) -> Lookback<MotionSample> {
        self.lock().motion.samples_since(since)
    }

    /// Buffered acoustic samples at or after `since`
    pub fn sound_since(&self, since: Timestamp) -> Lookback<AcousticSample> {
        self.lock().sound.samples_since(since)
    }

    /// State, logs and buffer statistics from a single lock acquisition
    pub fn snapshot(&self) -> DetectorSnapshot {
        let inner = self.lock();
        DetectorSnapshot {
            state: inner.state,
            flag_changes: inner.flag_log.clone(),
            events: inner.events.clone(),
            motion_buffered: inner.motion.len(),
            sound_buffered: inner.sound.len(),
            motion_evicted: inner.motion.evicted(),
            sound_evicted: inner.sound.evicted(),
            rejected: inner.rejected,
            epoch: inner.epoch,
        }
    }

    /// Entries appended since `cursor` last polled; advances the cursor
    pub fn poll_since(&self, cursor: &mut LogCursor) -> DetectorDelta {
        let inner = self.lock();
        let reset = cursor.epoch != inner.epoch;
        if reset {
            *cursor = LogCursor {
                epoch: inner.epoch,
                ..LogCursor::default()
            };
        }

        // Offsets past the end cannot happen within one epoch, clamp anyway
        let flag_start = cursor.flag_offset.min(inner.flag_log.len());
        let event_start = cursor.event_offset.min(inner.events.len());
        let delta = DetectorDelta {
            reset,
            state: inner.state,
            flag_changes: inner.flag_log[flag_start..].to_vec(),
            events: inner.events[event_start..].to_vec(),
        };
        cursor.flag_offset = inner.flag_log.len();
        cursor.event_offset = inner.events.len();
        delta
    }

    /// Subscribe to log appends with the default channel capacity
    pub fn subscribe(&self) -> Receiver<DetectorNotification> {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Subscribe to log appends
    ///
    /// A subscriber that falls behind loses notifications rather than
    /// stalling ingestion; it can resynchronise with [`Self::poll_since`].
    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<DetectorNotification> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.lock().subscribers.push(tx);
        rx
    }

    /// Install a sink that receives every accepted sample
    ///
    /// Returns the previously installed sink.
    pub fn set_raw_sink(&self, sink: Box<dyn RawSampleSink>) -> Option<Box<dyn RawSampleSink>> {
        self.lock().raw_sink.replace(sink)
    }

    /// Remove the raw sink
    pub fn clear_raw_sink(&self) -> Option<Box<dyn RawSampleSink>> {
        self.lock().raw_sink.take()
    }
}

impl Inner {
    fn ingest_motion(&mut self, sample: MotionSample) {
        let newest = self.motion.latest().map(|s| s.timestamp);
        if let Some(reason) = check_sample(SensorKind::Motion, &sample, sample.magnitude, newest) {
            self.reject(sample.timestamp, reason);
            return;
        }

        self.accept(sample.into());
        self.motion.push(sample);
        self.advance_clock(sample.timestamp);

        let fires = self.state == DetectionState::Armed
            && sample.magnitude > self.config.trigger_threshold;
        if fires && self.covered_by_last_cycle(sample.timestamp) {
            tracing::debug!(
                timestamp = sample.timestamp,
                rearm_at = ?self.rearm_at,
                "late_trigger_ignored"
            );
        } else if fires {
            self.trigger(sample);
        } else {
            tracing::trace!(
                timestamp = sample.timestamp,
                magnitude = sample.magnitude,
                state = %self.state,
                "motion_buffered"
            );
        }
    }

    fn ingest_sound(&mut self, sample: AcousticSample) {
        let prev = self.sound.latest().copied();
        if let Some(reason) = check_sample(
            SensorKind::Sound,
            &sample,
            sample.amplitude,
            prev.map(|s| s.timestamp),
        ) {
            self.reject(sample.timestamp, reason);
            return;
        }

        self.accept(sample.into());
        self.sound.push(sample);
        self.advance_clock(sample.timestamp);
        self.evaluate_sound(sample, prev.map(|s| s.amplitude));
    }

    /// Bookkeeping shared by both streams for an accepted sample
    fn accept(&mut self, sample: SensorSample) {
        self.clock = self.clock.max(sample.timestamp());
        if let Some(sink) = self.raw_sink.as_mut() {
            sink.record(&sample);
        }
    }

    fn reject(&mut self, timestamp: Timestamp, reason: RejectReason) {
        self.rejected += 1;
        tracing::warn!(timestamp, ?reason, state = %self.state, "sample_rejected");
        // Logged as a no-op transition for visibility
        let state = transition(self.state, InputClass::Anomaly);
        self.log(FlagChangeLogEntry {
            timestamp,
            from: self.state,
            to: state,
            cause: TransitionCause::RejectedSample(reason),
        });
    }

    /// A trigger this old would replay sound the previous cycle already used
    fn covered_by_last_cycle(&self, timestamp: Timestamp) -> bool {
        self.rearm_at.is_some_and(|rearm_at| timestamp < rearm_at)
    }

    /// Expire cooldown and crossing timeouts up to `now`
    fn advance_clock(&mut self, now: Timestamp) {
        match self.state {
            DetectionState::Cooldown => {
                let since = self.cooldown_since.unwrap_or(now);
                if now.saturating_sub(since) >= self.config.cooldown_ms {
                    self.cooldown_since = None;
                    self.apply(
                        InputClass::CooldownElapsed,
                        now,
                        TransitionCause::CooldownElapsed,
                    );
                }
            }
            DetectionState::AwaitingFirstCrossing | DetectionState::AwaitingSecondCrossing => {
                let Some(cycle) = self.cycle else {
                    return;
                };
                let waited = now.saturating_sub(cycle.phase_since);
                if waited > self.config.crossing_timeout_ms {
                    tracing::warn!(
                        tr_time = cycle.tr_time,
                        ts1_time = ?cycle.ts1_time,
                        waited_ms = waited,
                        state = %self.state,
                        "cycle_timed_out"
                    );
                    self.cycle = None;
                    // Sound up to the deadline belonged to the abandoned cycle
                    self.rearm_at = Some(
                        cycle
                            .phase_since
                            .saturating_add(self.config.crossing_timeout_ms)
                            .saturating_add(1),
                    );
                    self.apply(InputClass::CrossingTimeout, now, TransitionCause::TimedOut);
                }
            }
            _ => {}
        }
    }

    fn trigger(&mut self, sample: MotionSample) {
        let tr_time = sample.timestamp;
        tracing::debug!(tr_time, magnitude = sample.magnitude, "motion_trigger");

        self.apply(
            InputClass::MotionAboveThreshold,
            tr_time,
            TransitionCause::Triggered,
        );
        self.cycle = Some(Cycle {
            tr_time,
            ts1_time: None,
            phase_since: tr_time,
            partial: false,
        });
        self.apply(InputClass::Advance, tr_time, TransitionCause::Tracking);

        // Sound delivered ahead of its trigger still belongs to this cycle
        let lookback = self.sound.samples_since(tr_time);
        if lookback.truncated {
            tracing::warn!(
                tr_time,
                evicted = self.sound.evicted(),
                "lookback_truncated"
            );
            if let Some(cycle) = self.cycle.as_mut() {
                cycle.partial = true;
            }
        }

        let mut prev = self.sound.last_before(tr_time).map(|s| s.amplitude);
        for s in lookback.samples {
            if !self.state.in_cycle() {
                break;
            }
            self.advance_clock(s.timestamp);
            if !self.state.in_cycle() {
                break;
            }
            self.evaluate_sound(s, prev);
            prev = Some(s.amplitude);
        }
    }

    /// Run the crossing logic for one acoustic sample
    fn evaluate_sound(&mut self, sample: AcousticSample, prev: Option<f64>) {
        let Some(mut cycle) = self.cycle else {
            return;
        };
        let ts = sample.timestamp;

        match self.state {
            DetectionState::AwaitingFirstCrossing => {
                // Sound older than the trigger cannot belong to this cycle
                if ts < cycle.tr_time {
                    return;
                }
                if self.config.first_direction.crossed(
                    self.config.first_threshold,
                    prev,
                    sample.amplitude,
                ) {
                    cycle.ts1_time = Some(ts);
                    cycle.phase_since = ts;
                    self.cycle = Some(cycle);
                    tracing::debug!(
                        tr_time = cycle.tr_time,
                        ts1_time = ts,
                        amplitude = sample.amplitude,
                        "first_crossing"
                    );
                    self.apply(InputClass::FirstCrossing, ts, TransitionCause::FirstCrossing);
                }
            }
            DetectionState::AwaitingSecondCrossing => {
                let Some(ts1_time) = cycle.ts1_time else {
                    return;
                };
                if !self.config.second_direction.crossed(
                    self.config.second_threshold,
                    prev,
                    sample.amplitude,
                ) {
                    return;
                }
                let dwell = ts.saturating_sub(ts1_time);
                if ts < ts1_time || dwell < self.config.min_dwell_ms {
                    tracing::trace!(
                        ts1_time,
                        timestamp = ts,
                        dwell_ms = dwell,
                        "crossing_within_dwell"
                    );
                    return;
                }
                self.complete(cycle, ts1_time, ts);
            }
            _ => {}
        }
    }

    fn complete(&mut self, cycle: Cycle, ts1_time: Timestamp, ts2_time: Timestamp) {
        let record = EventRecord {
            tr_time: cycle.tr_time,
            ts1_time,
            ts2_time,
            partial: cycle.partial,
        };
        tracing::info!(
            tr_time = record.tr_time,
            ts1_time = record.ts1_time,
            ts2_time = record.ts2_time,
            delta_ms = record.delta_ms(),
            partial = record.partial,
            "event_detected"
        );

        self.cycle = None;
        self.events.push(record);
        self.notify(DetectorNotification::Event(record));
        self.cooldown_since = Some(ts2_time);
        self.rearm_at = Some(ts2_time.saturating_add(self.config.cooldown_ms));
        self.apply(
            InputClass::SecondCrossing,
            ts2_time,
            TransitionCause::SecondCrossing,
        );
    }

    /// Run the transition table and log the change, if any
    fn apply(&mut self, input: InputClass, timestamp: Timestamp, cause: TransitionCause) -> bool {
        let from = self.state;
        let to = transition(from, input);
        if to == from {
            return false;
        }
        self.state = to;
        tracing::debug!(timestamp, from = %from, to = %to, ?cause, "detector_transition");
        self.log(FlagChangeLogEntry {
            timestamp,
            from,
            to,
            cause,
        });
        true
    }

    fn log(&mut self, entry: FlagChangeLogEntry) {
        self.flag_log.push(entry);
        self.notify(DetectorNotification::FlagChange(entry));
    }

    fn notify(&mut self, notification: DetectorNotification) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers
            .retain(|tx| match tx.try_send(notification.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("subscriber_lagging_notification_dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

/// Classify a sample as acceptable or not
fn check_sample<T: Timestamped>(
    stream: SensorKind,
    sample: &T,
    value: f64,
    newest: Option<Timestamp>,
) -> Option<RejectReason> {
    if !value.is_finite() {
        return Some(RejectReason::NonFinite { stream });
    }
    match newest {
        Some(newest) if sample.timestamp() < newest => {
            Some(RejectReason::OutOfOrder { stream, newest })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_config() -> DetectorConfig {
        DetectorConfig {
            trigger_threshold: 2.0,
            first_threshold: 0.5,
            second_threshold: 0.3,
            min_dwell_ms: 50,
            cooldown_ms: 200,
            crossing_timeout_ms: 1000,
            buffer_capacity: 1024,
            ..Default::default()
        }
    }

    fn armed() -> EventDetector {
        let detector = EventDetector::new(scenario_config()).unwrap();
        detector.start();
        detector
    }

    fn feed_sound(detector: &EventDetector, samples: &[(Timestamp, f64)]) {
        for &(t, a) in samples {
            detector.input_sound(AcousticSample::new(t, a));
        }
    }

    #[test]
    fn test_new_detector_is_idle() {
        let detector = EventDetector::new(DetectorConfig::default()).unwrap();
        assert_eq!(detector.state(), DetectionState::Idle);
        assert!(detector.flag_change_log().is_empty());
        assert!(detector.event_data_list().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DetectorConfig {
            min_dwell_ms: 0,
            ..Default::default()
        };
        assert!(EventDetector::new(config).is_err());
    }

    #[test]
    fn test_start_arms_and_logs() {
        let detector = armed();
        assert_eq!(detector.state(), DetectionState::Armed);
        let log = detector.flag_change_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].from, DetectionState::Idle);
        assert_eq!(log[0].to, DetectionState::Armed);
        assert_eq!(log[0].cause, TransitionCause::Started);

        // Second start is a no-op
        detector.start();
        assert_eq!(detector.flag_change_log().len(), 1);
    }

    #[test]
    fn test_trigger_passes_through_triggered() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);

        let log = detector.flag_change_log();
        let path: Vec<_> = log.iter().map(|e| (e.from, e.to)).collect();
        assert_eq!(
            path[1..],
            [
                (DetectionState::Armed, DetectionState::Triggered),
                (
                    DetectionState::Triggered,
                    DetectionState::AwaitingFirstCrossing
                ),
            ]
        );
        assert!(log[1..].iter().all(|e| e.timestamp == 10));
    }

    #[test]
    fn test_threshold_must_be_exceeded() {
        let detector = armed();
        detector.input_motion(MotionSample::new(0, 2.0));
        assert_eq!(detector.state(), DetectionState::Armed);
    }

    #[test]
    fn test_idle_detector_buffers_but_never_triggers() {
        let detector = EventDetector::new(scenario_config()).unwrap();
        detector.input_motion(MotionSample::new(0, 10.0));
        assert_eq!(detector.state(), DetectionState::Idle);
        assert_eq!(detector.motion_since(0).samples.len(), 1);
    }

    #[test]
    fn test_no_retrigger_mid_cycle() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        detector.input_motion(MotionSample::new(20, 9.0));
        detector.input_motion(MotionSample::new(30, 9.0));

        let triggers = detector
            .flag_change_log()
            .iter()
            .filter(|e| e.cause == TransitionCause::Triggered)
            .count();
        assert_eq!(triggers, 1);
    }

    #[test]
    fn test_full_cycle_and_cooldown() {
        let detector = armed();
        detector.input_motion(MotionSample::new(0, 1.0));
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(15, 0.1), (20, 0.6), (60, 0.2), (120, 0.4)]);

        assert_eq!(
            detector.event_data_list(),
            vec![EventRecord {
                tr_time: 10,
                ts1_time: 20,
                ts2_time: 120,
                partial: false,
            }]
        );
        assert_eq!(detector.state(), DetectionState::Cooldown);

        // Trigger during cooldown is ignored
        detector.input_motion(MotionSample::new(200, 5.0));
        assert_eq!(detector.state(), DetectionState::Cooldown);

        // Cooldown of 200ms from ts2=120 ends at 320
        detector.input_motion(MotionSample::new(320, 0.5));
        assert_eq!(detector.state(), DetectionState::Armed);
    }

    #[test]
    fn test_cooldown_expiry_sample_can_trigger() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(20, 0.6), (60, 0.2), (120, 0.4)]);
        detector.input_motion(MotionSample::new(400, 3.0));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);
    }

    #[test]
    fn test_dwell_rejects_ringing() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(15, 0.1), (20, 0.6), (30, 0.2), (40, 0.4)]);

        assert!(detector.event_data_list().is_empty());
        assert_eq!(detector.state(), DetectionState::AwaitingSecondCrossing);

        // A later qualifying crossing still completes the cycle
        feed_sound(&detector, &[(80, 0.1), (90, 0.5)]);
        let events = detector.event_data_list();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ts2_time, 90);
    }

    #[test]
    fn test_sound_before_trigger_is_ignored() {
        let detector = armed();
        feed_sound(&detector, &[(5, 0.1), (8, 0.9)]);
        detector.input_motion(MotionSample::new(10, 2.5));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);
    }

    #[test]
    fn test_lookback_absorbs_late_trigger() {
        let detector = armed();
        // Acoustic samples arrive before the motion sample that precedes them
        feed_sound(&detector, &[(9, 0.0), (20, 0.6), (60, 0.1)]);
        detector.input_motion(MotionSample::new(10, 2.5));
        assert_eq!(detector.state(), DetectionState::AwaitingSecondCrossing);

        feed_sound(&detector, &[(120, 0.4)]);
        let events = detector.event_data_list();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].tr_time, events[0].ts1_time), (10, 20));
        assert!(!events[0].partial);
    }

    #[test]
    fn test_evicted_lookback_marks_partial() {
        let config = DetectorConfig {
            buffer_capacity: 2,
            ..scenario_config()
        };
        let detector = EventDetector::new(config).unwrap();
        detector.start();
        // Only the last two survive; 12 was evicted after the trigger time
        feed_sound(&detector, &[(12, 0.0), (20, 0.6), (30, 0.2)]);
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(100, 0.4)]);

        let events = detector.event_data_list();
        assert_eq!(events.len(), 1);
        assert!(events[0].partial);
    }

    #[test]
    fn test_timeout_rearms_without_event() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        // Motion keeps flowing but no sound arrives
        detector.input_motion(MotionSample::new(1010, 0.1));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);
        detector.input_motion(MotionSample::new(1011, 0.1));
        assert_eq!(detector.state(), DetectionState::Armed);
        assert!(detector.event_data_list().is_empty());

        let last = *detector.flag_change_log().last().unwrap();
        assert_eq!(last.cause, TransitionCause::TimedOut);
        assert_eq!(last.from, DetectionState::AwaitingFirstCrossing);
        assert_eq!(last.timestamp, 1011);
    }

    #[test]
    fn test_late_trigger_inside_previous_cycle_is_ignored() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(
            &detector,
            &[(15, 0.1), (20, 0.6), (60, 0.2), (120, 0.4), (200, 0.0), (330, 0.0)],
        );
        // The sound stream already ended the cooldown
        assert_eq!(detector.state(), DetectionState::Armed);

        // A lagging motion sample from the same drop must not reuse its crossings
        detector.input_motion(MotionSample::new(15, 3.0));
        assert_eq!(detector.state(), DetectionState::Armed);
        assert_eq!(detector.event_data_list().len(), 1);

        // Once past the cooldown window triggers work again
        detector.input_motion(MotionSample::new(400, 3.0));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);
    }

    #[test]
    fn test_lookback_replay_honours_timeout() {
        let detector = armed();
        feed_sound(&detector, &[(0, 0.0), (5000, 0.6), (5100, 0.1), (5200, 0.4)]);
        detector.input_motion(MotionSample::new(10, 2.5));

        assert!(detector.event_data_list().is_empty());
        assert_eq!(detector.state(), DetectionState::Armed);
        let last = *detector.flag_change_log().last().unwrap();
        assert_eq!(last.cause, TransitionCause::TimedOut);
        assert_eq!(last.from, DetectionState::AwaitingFirstCrossing);
        assert_eq!(last.timestamp, 5000);

        // A trigger after the abandoned window starts a fresh cycle
        detector.input_motion(MotionSample::new(5300, 2.5));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);
    }

    #[test]
    fn test_trigger_inside_abandoned_window_is_ignored() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        detector.tick(1011);
        assert_eq!(detector.state(), DetectionState::Armed);

        // Still within the 1000ms the timed-out cycle was waiting
        detector.input_motion(MotionSample::new(1010, 2.5));
        assert_eq!(detector.state(), DetectionState::Armed);
        detector.input_motion(MotionSample::new(1011, 2.5));
        assert_eq!(detector.state(), DetectionState::AwaitingFirstCrossing);
    }

    #[test]
    fn test_second_crossing_timeout_counts_from_first_crossing() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(0, 0.0), (500, 0.6)]);
        // 1400 is more than 1000 after the trigger but not after ts1
        detector.tick(1400);
        assert_eq!(detector.state(), DetectionState::AwaitingSecondCrossing);
        detector.tick(1501);
        assert_eq!(detector.state(), DetectionState::Armed);
    }

    #[test]
    fn test_tick_ignores_past() {
        let detector = armed();
        detector.input_motion(MotionSample::new(100, 0.1));
        detector.tick(50);
        assert_eq!(detector.clock(), 100);
    }

    #[test]
    fn test_out_of_order_sample_rejected() {
        let detector = armed();
        detector.input_sound(AcousticSample::new(100, 0.1));
        detector.input_sound(AcousticSample::new(90, 0.9));

        assert_eq!(detector.rejected_count(), 1);
        assert_eq!(detector.sound_since(0).samples.len(), 1);
        let last = *detector.flag_change_log().last().unwrap();
        assert_eq!(last.from, last.to);
        assert_eq!(last.timestamp, 90);
        assert_eq!(
            last.cause,
            TransitionCause::RejectedSample(RejectReason::OutOfOrder {
                stream: SensorKind::Sound,
                newest: 100
            })
        );
    }

    #[test]
    fn test_streams_are_ordered_independently() {
        let detector = armed();
        detector.input_sound(AcousticSample::new(100, 0.1));
        // Older than the newest sound sample, but motion has its own order
        detector.input_motion(MotionSample::new(50, 0.1));
        assert_eq!(detector.rejected_count(), 0);
    }

    #[test]
    fn test_non_finite_sample_rejected() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, f64::NAN));
        detector.input_sound(AcousticSample::new(10, f64::INFINITY));
        assert_eq!(detector.rejected_count(), 2);
        assert_eq!(detector.state(), DetectionState::Armed);
        assert!(detector.motion_since(0).samples.is_empty());
    }

    #[test]
    fn test_stop_keeps_logs_and_buffers() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(20, 0.6), (60, 0.2), (120, 0.4)]);
        detector.input_motion(MotionSample::new(700, 2.5));
        detector.stop();

        assert_eq!(detector.state(), DetectionState::Idle);
        assert_eq!(detector.event_data_list().len(), 1);
        assert_eq!(detector.motion_since(0).samples.len(), 2);
        let last = *detector.flag_change_log().last().unwrap();
        assert_eq!(last.cause, TransitionCause::Stopped);
        assert_eq!(last.from, DetectionState::AwaitingFirstCrossing);

        // Restart re-arms with a clean cycle
        detector.start();
        assert_eq!(detector.state(), DetectionState::Armed);
    }

    #[test]
    fn test_reset_clears_and_bumps_epoch() {
        let detector = armed();
        detector.input_motion(MotionSample::new(10, 2.5));
        let mut cursor = LogCursor::new();
        assert!(!detector.poll_since(&mut cursor).flag_changes.is_empty());

        detector.reset();
        let snapshot = detector.snapshot();
        assert_eq!(snapshot.state, DetectionState::Idle);
        assert!(snapshot.flag_changes.is_empty());
        assert_eq!(snapshot.motion_buffered, 0);
        assert_eq!(snapshot.epoch, 1);

        let delta = detector.poll_since(&mut cursor);
        assert!(delta.reset);
        assert!(delta.flag_changes.is_empty());
    }

    #[test]
    fn test_poll_since_returns_only_new_entries() {
        let detector = armed();
        let mut cursor = LogCursor::new();
        let first = detector.poll_since(&mut cursor);
        assert_eq!(first.flag_changes.len(), 1);
        assert!(!first.reset);

        assert!(detector.poll_since(&mut cursor).is_empty());

        detector.input_motion(MotionSample::new(10, 2.5));
        let second = detector.poll_since(&mut cursor);
        assert_eq!(second.flag_changes.len(), 2);
        assert_eq!(second.state, DetectionState::AwaitingFirstCrossing);
        assert_eq!(cursor.flag_offset(), 3);
    }

    #[test]
    fn test_subscribers_receive_notifications() {
        let detector = EventDetector::new(scenario_config()).unwrap();
        let rx = detector.subscribe();
        detector.start();
        detector.input_motion(MotionSample::new(10, 2.5));
        feed_sound(&detector, &[(20, 0.6), (60, 0.2), (120, 0.4)]);

        let notifications: Vec<_> = rx.try_iter().collect();
        let events = notifications
            .iter()
            .filter(|n| matches!(n, DetectorNotification::Event(_)))
            .count();
        let flags = notifications
            .iter()
            .filter(|n| matches!(n, DetectorNotification::FlagChange(_)))
            .count();
        assert_eq!(events, 1);
        assert_eq!(flags, detector.flag_change_log().len());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let detector = armed();
        drop(detector.subscribe());
        detector.input_motion(MotionSample::new(10, 2.5));
        assert!(detector.lock().subscribers.is_empty());
    }

    #[test]
    fn test_full_subscriber_does_not_block() {
        let detector = armed();
        let rx = detector.subscribe_with_capacity(1);
        for t in 0..50 {
            detector.input_motion(MotionSample::new(t, f64::NAN));
        }
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(detector.rejected_count(), 50);
    }

    #[test]
    fn test_reconfigure_only_when_idle() {
        let detector = armed();
        assert_eq!(
            detector.reconfigure(DetectorConfig::default()),
            Err(DetectorConfigError::Running)
        );
        detector.stop();
        let config = DetectorConfig {
            trigger_threshold: 4.0,
            buffer_capacity: 8,
            ..Default::default()
        };
        detector.reconfigure(config.clone()).unwrap();
        assert_eq!(detector.config(), config);
    }

    struct CollectingSink(std::sync::Arc<Mutex<Vec<SensorSample>>>);

    impl RawSampleSink for CollectingSink {
        fn record(&mut self, sample: &SensorSample) {
            self.0.lock().unwrap().push(*sample);
        }
    }

    #[test]
    fn test_raw_sink_sees_accepted_samples_only() {
        let detector = armed();
        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        assert!(detector
            .set_raw_sink(Box::new(CollectingSink(seen.clone())))
            .is_none());

        detector.input_motion(MotionSample::new(10, 1.0));
        detector.input_sound(AcousticSample::new(11, 0.2));
        detector.input_sound(AcousticSample::new(5, 0.2));

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(detector.clear_raw_sink().is_some());
    }
}
