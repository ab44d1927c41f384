//! Optional raw sample recording for offline analysis
//!
//! The detector only keeps a short lookback window per stream. When full
//! raw streams are wanted, a [`RawSampleSink`] can be plugged into the
//! detector. [`SampleRecorder`] is the provided sink: it hands samples to a
//! writer thread over a lock-free ring buffer so the ingestion path never
//! touches the disk.
//!
//! ## File Format
//!
//! Each record is 17 bytes: `[u8 kind][u64_le timestamp_ms][f64_le value]`
//!
//! Files are named `raw_YYYYMMDD_HHMMSS_NNN.bin`, rotated every 10 minutes
//! with 1-hour retention by default.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;

use super::sample::{AcousticSample, MotionSample, SensorKind, SensorSample, Timestamped};

/// Size of one encoded record in bytes
pub const RECORD_SIZE: usize = 17;

/// Default hand-off queue capacity (about 2 seconds of 48kHz audio)
const DEFAULT_QUEUE_CAPACITY: usize = 1 << 17;

/// Errors raised by the raw recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("recorder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt recording: record {index} has unknown kind tag {tag}")]
    UnknownKind { index: usize, tag: u8 },

    #[error("corrupt recording: {0} trailing bytes")]
    Trailing(usize),
}

/// Receiver of every sample the detector accepts
///
/// Called with the detector lock held, so implementations must not block.
pub trait RawSampleSink: Send {
    fn record(&mut self, sample: &SensorSample);
}

/// Encode one sample into its on-disk form
pub fn encode_record(sample: &SensorSample) -> [u8; RECORD_SIZE] {
    let mut out = [0u8; RECORD_SIZE];
    out[0] = sample.kind().tag();
    out[1..9].copy_from_slice(&sample.timestamp().to_le_bytes());
    out[9..17].copy_from_slice(&sample.value().to_le_bytes());
    out
}

/// Decode a byte slice of concatenated records
pub fn decode_records(bytes: &[u8]) -> Result<Vec<SensorSample>, RecorderError> {
    let chunks = bytes.chunks_exact(RECORD_SIZE);
    let trailing = chunks.remainder().len();
    if trailing != 0 {
        return Err(RecorderError::Trailing(trailing));
    }

    chunks
        .enumerate()
        .map(|(index, chunk)| {
            let mut ts = [0u8; 8];
            ts.copy_from_slice(&chunk[1..9]);
            let mut value = [0u8; 8];
            value.copy_from_slice(&chunk[9..17]);
            let timestamp = u64::from_le_bytes(ts);
            let value = f64::from_le_bytes(value);

            match SensorKind::from_tag(chunk[0]) {
                Some(SensorKind::Motion) => Ok(MotionSample::new(timestamp, value).into()),
                Some(SensorKind::Sound) => Ok(AcousticSample::new(timestamp, value).into()),
                None => Err(RecorderError::UnknownKind {
                    index,
                    tag: chunk[0],
                }),
            }
        })
        .collect()
}

/// Read back every record of one recording file
pub fn read_recording(path: &Path) -> Result<Vec<SensorSample>, RecorderError> {
    let bytes = fs::read(path)?;
    decode_records(&bytes)
}

/// Sink half of a running recorder, installed into the detector
pub struct RecorderSink {
    producer: HeapProd<SensorSample>,
    dropped: Arc<AtomicU64>,
}

impl RawSampleSink for RecorderSink {
    fn record(&mut self, sample: &SensorSample) {
        if self.producer.try_push(*sample).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Handle returned by [`SampleRecorder::start`] to stop recording
pub struct RecorderHandle {
    stop_flag: Arc<AtomicBool>,
    /// Total records written, updated by the writer thread
    records_written: Arc<AtomicU64>,
    /// Samples lost because the hand-off queue was full
    dropped: Arc<AtomicU64>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl RecorderHandle {
    /// Stop the writer thread after it drains the queue, and wait for it
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }

    /// Check if the writer thread is still alive
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Raw sample recorder writing rotating binary files
pub struct SampleRecorder {
    dir: PathBuf,
    retention: Duration,
    file_duration: Duration,
    queue_capacity: usize,
}

impl SampleRecorder {
    /// Create a new recorder writing to the given directory
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            retention: Duration::from_secs(3600),    // 1 hour
            file_duration: Duration::from_secs(600), // 10 minutes
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_file_duration(mut self, file_duration: Duration) -> Self {
        self.file_duration = file_duration;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Create the directory and spawn the writer thread
    ///
    /// Returns the sink to install into the detector and the handle that
    /// stops the writer.
    pub fn start(self) -> Result<(RecorderSink, RecorderHandle), RecorderError> {
        fs::create_dir_all(&self.dir)?;

        let (producer, consumer) = HeapRb::<SensorSample>::new(self.queue_capacity).split();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&stop_flag);
        let records_written = Arc::new(AtomicU64::new(0));
        let records_clone = Arc::clone(&records_written);
        let dropped = Arc::new(AtomicU64::new(0));

        let thread = std::thread::Builder::new()
            .name("sample-recorder".into())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    self.recording_loop(consumer, flag_clone, records_clone);
                }));
                match result {
                    Ok(()) => tracing::info!("Sample recorder thread exited normally"),
                    Err(panic_info) => {
                        let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        tracing::error!(panic = %msg, "Sample recorder thread PANICKED");
                    }
                }
            })?;

        let sink = RecorderSink {
            producer,
            dropped: Arc::clone(&dropped),
        };
        let handle = RecorderHandle {
            stop_flag,
            records_written,
            dropped,
            thread: Some(thread),
        };
        Ok((sink, handle))
    }

    fn recording_loop(
        &self,
        mut consumer: HeapCons<SensorSample>,
        stop_flag: Arc<AtomicBool>,
        records_written: Arc<AtomicU64>,
    ) {
        tracing::info!(dir = %self.dir.display(), "Sample recorder thread running");

        let mut chunk = vec![SensorSample::Sound(AcousticSample::new(0, 0.0)); 4096];
        let mut sequence: u32 = 0;
        let mut writer = self.open_file(sequence);
        let mut file_opened_at = Instant::now();
        let mut total: u64 = 0;

        loop {
            // Read the flag before draining so nothing pushed before stop() is lost
            let stopping = stop_flag.load(Ordering::Acquire);

            while consumer.occupied_len() > 0 {
                let read = consumer.pop_slice(&mut chunk);
                let Some(w) = writer.as_mut() else {
                    tracing::warn!(lost = read, "No raw file open, samples discarded");
                    continue;
                };
                for sample in &chunk[..read] {
                    if let Err(e) = w.write_all(&encode_record(sample)) {
                        tracing::error!(error = %e, "Failed to write raw record");
                        break;
                    }
                    total += 1;
                }
            }
            records_written.store(total, Ordering::Relaxed);

            if stopping {
                break;
            }

            if file_opened_at.elapsed() >= self.file_duration {
                tracing::info!(records = total, "Rotating raw recording file");
                if let Some(mut w) = writer.take() {
                    if let Err(e) = w.flush() {
                        tracing::error!(error = %e, "Failed to flush raw file on rotation");
                    }
                }
                sequence += 1;
                writer = self.open_file(sequence);
                file_opened_at = Instant::now();
                self.cleanup_old_files();
            }

            std::thread::sleep(Duration::from_millis(10));
        }

        if let Some(mut w) = writer.take() {
            let _ = w.flush();
        }

        tracing::info!(records = total, "Sample recorder stopped");
    }

    fn open_file(&self, sequence: u32) -> Option<BufWriter<File>> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .dir
            .join(format!("raw_{}_{:03}.bin", timestamp, sequence));

        match File::create(&path) {
            Ok(f) => {
                tracing::debug!(path = %path.display(), "Opened raw recording file");
                Some(BufWriter::with_capacity(8192, f))
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to create raw recording file");
                None
            }
        }
    }

    fn cleanup_old_files(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        let now = SystemTime::now();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().map(|e| e == "bin").unwrap_or(false) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());

            if let Some(age) = age.filter(|age| *age > self.retention) {
                match fs::remove_file(&path) {
                    Ok(()) => tracing::debug!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "Removed old raw recording"
                    ),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove old raw recording"
                    ),
                }
            }
        }
    }
}
