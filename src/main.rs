//! Blackhole - depth measurement from motion and acoustic samples
//!
//! Replays a newline-delimited JSON sample stream through the detector and
//! prints one line per completed measurement.

use anyhow::{Context, Result};
use blackhole::config::Settings;
use blackhole::detection::detector::EventDetector;
use blackhole::sensor::ingest::read_records;
use blackhole::sensor::recorder::{RecorderHandle, SampleRecorder};
use blackhole::sensor::sample::{Timestamp, Timestamped};
use blackhole::session::{MeasurementResult, MeasurementSession, PollSummary};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Where samples come from
enum Input {
    File(PathBuf),
    Stdin,
}

struct Options {
    config: Option<PathBuf>,
    record: Option<PathBuf>,
    input: Input,
    debug_log: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blackhole=info".parse()?),
        )
        .init();

    let Some(options) = parse_args()? else {
        return Ok(());
    };

    println!("╔════════════════════════════════════════════════════════════╗");
    println!(
        "║          Blackhole v{} - Depth Measurement             ║",
        blackhole::VERSION
    );
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let settings_path = options.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;

    let detector = Arc::new(EventDetector::new(settings.detector.clone())?);
    let mut recorder = match &options.record {
        Some(dir) => Some(attach_recorder(&detector, dir)?),
        None => None,
    };
    let mut session = MeasurementSession::new(Arc::clone(&detector), settings.calibration)?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    println!("Results:");
    println!("────────────────────────────────────────");

    match &options.input {
        Input::File(path) => replay_file(&mut session, &settings, path, &running)?,
        Input::Stdin => follow_stdin(&mut session, &settings, &running)?,
    }

    session.pause();
    print_summary(&session);
    if options.debug_log {
        print_flag_log(&session);
    }

    if let Some(handle) = recorder.as_mut() {
        detector.clear_raw_sink();
        handle.stop();
        println!(
            "Recorded {} samples ({} dropped)",
            handle.records_written(),
            handle.dropped()
        );
    }

    Ok(())
}

/// Parse the command line; `None` means the program has nothing left to do
fn parse_args() -> Result<Option<Options>> {
    let args: Vec<String> = std::env::args().collect();

    let mut config = None;
    let mut record = None;
    let mut follow = false;
    let mut debug_log = false;
    let mut file: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-v" => {
                println!("blackhole {} ({})", blackhole::VERSION, blackhole::BUILD_DATE);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--config" | "-c" => {
                let Some(path) = args.get(i + 1) else {
                    anyhow::bail!("--config requires a path");
                };
                config = Some(PathBuf::from(path));
                i += 2;
                continue;
            }
            "--record" => {
                let Some(dir) = args.get(i + 1) else {
                    anyhow::bail!("--record requires a directory");
                };
                record = Some(PathBuf::from(dir));
                i += 2;
                continue;
            }
            "--follow" | "-" => follow = true,
            "--debug-log" => debug_log = true,
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(None);
            }
            path => {
                if file.is_some() {
                    anyhow::bail!("only one input file can be given");
                }
                file = Some(PathBuf::from(path));
            }
        }
        i += 1;
    }

    let input = match (file, follow) {
        (Some(_), true) => anyhow::bail!("--follow reads stdin and cannot be combined with FILE"),
        (Some(path), false) => Input::File(path),
        (None, _) => Input::Stdin,
    };

    Ok(Some(Options {
        config,
        record,
        input,
        debug_log,
    }))
}

fn print_help() {
    println!("Usage: blackhole [OPTIONS] [FILE]");
    println!();
    println!("Replays newline-delimited JSON motion and sound samples through");
    println!("the detector. Without FILE (or with -), samples are read from stdin.");
    println!();
    println!("Options:");
    println!("  -c, --config PATH   Settings file (default: platform config dir)");
    println!("      --record DIR    Write every accepted sample to raw files in DIR");
    println!("      --follow        Read stdin live, polling on the configured interval");
    println!("      --debug-log     Print the flag-change log on exit");
    println!("  -v, --version       Show version");
    println!("  -h, --help          Show this help");
    println!();
    println!("Sample records:");
    println!(r#"  {{"kind":"motion","timestamp":10,"magnitude":2.5}}"#);
    println!(r#"  {{"kind":"motion","timestamp":12,"x":0.1,"y":2.4,"z":0.0}}"#);
    println!(r#"  {{"kind":"sound","timestamp":15,"amplitude":0.1}}"#);
}

fn attach_recorder(detector: &EventDetector, dir: &Path) -> Result<RecorderHandle> {
    let (sink, handle) = SampleRecorder::new(dir.to_path_buf())
        .start()
        .with_context(|| format!("starting recorder in {}", dir.display()))?;
    detector.set_raw_sink(Box::new(sink));
    info!(dir = %dir.display(), "Raw sample recording enabled");
    Ok(handle)
}

/// Feed a recorded file as fast as possible, using sample time for the
/// warmup and the poll cadence
fn replay_file(
    session: &mut MeasurementSession,
    settings: &Settings,
    path: &Path,
    running: &AtomicBool,
) -> Result<()> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let detector = Arc::clone(session.detector());
    let poll_interval = settings.session.poll_interval_ms;

    let mut first: Option<Timestamp> = None;
    let mut next_poll: Timestamp = 0;
    let mut printed = 0usize;

    for item in read_records(BufReader::new(file)) {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let sample = match item {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Skipping bad sample record");
                continue;
            }
        };

        let ts = sample.timestamp();
        let origin = *first.get_or_insert(ts);
        if session.started_at().is_none() && ts >= origin + settings.session.warmup_ms {
            session.start();
        }
        detector.input(sample);

        if ts >= next_poll {
            let summary = session.poll();
            printed += print_poll(session, &summary, printed);
            next_poll = ts + poll_interval;
        }
    }

    let summary = session.poll();
    print_poll(session, &summary, printed);
    Ok(())
}

/// Read samples from stdin on a separate thread and poll on a wall-clock
/// interval until EOF or Ctrl+C
fn follow_stdin(
    session: &mut MeasurementSession,
    settings: &Settings,
    running: &AtomicBool,
) -> Result<()> {
    let detector = Arc::clone(session.detector());
    let reader = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || feed_detector(io::stdin().lock(), &detector))?;

    let warmup = Duration::from_millis(settings.session.warmup_ms);
    let poll_interval = Duration::from_millis(settings.session.poll_interval_ms.max(1));
    println!(
        "Following stdin. Warming up for {:.1}s, press Ctrl+C to stop.",
        warmup.as_secs_f64()
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let began = Instant::now();
        let mut interval = tokio::time::interval(poll_interval);
        let mut printed = 0usize;

        while running.load(Ordering::SeqCst) {
            interval.tick().await;

            if session.started_at().is_none() && began.elapsed() >= warmup {
                session.start();
                println!("Detector armed.");
            }
            let summary = session.poll();
            printed += print_poll(session, &summary, printed);

            if reader.is_finished() {
                info!("Input stream closed");
                break;
            }
        }
    });

    Ok(())
}

/// Push every record of `input` into the detector; returns the count
fn feed_detector<R: BufRead>(input: R, detector: &EventDetector) -> usize {
    let mut count = 0;
    for item in read_records(input) {
        match item {
            Ok(sample) => {
                detector.input(sample);
                count += 1;
            }
            Err(e) => warn!(error = %e, "Skipping bad sample record"),
        }
    }
    count
}

/// Print new results; returns how many were printed
fn print_poll(session: &MeasurementSession, summary: &PollSummary, already: usize) -> usize {
    if summary.reset {
        println!("(detector reset)");
    }
    for (i, result) in summary.new_results.iter().enumerate() {
        println!("{}", format_result(session, result, already + i + 1));
    }
    summary.new_results.len()
}

fn format_result(session: &MeasurementSession, result: &MeasurementResult, n: usize) -> String {
    let partial = if result.record.partial { " [PARTIAL]" } else { "" };
    format!(
        "#{:<3} | t+{:>8.3}s | Δ {:>6.3}s | {:>10} | ref {:>7.2}{}",
        n,
        result.elapsed_ms as f64 / 1000.0,
        result.delta_seconds,
        session.display(result).to_string(),
        result.reference_value,
        partial
    )
}

fn print_summary(session: &MeasurementSession) {
    let stats = session.stats();
    let snapshot = session.detector().snapshot();
    let coeffs = session.coefficients();
    let shown = |value: Option<f64>| match value {
        Some(v) => blackhole::calibration::scale_for_display(v, coeffs).to_string(),
        None => "-".to_string(),
    };

    println!();
    println!("Summary:");
    println!("────────────────────────────────────────");
    println!("  Measurements:     {}", stats.count);
    println!("  Min / Max:        {} / {}", shown(stats.min_value), shown(stats.max_value));
    println!("  Mean:             {}", shown(stats.mean_value));
    println!("  Latest:           {}", shown(stats.current_value));
    println!("  Partial:          {}", stats.partial_count);
    println!("  Rejected samples: {}", snapshot.rejected);
    println!(
        "  Evicted samples:  {} motion, {} sound",
        snapshot.motion_evicted, snapshot.sound_evicted
    );
}

fn print_flag_log(session: &MeasurementSession) {
    println!();
    println!("Flag changes:");
    println!("────────────────────────────────────────");
    for entry in session.detector().flag_change_log() {
        println!(
            "{:>10}  {:<24} -> {:<24} {:?}",
            entry.timestamp,
            entry.from.as_str(),
            entry.to.as_str(),
            entry.cause
        );
    }
}
