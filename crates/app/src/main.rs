use std::{
    f64::consts::PI,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vibration_monitor_core::{
    Config, ExportRow, FeedEvent, Record, Recorder, RecordingSettings, Result, Sample,
    SnapshotFeed, TriAxial, VibrationError, VibrationMonitor,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Replay {
            input,
            paced,
            export,
            report_ms,
        } => run_replay(config, &input, paced, export, report_ms).await,
        Commands::Simulate {
            frequency,
            amplitude,
            imbalance,
            seconds,
            export,
            report_ms,
        } => {
            let signal = SyntheticSignal {
                frequency,
                amplitude,
                imbalance,
            };
            run_simulate(config, signal, seconds, export, report_ms).await
        }
        Commands::Analyze { input } => run_analyze(config, &input),
    }
}

async fn run_replay(
    config: Config,
    input: &Path,
    paced: bool,
    export: Option<PathBuf>,
    report_ms: u64,
) -> Result<()> {
    tracing::info!(?input, paced, "replaying recorded stream");

    let records = read_records(input)?;
    let session = Session::start(config, export.is_some(), report_ms)?;

    let mut last_timestamp: Option<i64> = None;
    for record in records {
        if let (true, Record::Sample(sample)) = (paced, &record) {
            if let Some(delay) = pacing_delay(last_timestamp, sample.timestamp) {
                tokio::time::sleep(delay).await;
            }
            last_timestamp = Some(sample.timestamp);
        }
        session.feed.dispatch(record)?;
    }

    session.finish(export).await
}

/// Wait before replaying a sample stamped `timestamp`. Backwards steps do not
/// wait and gaps are capped at one second.
fn pacing_delay(last: Option<i64>, timestamp: i64) -> Option<Duration> {
    let last = last?;
    let delta = timestamp.saturating_sub(last).clamp(0, 1000);
    Some(Duration::from_millis(delta as u64))
}

async fn run_simulate(
    config: Config,
    signal: SyntheticSignal,
    seconds: f64,
    export: Option<PathBuf>,
    report_ms: u64,
) -> Result<()> {
    tracing::info!(?signal, seconds, "simulating vibration");

    let sample_rate = config.sample_rate as f64;
    let total = (seconds.max(0.0) * sample_rate).round() as usize;
    let session = Session::start(config, export.is_some(), report_ms)?;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / sample_rate));
    for index in 0..total {
        ticker.tick().await;
        session.feed.monitor().ingest(signal.sample(index, sample_rate))?;
    }

    session.finish(export).await
}

fn run_analyze(config: Config, input: &Path) -> Result<()> {
    let monitor = VibrationMonitor::new(config)?;
    for record in read_records(input)? {
        match record {
            Record::Sample(sample) => monitor.ingest(sample)?,
            Record::Status { message } => tracing::info!(status = %message, "device status"),
        }
    }

    let snapshot = monitor.produce_snapshot()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// A running feed together with the task consuming its events.
struct Session {
    feed: SnapshotFeed,
    cancel: CancellationToken,
    feed_task: tokio::task::JoinHandle<()>,
    consumer: tokio::task::JoinHandle<Recorder>,
}

impl Session {
    fn start(config: Config, record: bool, report_ms: u64) -> Result<Self> {
        let monitor = VibrationMonitor::new(config)?;
        let feed = SnapshotFeed::new(monitor);
        let cancel = CancellationToken::new();

        let mut recorder = Recorder::new(RecordingSettings::default());
        if record {
            recorder.start();
        }
        let receiver = feed.subscribe();
        let consumer = tokio::spawn(consume(receiver, recorder, report_ms, cancel.clone()));
        let feed_task = feed.spawn(cancel.clone());

        Ok(Self {
            feed,
            cancel,
            feed_task,
            consumer,
        })
    }

    async fn finish(self, export: Option<PathBuf>) -> Result<()> {
        // Let the feed publish a final cycle over the complete buffer.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.cancel.cancel();

        self.feed_task
            .await
            .map_err(|err| VibrationError::msg(format!("snapshot feed panicked: {err}")))?;
        let mut recorder = self
            .consumer
            .await
            .map_err(|err| VibrationError::msg(format!("consumer panicked: {err}")))?;
        recorder.stop();

        if let Some(dir) = export {
            let path = recorder.export_to_dir(dir)?;
            tracing::info!(path = %path.display(), "recording written");
        }
        Ok(())
    }
}

async fn consume(
    mut receiver: Receiver<FeedEvent>,
    mut recorder: Recorder,
    report_ms: u64,
    cancel: CancellationToken,
) -> Recorder {
    let mut last_report: Option<u64> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = receiver.recv() => match event {
                Ok(FeedEvent::Snapshot(snapshot)) => {
                    recorder.offer(&snapshot);

                    let due = last_report
                        .map(|last| snapshot.uptime_ms.saturating_sub(last) >= report_ms)
                        .unwrap_or(true);
                    if due {
                        last_report = Some(snapshot.uptime_ms);
                        match serde_json::to_string(&ExportRow::from_snapshot(&snapshot)) {
                            Ok(line) => println!("{line}"),
                            Err(err) => tracing::warn!(%err, "failed to encode snapshot"),
                        }
                        if snapshot.buffer_warning {
                            tracing::debug!(load = snapshot.cadence_load, "arrival cadence above warning level");
                        }
                    }
                }
                Ok(FeedEvent::Status(message)) => tracing::info!(status = %message, "device status"),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "consumer lagging behind feed"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    recorder
}

/// Reads JSON-lines records, dropping lines that do not parse.
fn read_records(path: &Path) -> Result<Vec<Record>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(line) {
            Ok(record) => records.push(record),
            Err(err) => tracing::debug!(line = number + 1, %err, "skipping malformed record"),
        }
    }

    tracing::info!(records = records.len(), "records loaded");
    Ok(records)
}

/// Pure sine vibration on both sensors, with sensor two attenuated by the
/// requested imbalance.
#[derive(Debug, Clone, Copy)]
struct SyntheticSignal {
    frequency: f64,
    amplitude: f64,
    /// Percent.
    imbalance: f64,
}

impl SyntheticSignal {
    fn sample(&self, index: usize, sample_rate: f64) -> Sample {
        let t = index as f64 / sample_rate;
        let value = self.amplitude * (2.0 * PI * self.frequency * t).sin();
        let scale = 1.0 - self.imbalance.clamp(0.0, 100.0) / 100.0;
        Sample::new(
            (t * 1000.0).round() as i64,
            TriAxial::new(value, value * 0.25, 0.0),
            TriAxial::new(value * scale, value * scale * 0.25, 0.0),
        )
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time vibration diagnostics", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed a JSON-lines record file through the live pipeline.
    Replay {
        /// Path to the record file.
        input: PathBuf,
        /// Honour the device timestamps between samples.
        #[arg(long)]
        paced: bool,
        /// Record a test and export it as CSV into this directory.
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Milliseconds between printed summaries.
        #[arg(long, default_value_t = 1000)]
        report_ms: u64,
    },
    /// Generate a synthetic two-sensor vibration in real time.
    Simulate {
        /// Vibration frequency in Hz.
        #[arg(short, long, default_value_t = 20.0)]
        frequency: f64,
        /// Peak acceleration in mm/s².
        #[arg(short, long, default_value_t = 100.0)]
        amplitude: f64,
        /// Attenuation of sensor two, in percent.
        #[arg(short, long, default_value_t = 0.0)]
        imbalance: f64,
        /// Duration in seconds.
        #[arg(short, long, default_value_t = 30.0)]
        seconds: f64,
        /// Record a test and export it as CSV into this directory.
        #[arg(short, long)]
        export: Option<PathBuf>,
        /// Milliseconds between printed summaries.
        #[arg(long, default_value_t = 1000)]
        report_ms: u64,
    },
    /// Ingest a record file and print a single snapshot.
    Analyze {
        /// Path to the record file.
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_follows_device_timestamps() {
        assert_eq!(pacing_delay(None, 500), None);
        assert_eq!(pacing_delay(Some(100), 105), Some(Duration::from_millis(5)));
        assert_eq!(pacing_delay(Some(100), 100), Some(Duration::ZERO));
    }

    #[test]
    fn pacing_ignores_resets_and_caps_gaps() {
        assert_eq!(pacing_delay(Some(5000), 0), Some(Duration::ZERO));
        assert_eq!(pacing_delay(Some(0), 60_000), Some(Duration::from_millis(1000)));
        assert_eq!(
            pacing_delay(Some(i64::MIN), i64::MAX),
            Some(Duration::from_millis(1000))
        );
    }

    #[test]
    fn synthetic_signal_attenuates_second_sensor() {
        let signal = SyntheticSignal {
            frequency: 10.0,
            amplitude: 100.0,
            imbalance: 25.0,
        };
        // A quarter period in at 200 Hz: the sine is at its crest.
        let sample = signal.sample(5, 200.0);

        assert_eq!(sample.timestamp, 25);
        assert!((sample.sensor1.x - 100.0).abs() < 1e-9);
        assert!((sample.sensor2.x - 75.0).abs() < 1e-9);
    }
}
