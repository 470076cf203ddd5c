//! Core library for real-time vibration diagnostics of rotating machinery.
//!
//! Parsed two-sensor accelerometer samples flow into a bounded
//! [`SampleBuffer`] owned by a [`VibrationMonitor`]. On demand, or on a fixed
//! cadence through a [`SnapshotFeed`], the monitor turns the buffer into a
//! [`Snapshot`] holding spectra, dominant peaks, harmonics, RMS levels and
//! inter-sensor imbalance. A [`Recorder`] keeps throttled rows of those
//! snapshots for CSV export.

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod monitor;
pub mod record;
pub mod sample;

pub use analysis::{frequency_to_rpm, Harmonic, Peak, SpectralAnalyzer, Spectrum};
pub use buffer::SampleBuffer;
pub use config::{Config, ConfigPatch, ConfigUpdate, MotorFrequency};
pub use error::{Result, VibrationError};
pub use feed::{FeedEvent, SnapshotFeed};
pub use metrics::{imbalance, AxisRms, MetricsAggregator, PeakReport, SessionTiming, Snapshot};
pub use monitor::VibrationMonitor;
pub use record::{ExportRow, Recorder, RecordingSettings, EXPORT_FIELDS};
pub use sample::{Axis, Record, Sample, Sensor, TriAxial};
