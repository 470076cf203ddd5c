use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Result, Snapshot, VibrationError};

/// Column names of an export file, in order.
pub const EXPORT_FIELDS: [&str; 14] = [
    "timestamp",
    "elapsed_ms",
    "time_formatted",
    "dominant_freq",
    "peak_amplitude",
    "imbalance",
    "rms1_x",
    "rms1_y",
    "rms1_z",
    "rms2_x",
    "rms2_y",
    "rms2_z",
    "buffer_usage",
    "noise_level",
];

/// One line of a recorded test. Field order is the export column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub timestamp: String,
    pub elapsed_ms: u64,
    pub time_formatted: String,
    pub dominant_freq: f64,
    pub peak_amplitude: f64,
    pub imbalance: f64,
    pub rms1_x: f64,
    pub rms1_y: f64,
    pub rms1_z: f64,
    pub rms2_x: f64,
    pub rms2_y: f64,
    pub rms2_z: f64,
    pub buffer_usage: f64,
    pub noise_level: f64,
}

impl ExportRow {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            timestamp: snapshot.captured_at.to_rfc3339(),
            elapsed_ms: snapshot.uptime_ms,
            time_formatted: snapshot.captured_at.format("%H:%M:%S").to_string(),
            dominant_freq: snapshot.peak1.peak.frequency,
            peak_amplitude: snapshot.peak1.peak.amplitude,
            imbalance: snapshot.imbalance,
            rms1_x: snapshot.rms1.x,
            rms1_y: snapshot.rms1.y,
            rms1_z: snapshot.rms1.z,
            rms2_x: snapshot.rms2.x,
            rms2_y: snapshot.rms2.y,
            rms2_z: snapshot.rms2.z,
            buffer_usage: snapshot.cadence_load,
            noise_level: snapshot.current_noise,
        }
    }
}

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub output_dir: PathBuf,
    /// Minimum spacing between kept rows.
    pub min_interval: Duration,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/tests"),
            min_interval: Duration::from_millis(200),
        }
    }
}

/// Collects throttled [`ExportRow`]s while a test is running and writes them
/// out as CSV.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
    is_recording: bool,
    rows: Vec<ExportRow>,
    last_kept_ms: Option<u64>,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            is_recording: false,
            rows: Vec::new(),
            last_kept_ms: None,
        }
    }

    /// Starts a new test, discarding rows from any previous one.
    pub fn start(&mut self) {
        self.rows.clear();
        self.last_kept_ms = None;
        self.is_recording = true;
        info!("test recording started");
    }

    pub fn stop(&mut self) {
        self.is_recording = false;
        info!(rows = self.rows.len(), "test recording stopped");
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn rows(&self) -> &[ExportRow] {
        &self.rows
    }

    /// Offers a snapshot to the recorder. Returns whether a row was kept.
    pub fn offer(&mut self, snapshot: &Snapshot) -> bool {
        if !self.is_recording {
            return false;
        }

        let min_interval = self.settings.min_interval.as_millis() as u64;
        let due = self
            .last_kept_ms
            .map(|last| snapshot.uptime_ms.saturating_sub(last) >= min_interval)
            .unwrap_or(true);
        if !due {
            return false;
        }

        self.rows.push(ExportRow::from_snapshot(snapshot));
        self.last_kept_ms = Some(snapshot.uptime_ms);
        true
    }

    /// Writes the header and all rows as CSV. Returns the number of rows.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<usize> {
        if self.rows.is_empty() {
            return Err(VibrationError::NothingToExport);
        }

        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(self.rows.len())
    }

    /// Writes the recorded rows to `test_<date>_<time>.csv` inside `dir`.
    pub fn export_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        if self.rows.is_empty() {
            return Err(VibrationError::NothingToExport);
        }

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "test_{}.csv",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let rows = self.write_csv(File::create(&path)?)?;
        info!(path = %path.display(), rows, "test exported");
        Ok(path)
    }

    /// Exports into the configured output directory.
    pub fn export(&self) -> Result<PathBuf> {
        self.export_to_dir(&self.settings.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{AxisRms, Peak, PeakReport, Spectrum};

    fn fabricated_snapshot(uptime_ms: u64) -> Snapshot {
        let peak = Peak {
            frequency: 20.0,
            amplitude: 48.5,
            bin_index: 205,
        };
        Snapshot {
            captured_at: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            collection_time_secs: 12.0,
            uptime_ms,
            idle_ms: Some(3),
            total_samples: 4096,
            time_data: Vec::new(),
            spectrum1: Spectrum::zeroed(4, 0.1, 2.5),
            spectrum2: Spectrum::zeroed(4, 0.1, 2.5),
            peak1: peak.into(),
            peak2: PeakReport::default(),
            rms1: AxisRms {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
            rms2: AxisRms {
                x: 4.0,
                y: 5.0,
                z: 6.0,
            },
            imbalance: 12.5,
            harmonics: Vec::new(),
            current_noise: 0.75,
            cadence_load: 64.0,
            buffer_warning: false,
        }
    }

    #[test]
    fn export_columns_follow_contract() {
        let mut recorder = Recorder::default();
        recorder.start();
        assert!(recorder.offer(&fabricated_snapshot(9000)));

        let mut out = Vec::new();
        assert_eq!(recorder.write_csv(&mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), EXPORT_FIELDS.join(","));
        let values: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(values.len(), 14);
        assert!(values[0].starts_with("2024-03-09T14:05:07"));
        assert_eq!(&values[1..], &[
            "9000", "14:05:07", "20.0", "48.5", "12.5", "1.0", "2.0", "3.0", "4.0", "5.0",
            "6.0", "64.0", "0.75",
        ]);
    }

    #[test]
    fn throttles_rows() {
        let mut recorder = Recorder::default();
        assert!(!recorder.offer(&fabricated_snapshot(0)));

        recorder.start();
        assert!(recorder.offer(&fabricated_snapshot(1000)));
        assert!(!recorder.offer(&fabricated_snapshot(1100)));
        assert!(recorder.offer(&fabricated_snapshot(1200)));
        recorder.stop();
        assert!(!recorder.offer(&fabricated_snapshot(5000)));

        let elapsed: Vec<u64> = recorder.rows().iter().map(|r| r.elapsed_ms).collect();
        assert_eq!(elapsed, vec![1000, 1200]);
    }

    #[test]
    fn refuses_empty_export() {
        let recorder = Recorder::default();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            recorder.export_to_dir(dir.path()),
            Err(VibrationError::NothingToExport)
        ));
    }

    #[test]
    fn exports_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(RecordingSettings {
            output_dir: dir.path().join("tests"),
            ..Default::default()
        });
        recorder.start();
        recorder.offer(&fabricated_snapshot(0));
        recorder.offer(&fabricated_snapshot(400));

        let path = recorder.export().unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("test_") && name.ends_with(".csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<ExportRow> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows, recorder.rows());
    }
}
