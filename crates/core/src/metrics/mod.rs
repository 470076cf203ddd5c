use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    analysis::{DEFAULT_MAX_HARMONIC_ORDER, DEFAULT_MIN_PEAK_FREQUENCY},
    Axis, Config, Harmonic, Peak, Result, Sample, SampleBuffer, Sensor, SpectralAnalyzer,
    Spectrum, VibrationError,
};

/// Samples required before a snapshot can be assembled.
pub const SNAPSHOT_MIN_SAMPLES: usize = 100;
/// Raw samples carried in each snapshot.
pub const SNAPSHOT_TAIL_SAMPLES: usize = 100;
pub const RMS_WINDOW: usize = 100;
pub const NOISE_WINDOW: usize = 50;

/// Per-axis RMS levels of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisRms {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisRms {
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Dominant peak of one sensor along with its shaft speed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeakReport {
    #[serde(flatten)]
    pub peak: Peak,
    pub rpm: f64,
}

impl From<Peak> for PeakReport {
    fn from(peak: Peak) -> Self {
        Self {
            rpm: peak.rpm(),
            peak,
        }
    }
}

/// Wall-clock bookkeeping supplied by the owner of the buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTiming {
    pub captured_at: DateTime<Local>,
    /// Seconds since data collection started or was last cleared.
    pub collection_time_secs: f64,
    /// Milliseconds since the monitor was created.
    pub uptime_ms: u64,
    /// Milliseconds since the last sample arrived, if any has.
    pub idle_ms: Option<u64>,
}

/// Immutable result of one aggregation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Local>,
    pub collection_time_secs: f64,
    pub uptime_ms: u64,
    pub idle_ms: Option<u64>,
    pub total_samples: u64,
    pub time_data: Vec<Sample>,
    pub spectrum1: Spectrum,
    pub spectrum2: Spectrum,
    pub peak1: PeakReport,
    pub peak2: PeakReport,
    pub rms1: AxisRms,
    pub rms2: AxisRms,
    /// Relative mismatch of the two peak amplitudes, in percent.
    pub imbalance: f64,
    pub harmonics: Vec<Harmonic>,
    pub current_noise: f64,
    /// Arrival cadence heuristic in percent; see [`SampleBuffer::cadence_load`].
    pub cadence_load: f64,
    pub buffer_warning: bool,
}

impl Snapshot {
    pub fn rms(&self, sensor: Sensor) -> &AxisRms {
        match sensor {
            Sensor::One => &self.rms1,
            Sensor::Two => &self.rms2,
        }
    }
}

/// Relative amplitude mismatch between two sensors, in percent.
pub fn imbalance(amp1: f64, amp2: f64) -> f64 {
    if amp1 <= 0.0 && amp2 <= 0.0 {
        return 0.0;
    }

    let max = amp1.max(amp2);
    if max > 0.0 {
        (amp1 - amp2).abs() / max * 100.0
    } else {
        0.0
    }
}

/// Derives vibration metrics from the sample buffer.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    analyzer: SpectralAnalyzer,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// RMS of the latest `window` samples, or zero with too little history.
    pub fn rms(buffer: &SampleBuffer, sensor: Sensor, axis: Axis, window: usize) -> f64 {
        buffer.rms_window(sensor, axis, window).unwrap_or(0.0)
    }

    /// RMS of sensor one's X axis over the latest `window` samples.
    pub fn current_noise(buffer: &SampleBuffer, window: usize) -> f64 {
        Self::rms(buffer, Sensor::One, Axis::X, window)
    }

    fn axis_rms(buffer: &SampleBuffer, sensor: Sensor) -> AxisRms {
        AxisRms {
            x: Self::rms(buffer, sensor, Axis::X, RMS_WINDOW),
            y: Self::rms(buffer, sensor, Axis::Y, RMS_WINDOW),
            z: Self::rms(buffer, sensor, Axis::Z, RMS_WINDOW),
        }
    }

    /// Assembles a snapshot from the current buffer contents.
    ///
    /// The caller must keep `buffer` and `config` unchanged for the duration
    /// of the call.
    pub fn snapshot(
        &mut self,
        buffer: &SampleBuffer,
        config: &Config,
        timing: SessionTiming,
    ) -> Result<Snapshot> {
        if buffer.len() < SNAPSHOT_MIN_SAMPLES {
            debug!(
                available = buffer.len(),
                required = SNAPSHOT_MIN_SAMPLES,
                "snapshot not ready"
            );
            return Err(VibrationError::InsufficientData {
                required: SNAPSHOT_MIN_SAMPLES,
                available: buffer.len(),
            });
        }

        let signal1 = buffer.extract_axis(Sensor::One, Axis::X);
        let signal2 = buffer.extract_axis(Sensor::Two, Axis::X);

        let spectrum1 = self.analyzer.spectrum(&signal1, config)?;
        let spectrum2 = self.analyzer.spectrum(&signal2, config)?;

        let peak1 = spectrum1.peak(DEFAULT_MIN_PEAK_FREQUENCY);
        let peak2 = spectrum2.peak(DEFAULT_MIN_PEAK_FREQUENCY);

        let harmonics =
            spectrum1.harmonics(peak1.frequency, DEFAULT_MAX_HARMONIC_ORDER, config.nyquist());
        let cadence_load = buffer.cadence_load(config.sample_rate);

        Ok(Snapshot {
            captured_at: timing.captured_at,
            collection_time_secs: timing.collection_time_secs,
            uptime_ms: timing.uptime_ms,
            idle_ms: timing.idle_ms,
            total_samples: buffer.total_appended(),
            time_data: buffer.tail(SNAPSHOT_TAIL_SAMPLES),
            rms1: Self::axis_rms(buffer, Sensor::One),
            rms2: Self::axis_rms(buffer, Sensor::Two),
            imbalance: imbalance(peak1.amplitude, peak2.amplitude),
            peak1: peak1.into(),
            peak2: peak2.into(),
            spectrum1,
            spectrum2,
            harmonics,
            current_noise: Self::current_noise(buffer, NOISE_WINDOW),
            cadence_load,
            buffer_warning: cadence_load >= config.buffer_warning,
        })
    }
}
