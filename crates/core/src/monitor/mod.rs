use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use chrono::Local;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    Config, ConfigPatch, ConfigUpdate, MetricsAggregator, Result, Sample, SampleBuffer,
    SessionTiming, Snapshot, VibrationError,
};

/// Everything guarded by the monitor's single lock.
#[derive(Debug)]
struct MonitorState {
    config: Config,
    buffer: SampleBuffer,
    aggregator: MetricsAggregator,
    collection_started: Instant,
    last_arrival: Option<Instant>,
}

/// Shared, cloneable owner of the configuration, sample buffer and metrics
/// pipeline.
///
/// Ingestion, snapshot assembly, clearing and configuration swaps all take
/// the same lock, so a snapshot never observes a half-applied change.
#[derive(Debug, Clone)]
pub struct VibrationMonitor {
    state: Arc<Mutex<MonitorState>>,
    created: Instant,
}

impl VibrationMonitor {
    /// Creates a monitor after validating `config`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        if config.buffer_capacity < config.fft_size {
            warn!(
                buffer_capacity = config.buffer_capacity,
                fft_size = config.fft_size,
                "buffer cannot hold a full FFT window; spectra will stay empty"
            );
        }

        info!(
            fft_size = config.fft_size,
            resolution = config.resolution(),
            buffer_capacity = config.buffer_capacity,
            "vibration monitor initialised"
        );

        let now = Instant::now();
        Ok(Self {
            state: Arc::new(Mutex::new(MonitorState {
                buffer: SampleBuffer::new(config.buffer_capacity),
                config,
                aggregator: MetricsAggregator::new(),
                collection_started: now,
                last_arrival: None,
            })),
            created: now,
        })
    }

    /// Appends a sample to the buffer.
    pub fn ingest(&self, sample: Sample) -> Result<()> {
        let mut state = self.lock()?;
        state.buffer.append(sample);
        state.last_arrival = Some(Instant::now());
        Ok(())
    }

    /// Assembles a snapshot from the current buffer.
    ///
    /// Returns [`VibrationError::InsufficientData`] until enough samples have
    /// been buffered.
    pub fn produce_snapshot(&self) -> Result<Snapshot> {
        let mut guard = self.lock()?;
        let now = Instant::now();
        let timing = SessionTiming {
            captured_at: Local::now(),
            collection_time_secs: now.duration_since(guard.collection_started).as_secs_f64(),
            uptime_ms: now.duration_since(self.created).as_millis() as u64,
            idle_ms: guard
                .last_arrival
                .map(|at| now.duration_since(at).as_millis() as u64),
        };

        let state = &mut *guard;
        state
            .aggregator
            .snapshot(&state.buffer, &state.config, timing)
    }

    /// Returns a copy of the active configuration.
    pub fn config(&self) -> Result<Config> {
        Ok(self.lock()?.config.clone())
    }

    /// Applies a typed patch. The new configuration replaces the old one as a
    /// whole and takes effect from the next snapshot.
    pub fn apply_patch(&self, patch: &ConfigPatch) -> Result<Config> {
        let mut state = self.lock()?;
        let next = state.config.with_patch(patch)?;
        state.config = next.clone();
        info!(keys = ?patch.keys(), "configuration updated");
        Ok(next)
    }

    /// Merges the recognized keys of a JSON object into the configuration.
    ///
    /// Unknown keys are logged and ignored. A recognized key with an invalid
    /// value rejects the whole update and leaves the configuration unchanged.
    pub fn update_config(&self, update: &Value) -> Result<ConfigUpdate> {
        let (patch, ignored) = ConfigPatch::from_json(update).map_err(|err| {
            warn!(%err, "rejected configuration update");
            err
        })?;
        for key in &ignored {
            warn!(key = key.as_str(), "ignoring unrecognized configuration key");
        }

        if !patch.is_empty() {
            self.apply_patch(&patch)?;
        }

        Ok(ConfigUpdate {
            applied: patch.keys(),
            ignored,
        })
    }

    /// Drops buffered samples and counters while keeping the configuration.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.buffer.clear();
        state.collection_started = Instant::now();
        state.last_arrival = None;
        info!("sample buffer cleared");
        Ok(())
    }

    pub fn buffered_len(&self) -> Result<usize> {
        Ok(self.lock()?.buffer.len())
    }

    pub fn total_samples(&self) -> Result<u64> {
        Ok(self.lock()?.buffer.total_appended())
    }

    /// Arrival cadence heuristic in percent.
    pub fn cadence_load(&self) -> Result<f64> {
        let state = self.lock()?;
        Ok(state.buffer.cadence_load(state.config.sample_rate))
    }

    fn lock(&self) -> Result<MutexGuard<'_, MonitorState>> {
        self.state
            .lock()
            .map_err(|_| VibrationError::msg("monitor state has been poisoned"))
    }
}
