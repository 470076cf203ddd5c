use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Axis, Result, VibrationError};

/// Keys accepted by [`ConfigPatch::from_json`]. Anything else is ignored.
pub const RECOGNIZED_KEYS: [&str; 6] = [
    "motor_frequency",
    "noise_threshold",
    "fft_range",
    "main_axis",
    "buffer_warning",
    "auto_backup",
];

/// Supply frequency the motor drive is set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum MotorFrequency {
    Hz10,
    Hz20,
    Hz30,
    Hz40,
    Hz50,
    Hz60,
}

impl MotorFrequency {
    pub const ALL: [MotorFrequency; 6] = [
        MotorFrequency::Hz10,
        MotorFrequency::Hz20,
        MotorFrequency::Hz30,
        MotorFrequency::Hz40,
        MotorFrequency::Hz50,
        MotorFrequency::Hz60,
    ];

    pub fn hz(self) -> u32 {
        match self {
            MotorFrequency::Hz10 => 10,
            MotorFrequency::Hz20 => 20,
            MotorFrequency::Hz30 => 30,
            MotorFrequency::Hz40 => 40,
            MotorFrequency::Hz50 => 50,
            MotorFrequency::Hz60 => 60,
        }
    }

    /// Measured RPM per Hz of shaft frequency at this operating point.
    ///
    /// Kept as reference data only. [`crate::frequency_to_rpm`] does not apply
    /// it.
    pub fn rpm_factor(self) -> f64 {
        match self {
            MotorFrequency::Hz10 => 28.3,
            MotorFrequency::Hz20 => 29.135,
            MotorFrequency::Hz30 => 29.34,
            MotorFrequency::Hz40 => 29.4,
            MotorFrequency::Hz50 => 29.62,
            MotorFrequency::Hz60 => 29.65,
        }
    }
}

impl TryFrom<u32> for MotorFrequency {
    type Error = VibrationError;

    fn try_from(value: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|frequency| frequency.hz() == value)
            .ok_or_else(|| {
                VibrationError::invalid_config(format!(
                    "motor_frequency must be one of 10, 20, 30, 40, 50, 60 (got {value})"
                ))
            })
    }
}

impl From<MotorFrequency> for u32 {
    fn from(value: MotorFrequency) -> Self {
        value.hz()
    }
}

/// Runtime configuration of the monitor.
///
/// `sample_rate`, `fft_size` and `buffer_capacity` are fixed when the monitor
/// is built. The remaining fields can be replaced at runtime through a
/// [`ConfigPatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Nominal device sample rate in Hz.
    pub sample_rate: u32,
    pub fft_size: usize,
    pub buffer_capacity: usize,
    pub motor_frequency: MotorFrequency,
    /// Noise level in mm/s². Spectral magnitudes below `noise_threshold / 20`
    /// are gated to zero.
    pub noise_threshold: f64,
    /// Upper frequency shown by displays, in Hz. Not used by the analysis.
    pub fft_range: u32,
    /// Axis displays should emphasise. Not used by the analysis.
    pub main_axis: Axis,
    /// Cadence load percentage above which snapshots raise a warning.
    pub buffer_warning: f64,
    pub auto_backup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 200,
            fft_size: 2048,
            buffer_capacity: 4096,
            motor_frequency: MotorFrequency::Hz20,
            noise_threshold: 50.0,
            fft_range: 100,
            main_axis: Axis::X,
            buffer_warning: 70.0,
            auto_backup: true,
        }
    }
}

impl Config {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VibrationError::invalid_config("sample_rate must be positive"));
        }
        if self.fft_size < 2 || self.fft_size % 2 != 0 {
            return Err(VibrationError::invalid_config(format!(
                "fft_size must be an even number of at least 2 (got {})",
                self.fft_size
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(VibrationError::invalid_config(
                "buffer_capacity must be positive",
            ));
        }
        if !self.noise_threshold.is_finite() || self.noise_threshold < 0.0 {
            return Err(VibrationError::invalid_config(format!(
                "noise_threshold must be a non-negative number (got {})",
                self.noise_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.buffer_warning) {
            return Err(VibrationError::invalid_config(format!(
                "buffer_warning must be a percentage (got {})",
                self.buffer_warning
            )));
        }
        Ok(())
    }

    /// Hz per spectral bin.
    pub fn resolution(&self) -> f64 {
        self.sample_rate as f64 / self.fft_size as f64
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Magnitude below which spectral bins are considered noise.
    pub fn noise_floor(&self) -> f64 {
        self.noise_threshold / 20.0
    }

    /// Returns a validated copy of `self` with the patch applied.
    pub fn with_patch(&self, patch: &ConfigPatch) -> Result<Self> {
        let mut next = self.clone();
        if let Some(value) = patch.motor_frequency {
            next.motor_frequency = value;
        }
        if let Some(value) = patch.noise_threshold {
            next.noise_threshold = value;
        }
        if let Some(value) = patch.fft_range {
            next.fft_range = value;
        }
        if let Some(value) = patch.main_axis {
            next.main_axis = value;
        }
        if let Some(value) = patch.buffer_warning {
            next.buffer_warning = value;
        }
        if let Some(value) = patch.auto_backup {
            next.auto_backup = value;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial update covering the runtime-adjustable keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub motor_frequency: Option<MotorFrequency>,
    pub noise_threshold: Option<f64>,
    pub fft_range: Option<u32>,
    pub main_axis: Option<Axis>,
    pub buffer_warning: Option<f64>,
    pub auto_backup: Option<bool>,
}

impl ConfigPatch {
    /// Splits a JSON object into a patch and the list of unrecognized keys.
    ///
    /// A recognized key with a value of the wrong type or outside its domain
    /// fails the whole patch.
    pub fn from_json(value: &Value) -> Result<(Self, Vec<String>)> {
        let object = value
            .as_object()
            .ok_or_else(|| VibrationError::invalid_config("configuration update must be an object"))?;

        let mut recognized = Map::new();
        let mut ignored = Vec::new();
        for (key, value) in object {
            if RECOGNIZED_KEYS.contains(&key.as_str()) {
                recognized.insert(key.clone(), value.clone());
            } else {
                ignored.push(key.clone());
            }
        }

        let patch = serde_json::from_value(Value::Object(recognized))
            .map_err(|err| VibrationError::invalid_config(err.to_string()))?;
        Ok((patch, ignored))
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Names of the keys this patch sets.
    pub fn keys(&self) -> Vec<String> {
        let present = [
            self.motor_frequency.is_some(),
            self.noise_threshold.is_some(),
            self.fft_range.is_some(),
            self.main_axis.is_some(),
            self.buffer_warning.is_some(),
            self.auto_backup.is_some(),
        ];
        RECOGNIZED_KEYS
            .iter()
            .zip(present)
            .filter(|(_, set)| *set)
            .map(|(key, _)| key.to_string())
            .collect()
    }
}

/// Outcome of a configuration update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub applied: Vec<String>,
    pub ignored: Vec<String>,
}
