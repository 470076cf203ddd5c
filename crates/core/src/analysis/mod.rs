use std::{f64::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex64, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{Config, Result};

/// Lowest frequency considered when searching for the dominant peak.
pub const DEFAULT_MIN_PEAK_FREQUENCY: f64 = 1.0;
/// Highest harmonic order searched, inclusive.
pub const DEFAULT_MAX_HARMONIC_ORDER: usize = 6;
/// Half-width, in bins, of the search window around each harmonic target.
const HARMONIC_SEARCH_RADIUS: usize = 2;

/// Converts a shaft frequency in Hz to revolutions per minute.
///
/// The per-operating-point factors in
/// [`MotorFrequency::rpm_factor`](crate::MotorFrequency::rpm_factor) are not
/// applied here.
pub fn frequency_to_rpm(frequency: f64) -> f64 {
    frequency * 60.0
}

/// Magnitude spectrum of the most recent `fft_size` samples of a signal.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Hz per bin.
    pub resolution: f64,
    /// Gate level below which magnitudes were zeroed.
    pub noise_floor: f64,
    pub magnitudes: Vec<f64>,
}

/// Dominant spectral line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Peak {
    pub frequency: f64,
    pub amplitude: f64,
    pub bin_index: usize,
}

impl Peak {
    pub fn rpm(&self) -> f64 {
        frequency_to_rpm(self.frequency)
    }
}

/// Spectral line found near an integer multiple of the fundamental.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Harmonic {
    pub order: usize,
    pub frequency: f64,
    pub amplitude: f64,
    pub rpm: f64,
    /// `frequency / fundamental`.
    pub ratio: f64,
}

impl Spectrum {
    /// All-zero spectrum with `bins` entries.
    pub fn zeroed(bins: usize, resolution: f64, noise_floor: f64) -> Self {
        Self {
            resolution,
            noise_floor,
            magnitudes: vec![0.0; bins],
        }
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn frequency_of(&self, bin: usize) -> f64 {
        bin as f64 * self.resolution
    }

    /// Finds the strongest bin at or above `min_frequency`.
    ///
    /// Ties resolve to the lowest bin. A spectrum with nothing above zero in
    /// the searched range yields the zero peak, so a gated spectrum exports a
    /// dominant frequency and RPM of 0 rather than the first searched bin's
    /// frequency.
    pub fn peak(&self, min_frequency: f64) -> Peak {
        if self.is_empty() || self.resolution <= 0.0 {
            return Peak::default();
        }

        let min_bin = (min_frequency.max(0.0) / self.resolution).floor() as usize;
        let Some(searched) = self.magnitudes.get(min_bin..).filter(|bins| !bins.is_empty())
        else {
            return Peak::default();
        };

        let (offset, amplitude) = searched.iter().enumerate().fold(
            (0, f64::NEG_INFINITY),
            |best, (index, &value)| if value > best.1 { (index, value) } else { best },
        );
        if amplitude <= 0.0 {
            return Peak::default();
        }

        let bin_index = min_bin + offset;
        Peak {
            frequency: self.frequency_of(bin_index),
            amplitude,
            bin_index,
        }
    }

    /// Looks for harmonics 2..=`max_order` of `fundamental`.
    ///
    /// The search stops at the first order whose target lies above
    /// `nyquist`. Orders whose strongest nearby bin does not exceed the noise
    /// floor are left out, so the result is sparse.
    pub fn harmonics(&self, fundamental: f64, max_order: usize, nyquist: f64) -> Vec<Harmonic> {
        let mut harmonics = Vec::new();
        if fundamental <= 0.0 || self.len() < 2 || self.resolution <= 0.0 {
            return harmonics;
        }

        let last_bin = self.len() - 1;
        for order in 2..=max_order {
            let target = fundamental * order as f64;
            if target > nyquist {
                break;
            }

            let target_bin = (target / self.resolution).round() as usize;
            let start = target_bin.saturating_sub(HARMONIC_SEARCH_RADIUS).max(1);
            let end = (target_bin + HARMONIC_SEARCH_RADIUS).min(last_bin);
            if start > end {
                continue;
            }

            let mut best_bin = None;
            let mut best_amplitude = 0.0;
            for bin in start..=end {
                let amplitude = self.magnitudes[bin];
                if amplitude > best_amplitude {
                    best_amplitude = amplitude;
                    best_bin = Some(bin);
                }
            }

            if let Some(bin) = best_bin.filter(|_| best_amplitude > self.noise_floor) {
                let frequency = self.frequency_of(bin);
                harmonics.push(Harmonic {
                    order,
                    frequency,
                    amplitude: best_amplitude,
                    rpm: frequency_to_rpm(frequency),
                    ratio: frequency / fundamental,
                });
            }
        }

        harmonics
    }
}

impl fmt::Debug for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spectrum")
            .field("resolution", &self.resolution)
            .field("noise_floor", &self.noise_floor)
            .field("bins", &self.magnitudes.len())
            .finish()
    }
}

/// Windowed FFT front end. Plans are cached and rebuilt only when the FFT
/// size changes.
pub struct SpectralAnalyzer {
    fft_planner: RealFftPlanner<f64>,
    fft: Option<FftResources>,
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Computes the magnitude spectrum of the latest `config.fft_size`
    /// values of `signal`.
    ///
    /// Shorter signals produce an all-zero spectrum of `fft_size / 2` bins.
    /// Otherwise the segment is mean-removed, Hann windowed, transformed,
    /// scaled by `2 / fft_size`, has its DC bin cleared and is gated at the
    /// noise floor.
    pub fn spectrum(&mut self, signal: &[f64], config: &Config) -> Result<Spectrum> {
        let size = config.fft_size;
        let bins = size / 2;
        let resolution = config.resolution();
        let noise_floor = config.noise_floor();

        if size < 2 || signal.len() < size {
            return Ok(Spectrum::zeroed(bins, resolution, noise_floor));
        }

        let segment = &signal[signal.len() - size..];
        let mean = segment.iter().sum::<f64>() / size as f64;

        let fft = self.prepare_fft(size);
        for (index, value) in segment.iter().enumerate() {
            fft.input[index] = (value - mean) * fft.window[index];
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let scale = bins as f64;
        let mut magnitudes: Vec<f64> = fft.spectrum[..bins]
            .iter()
            .map(|bin| bin.norm() / scale)
            .collect();

        magnitudes[0] = 0.0;
        for magnitude in magnitudes.iter_mut() {
            if *magnitude < noise_floor {
                *magnitude = 0.0;
            }
        }

        Ok(Spectrum {
            resolution,
            noise_floor,
            magnitudes,
        })
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let resources = match self.fft.take() {
            Some(fft) if fft.size == size => fft,
            _ => {
                let plan = self.fft_planner.plan_fft_forward(size);
                FftResources {
                    size,
                    scratch: plan.make_scratch_vec(),
                    spectrum: plan.make_output_vec(),
                    input: plan.make_input_vec(),
                    window: (0..size).map(|index| hann_value(index, size)).collect(),
                    plan,
                }
            }
        };

        self.fft.insert(resources)
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f64>>,
    scratch: Vec<Complex64>,
    spectrum: Vec<Complex64>,
    input: Vec<f64>,
    window: Vec<f64>,
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

/// Symmetric Hann window coefficient.
fn hann_value(index: usize, len: usize) -> f64 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f64) / (len as f64 - 1.0)).cos()
}
