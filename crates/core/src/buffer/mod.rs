use std::collections::VecDeque;

use crate::{Axis, Sample, Sensor};

/// Smoothing factor applied to each new inter-sample interval.
const INTERVAL_SMOOTHING: f64 = 0.1;

/// Bounded FIFO of samples in arrival order.
///
/// Once `capacity` samples are held, every append evicts the oldest sample.
/// The buffer also tracks an exponential moving average of the device
/// timestamp deltas which feeds the cadence load heuristic.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    total_appended: u64,
    last_timestamp: Option<i64>,
    avg_interval: Option<f64>,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
            last_timestamp: None,
            avg_interval: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples appended since creation or the last [`clear`](Self::clear),
    /// including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Smoothed inter-sample interval in device milliseconds, if at least two
    /// samples have been seen.
    pub fn avg_interval(&self) -> Option<f64> {
        self.avg_interval
    }

    pub fn append(&mut self, sample: Sample) {
        // A timestamp that steps backwards is a device reset; it starts a new
        // baseline without feeding the average.
        if let Some(last) = self.last_timestamp.filter(|&last| sample.timestamp >= last) {
            let interval = sample.timestamp.saturating_sub(last) as f64;
            self.avg_interval = Some(match self.avg_interval {
                None => interval,
                Some(avg) => avg * (1.0 - INTERVAL_SMOOTHING) + interval * INTERVAL_SMOOTHING,
            });
        }
        self.last_timestamp = Some(sample.timestamp);

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_appended += 1;
    }

    /// Returns one axis of one sensor, oldest first.
    pub fn extract_axis(&self, sensor: Sensor, axis: Axis) -> Vec<f64> {
        self.samples
            .iter()
            .map(|sample| sample.value(sensor, axis))
            .collect()
    }

    /// RMS over the most recent `window` samples, or `None` when fewer than
    /// `window` samples are buffered.
    pub fn rms_window(&self, sensor: Sensor, axis: Axis, window: usize) -> Option<f64> {
        if window == 0 || self.samples.len() < window {
            return None;
        }

        let sum: f64 = self
            .samples
            .iter()
            .skip(self.samples.len() - window)
            .map(|sample| {
                let value = sample.value(sensor, axis);
                value * value
            })
            .sum();
        Some((sum / window as f64).sqrt())
    }

    /// The most recent `count` samples, oldest first.
    pub fn tail(&self, count: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(count);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Arrival cadence heuristic in percent.
    ///
    /// This compares the smoothed arrival interval with the nominal period of
    /// `sample_rate`. It measures how slowly samples arrive, not how full the
    /// buffer is, and it cannot tell a slow producer from a stopped one.
    pub fn cadence_load(&self, sample_rate: u32) -> f64 {
        match self.avg_interval {
            Some(avg) if sample_rate > 0 => {
                let ideal_interval = 1000.0 / sample_rate as f64;
                (avg / ideal_interval * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.total_appended = 0;
        self.last_timestamp = None;
        self.avg_interval = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriAxial;

    fn sample(timestamp: i64, value: f64) -> Sample {
        Sample::new(
            timestamp,
            TriAxial::new(value, value * 2.0, -value),
            TriAxial::new(value + 1.0, 0.0, 0.0),
        )
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut buffer = SampleBuffer::new(8);
        for i in 0..13 {
            buffer.append(sample(i, i as f64));
            assert!(buffer.len() <= 8);
        }

        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.total_appended(), 13);
        let xs = buffer.extract_axis(Sensor::One, Axis::X);
        let expected: Vec<f64> = (5..13).map(|i| i as f64).collect();
        assert_eq!(xs, expected);
    }

    #[test]
    fn extracts_axes_in_arrival_order() {
        let mut buffer = SampleBuffer::new(16);
        buffer.append(sample(0, 1.0));
        buffer.append(sample(5, 2.0));

        assert_eq!(buffer.extract_axis(Sensor::One, Axis::Y), vec![2.0, 4.0]);
        assert_eq!(buffer.extract_axis(Sensor::Two, Axis::X), vec![2.0, 3.0]);
    }

    #[test]
    fn smooths_arrival_interval() {
        let mut buffer = SampleBuffer::new(16);
        buffer.append(sample(0, 0.0));
        assert_eq!(buffer.avg_interval(), None);

        buffer.append(sample(10, 0.0));
        assert_eq!(buffer.avg_interval(), Some(10.0));

        buffer.append(sample(30, 0.0));
        let avg = buffer.avg_interval().unwrap();
        assert!((avg - 11.0).abs() < 1e-12);
    }

    #[test]
    fn cadence_load_tracks_interval_not_occupancy() {
        let mut buffer = SampleBuffer::new(4096);
        assert_eq!(buffer.cadence_load(200), 0.0);

        // 200 Hz nominal is a 5 ms period.
        buffer.append(sample(0, 0.0));
        buffer.append(sample(4, 0.0));
        assert!((buffer.cadence_load(200) - 80.0).abs() < 1e-9);

        buffer.append(sample(104, 0.0));
        assert_eq!(buffer.cadence_load(200), 100.0);
    }

    #[test]
    fn timestamp_reset_keeps_cadence_non_negative() {
        let mut buffer = SampleBuffer::new(16);
        buffer.append(sample(1000, 0.0));
        buffer.append(sample(0, 0.0));
        assert_eq!(buffer.avg_interval(), None);
        assert_eq!(buffer.cadence_load(200), 0.0);

        buffer.append(sample(5, 0.0));
        assert_eq!(buffer.avg_interval(), Some(5.0));
        buffer.append(sample(2, 0.0));
        assert_eq!(buffer.avg_interval(), Some(5.0));
        assert_eq!(buffer.cadence_load(200), 100.0);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn rms_window_requires_enough_history() {
        let mut buffer = SampleBuffer::new(64);
        for i in 0..10 {
            buffer.append(sample(i, -3.0));
        }

        assert_eq!(buffer.rms_window(Sensor::One, Axis::X, 11), None);
        let rms = buffer.rms_window(Sensor::One, Axis::X, 10).unwrap();
        assert!((rms - 3.0).abs() < 1e-12);
        let rms = buffer.rms_window(Sensor::One, Axis::X, 4).unwrap();
        assert!((rms - 3.0).abs() < 1e-12);
    }

    #[test]
    fn tail_returns_latest_samples() {
        let mut buffer = SampleBuffer::new(32);
        for i in 0..20 {
            buffer.append(sample(i, i as f64));
        }

        let tail = buffer.tail(3);
        let stamps: Vec<i64> = tail.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![17, 18, 19]);
        assert_eq!(buffer.tail(100).len(), 20);
    }

    #[test]
    fn clear_resets_counters_and_smoothing() {
        let mut buffer = SampleBuffer::new(16);
        buffer.append(sample(0, 1.0));
        buffer.append(sample(10, 1.0));
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.total_appended(), 0);
        assert_eq!(buffer.avg_interval(), None);

        buffer.append(sample(500, 1.0));
        assert_eq!(buffer.avg_interval(), None);
    }
}
