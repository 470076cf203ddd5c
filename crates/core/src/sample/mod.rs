use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two accelerometers mounted on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    #[serde(rename = "m1")]
    One,
    #[serde(rename = "m2")]
    Two,
}

/// Measurement axis of an accelerometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(name)
    }
}

/// Tri-axial acceleration reading from a single sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TriAxial {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TriAxial {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// A single timestamped reading from both sensors.
///
/// `timestamp` is the device clock in milliseconds and is only meaningful
/// relative to other samples from the same device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    #[serde(alias = "m1")]
    pub sensor1: TriAxial,
    #[serde(alias = "m2")]
    pub sensor2: TriAxial,
}

impl Sample {
    pub fn new(timestamp: i64, sensor1: TriAxial, sensor2: TriAxial) -> Self {
        Self {
            timestamp,
            sensor1,
            sensor2,
        }
    }

    pub fn reading(&self, sensor: Sensor) -> &TriAxial {
        match sensor {
            Sensor::One => &self.sensor1,
            Sensor::Two => &self.sensor2,
        }
    }

    pub fn value(&self, sensor: Sensor, axis: Axis) -> f64 {
        self.reading(sensor).get(axis)
    }
}

/// Parsed record handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    #[serde(rename = "data")]
    Sample(Sample),
    Status { message: String },
}

impl From<Sample> for Record {
    fn from(sample: Sample) -> Self {
        Record::Sample(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_values_by_sensor_and_axis() {
        let sample = Sample::new(
            10,
            TriAxial::new(1.0, 2.0, 3.0),
            TriAxial::new(4.0, 5.0, 6.0),
        );

        assert_eq!(sample.value(Sensor::One, Axis::Y), 2.0);
        assert_eq!(sample.value(Sensor::Two, Axis::Z), 6.0);
    }

    #[test]
    fn parses_data_and_status_records() {
        let data = r#"{"type":"data","timestamp":1200,"m1":{"x":1.5,"y":0.0,"z":-2.0},"m2":{"x":0.5,"y":0.25,"z":9.8}}"#;
        let record: Record = serde_json::from_str(data).unwrap();
        match record {
            Record::Sample(sample) => {
                assert_eq!(sample.timestamp, 1200);
                assert_eq!(sample.sensor1.z, -2.0);
                assert_eq!(sample.sensor2.z, 9.8);
            }
            other => panic!("expected a sample, got {other:?}"),
        }

        let status = r#"{"type":"status","message":"calibrating"}"#;
        let record: Record = serde_json::from_str(status).unwrap();
        assert_eq!(
            record,
            Record::Status {
                message: "calibrating".to_string()
            }
        );
    }

    #[test]
    fn accepts_long_sensor_names() {
        let data = r#"{"type":"data","timestamp":1,"sensor1":{"x":1,"y":2,"z":3},"sensor2":{"x":4,"y":5,"z":6}}"#;
        let record: Record = serde_json::from_str(data).unwrap();
        assert!(matches!(record, Record::Sample(s) if s.sensor2.x == 4.0));
    }
}
