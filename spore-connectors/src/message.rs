//! JSON wire messages
//!
//! Every client message is one JSON object followed by a NUL byte. The
//! server reads up to the NUL, so messages never contain raw newlines and
//! one TCP stream carries many of them back to back.
//!
//! ```text
//! {"version":1,"node":"spores-42","firmware":"spore-0.1.0","time_offset":1500,
//!  "measurements":[{"type":"temperature","value":21.5}],
//!  "calibrations":{"temperature":-0.4,"humidity":0.0,"pressure":0.0,"battery":0.05}}\0
//! ```

use crate::{ConnectorResult, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use spore_core::{Calibration, Reading, SensorKind};

/// Type tag of the placeholder sent when a batch has no leaf readings
pub const UPTIME_MEASUREMENT: &str = "uptime";

/// Measurement value, integral where the quantity is a count or offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    /// Counts and millisecond offsets
    Integer(i64),
    /// Physical quantities in display units
    Decimal(f64),
}

/// One `{type, value}` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Wire name of the sensor kind
    #[serde(rename = "type")]
    pub kind: String,
    /// Scaled value
    pub value: MeasurementValue,
}

impl Measurement {
    /// Convert one ring entry, applying the calibration offset for its kind
    ///
    /// Leaf readings are stored in thousandths and go out in display units.
    /// Particle counts are stored divided by 1000 and go out as counts.
    /// Timestamp entries go out as their raw offset from the timebase.
    pub fn from_reading(reading: Reading, calibration: &Calibration) -> Self {
        let kind = reading.kind;
        let raw = i64::from(reading.value);
        let value = match kind {
            SensorKind::TimestampOffset | SensorKind::Unknown => MeasurementValue::Integer(raw),
            k if k.is_particulate() => MeasurementValue::Integer(raw * 1000),
            k => {
                let adjusted = raw + i64::from(calibration.offset_for(k));
                MeasurementValue::Decimal(adjusted as f64 / 1000.0)
            }
        };
        Self {
            kind: kind.wire_name().to_string(),
            value,
        }
    }

    /// Placeholder carrying the node's uptime
    pub fn uptime(uptime_ms: u64) -> Self {
        Self {
            kind: UPTIME_MEASUREMENT.to_string(),
            value: MeasurementValue::Integer(i64::try_from(uptime_ms).unwrap_or(i64::MAX)),
        }
    }
}

/// Current calibration offsets in display units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBlock {
    /// Degrees Celsius
    pub temperature: f64,
    /// Percent relative humidity
    pub humidity: f64,
    /// Kilopascals
    pub pressure: f64,
    /// Volts
    pub battery: f64,
}

impl From<&Calibration> for CalibrationBlock {
    fn from(cal: &Calibration) -> Self {
        Self {
            temperature: f64::from(cal.temperature) / 1000.0,
            humidity: f64::from(cal.humidity) / 1000.0,
            pressure: f64::from(cal.pressure) / 1000.0,
            battery: f64::from(cal.battery) / 1000.0,
        }
    }
}

/// One batch of buffered readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Protocol version
    pub version: u32,
    /// Node id
    pub node: String,
    /// Firmware build tag
    pub firmware: String,
    /// Age of the shared timebase in ms; timestamp values are relative to it
    pub time_offset: i64,
    /// Batch contents, oldest first
    pub measurements: Vec<Measurement>,
    /// Present only on the batch that empties the ring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrations: Option<CalibrationBlock>,
}

impl TelemetryMessage {
    /// Batch message with no calibration block
    pub fn new(node: &str, firmware: &str, time_offset: i64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            node: node.to_string(),
            firmware: firmware.to_string(),
            time_offset,
            measurements: Vec::new(),
            calibrations: None,
        }
    }

    /// Builder: attach calibrations
    pub fn with_calibrations(mut self, calibration: &Calibration) -> Self {
        self.calibrations = Some(CalibrationBlock::from(calibration));
        self
    }

    /// True if at least one measurement is a physical quantity
    pub fn has_leaf_measurement(&self) -> bool {
        self.measurements.iter().any(|m| {
            SensorKind::ALL
                .iter()
                .any(|k| k.is_measurement() && k.wire_name() == m.kind)
        })
    }
}

/// Command to the server (`get_config`, `delete_config`, `update`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Protocol version
    pub version: u32,
    /// Node id
    pub node: String,
    /// Firmware build tag
    pub firmware: String,
    /// Command name
    pub command: String,
    /// Command argument
    pub arg: String,
}

impl CommandMessage {
    /// Command with the current protocol version
    pub fn new(node: &str, firmware: &str, command: &str, arg: &str) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            node: node.to_string(),
            firmware: firmware.to_string(),
            command: command.to_string(),
            arg: arg.to_string(),
        }
    }
}

/// Serialize to JSON and append the NUL terminator
pub fn encode<M: Serialize>(message: &M) -> ConnectorResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(0);
    Ok(bytes)
}
