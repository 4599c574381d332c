//! Typed sensor readings and their one-word packing
//!
//! Each reading occupies exactly one retained word:
//!
//! ```text
//!  31                              8 7     3 2   0
//! ┌─────────────────────────────────┬───────┬─────┐
//! │  value (signed, 24 bits)        │ rsvd  │kind │
//! └─────────────────────────────────┴───────┴─────┘
//! ```
//!
//! The layout is produced by explicit shifts and masks, never by
//! reinterpreting memory, so it is identical on every target.

use crate::constants::layout::{
    READING_KIND_BITS, READING_VALUE_MAX, READING_VALUE_MIN, READING_VALUE_SHIFT,
};
use crate::errors::{StoreError, StoreResult};

const KIND_MASK: u32 = (1 << READING_KIND_BITS) - 1;

/// What a stored reading measures
///
/// Discriminants are part of the retained layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorKind {
    /// Slot content not recognised
    Unknown = 0,
    /// Milli-degrees Celsius
    Temperature = 1,
    /// Milli-percent relative humidity
    Humidity = 2,
    /// Pascal (milli-kPa)
    Pressure = 3,
    /// Particles >1.0µm, thousands per cubic foot
    ParticulatePm1_0 = 4,
    /// Particles >2.5µm, thousands per cubic foot
    ParticulatePm2_5 = 5,
    /// Supply voltage in millivolts
    BatteryVoltage = 6,
    /// Millisecond offset from the shared timebase
    TimestampOffset = 7,
}

impl SensorKind {
    /// All kinds in discriminant order
    pub const ALL: [SensorKind; 8] = [
        SensorKind::Unknown,
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Pressure,
        SensorKind::ParticulatePm1_0,
        SensorKind::ParticulatePm2_5,
        SensorKind::BatteryVoltage,
        SensorKind::TimestampOffset,
    ];

    /// Decode the kind bits of a reading word
    pub const fn from_bits(bits: u8) -> Self {
        match bits & KIND_MASK as u8 {
            1 => SensorKind::Temperature,
            2 => SensorKind::Humidity,
            3 => SensorKind::Pressure,
            4 => SensorKind::ParticulatePm1_0,
            5 => SensorKind::ParticulatePm2_5,
            6 => SensorKind::BatteryVoltage,
            7 => SensorKind::TimestampOffset,
            _ => SensorKind::Unknown,
        }
    }

    /// Name used on the upload wire
    pub const fn wire_name(self) -> &'static str {
        match self {
            SensorKind::Unknown => "unknown",
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Pressure => "pressure",
            SensorKind::ParticulatePm1_0 => "particles_1_0",
            SensorKind::ParticulatePm2_5 => "particles_2_5",
            SensorKind::BatteryVoltage => "battery",
            SensorKind::TimestampOffset => "timestamp",
        }
    }

    /// Column label for the readings dump
    pub const fn label(self) -> &'static str {
        match self {
            SensorKind::Unknown => "UNKNOWN",
            SensorKind::Temperature => "TEMP (C)",
            SensorKind::Humidity => "HUMI (%)",
            SensorKind::Pressure => "PRES (kPa)",
            SensorKind::ParticulatePm1_0 => "1.0um (/cf)",
            SensorKind::ParticulatePm2_5 => "2.5um (/cf)",
            SensorKind::BatteryVoltage => "BATT (V)",
            SensorKind::TimestampOffset => "TIME (ms)",
        }
    }

    /// True for kinds that carry a physical measurement
    pub const fn is_measurement(self) -> bool {
        !matches!(self, SensorKind::Unknown | SensorKind::TimestampOffset)
    }

    /// True for particle counts, which are stored in thousands
    pub const fn is_particulate(self) -> bool {
        matches!(self, SensorKind::ParticulatePm1_0 | SensorKind::ParticulatePm2_5)
    }
}

/// A single buffered reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// What was measured
    pub kind: SensorKind,
    /// Fixed-point value, milli-units unless the kind says otherwise
    pub value: i32,
}

impl Reading {
    /// Empty slot content
    pub const EMPTY: Reading = Reading { kind: SensorKind::Unknown, value: 0 };

    /// Build a reading, rejecting values the 24-bit field cannot hold
    pub fn new(kind: SensorKind, value: i64) -> StoreResult<Self> {
        if value < READING_VALUE_MIN as i64 || value > READING_VALUE_MAX as i64 {
            return Err(StoreError::ValueOutOfRange {
                value,
                min: READING_VALUE_MIN as i64,
                max: READING_VALUE_MAX as i64,
            });
        }

        Ok(Self { kind, value: value as i32 })
    }

    /// Pack into a retained word
    ///
    /// The value must already fit 24 bits; the top byte of `value` is discarded.
    pub const fn to_word(self) -> u32 {
        (self.kind as u32 & KIND_MASK) | ((self.value as u32) << READING_VALUE_SHIFT)
    }

    /// Unpack a retained word, sign-extending the value
    pub const fn from_word(word: u32) -> Self {
        Self {
            kind: SensorKind::from_bits((word & KIND_MASK) as u8),
            value: (word as i32) >> READING_VALUE_SHIFT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_kind_in_low_bits() {
        let word = Reading { kind: SensorKind::Pressure, value: 1 }.to_word();
        assert_eq!(word, 0x0000_0103);
    }

    #[test]
    fn negative_values_sign_extend() {
        let reading = Reading::new(SensorKind::Temperature, -12_345).unwrap();
        let word = reading.to_word();
        assert_eq!(word & 0xFF, 1);
        assert_eq!(word >> 8, 0x00FF_CFC7);
        assert_eq!(Reading::from_word(word), reading);
    }

    #[test]
    fn field_limits() {
        for value in [READING_VALUE_MIN as i64, -1, 0, READING_VALUE_MAX as i64] {
            let reading = Reading::new(SensorKind::TimestampOffset, value).unwrap();
            assert_eq!(Reading::from_word(reading.to_word()).value as i64, value);
        }
    }

    #[test]
    fn rejects_out_of_range() {
        let err = Reading::new(SensorKind::Pressure, READING_VALUE_MAX as i64 + 1).unwrap_err();
        assert!(matches!(err, StoreError::ValueOutOfRange { value: 8_388_608, .. }));
        assert!(Reading::new(SensorKind::Pressure, READING_VALUE_MIN as i64 - 1).is_err());
    }

    #[test]
    fn reserved_bits_ignored() {
        // Bits 3-7 are reserved and must not leak into the kind
        let reading = Reading::from_word(0x0000_02F9);
        assert_eq!(reading.kind, SensorKind::Temperature);
        assert_eq!(reading.value, 2);
    }

    #[test]
    fn zeroed_slot_is_unknown() {
        assert_eq!(Reading::from_word(0), Reading::EMPTY);
    }

    #[test]
    fn kinds_round_trip_through_bits() {
        for kind in SensorKind::ALL {
            assert_eq!(SensorKind::from_bits(kind as u8), kind);
        }
        assert!(SensorKind::Humidity.is_measurement());
        assert!(!SensorKind::TimestampOffset.is_measurement());
        assert!(!SensorKind::Unknown.is_measurement());
    }
}
