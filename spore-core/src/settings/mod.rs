//! Long-lived node settings
//!
//! Names, report host and calibration offsets survive power loss in a
//! small key/file store outside retained memory. The store itself is an
//! external collaborator reached through [`SettingsStore`]; this module
//! gives it a typed view with defaults.
//!
//! ## Value Format
//!
//! Every setting is stored as short ASCII text:
//!
//! | Content                  | Meaning                    |
//! |--------------------------|----------------------------|
//! | missing, `""`, `" "`     | absent, use the default    |
//! | `"default"`              | absent, use the default    |
//! | `"42"`, `"0x2a"`         | integer                    |
//! | `"-1.5"`                 | float, kept as milli-units |
//!
//! Text that does not parse falls back to the default.
//!
//! ## Implementations
//!
//! - `MemorySettings`: fixed-capacity map for tests and simulation
//! - `FileSettings`: one file per name under a root directory (requires `std`)

use heapless::String;

use crate::clock;
use crate::constants::layout::NUM_STORAGE_SLOTS;
use crate::constants::time::{DEFAULT_SLEEP_CLOCK_ADJ_MS, DEFAULT_SLEEP_TIME_MS, MAX_SLEEP_TIME_MS};
use crate::constants::sensors::DEFAULT_HIGH_WATER_SLOT;
use crate::errors::StoreResult;
use crate::reading::SensorKind;
use crate::retained::{RetainedState, SleepParams};

mod memory;
pub use memory::MemorySettings;

#[cfg(feature = "std")]
mod file;
#[cfg(feature = "std")]
pub use file::FileSettings;

/// Largest value a setting may hold, in bytes
pub const MAX_SETTING_LEN: usize = 64;

/// Setting names
pub mod names {
    /// Node identifier sent with every upload
    pub const NODE_NAME: &str = "node_name";
    /// Upload server host
    pub const REPORT_HOST: &str = "report_host";
    /// Upload server TCP port
    pub const REPORT_PORT: &str = "report_port";
    /// Sleep clock calibration (ms per sleep)
    pub const CLOCK_DRIFT: &str = "clock_drift";
    /// Temperature offset (°C)
    pub const TEMP_ADJ: &str = "temp_adj";
    /// Humidity offset (%RH)
    pub const HUMIDITY_ADJ: &str = "humidity_adj";
    /// Pressure offset (kPa)
    pub const PRESSURE_ADJ: &str = "pressure_adj";
    /// Battery offset (V)
    pub const BATTERY_ADJ: &str = "battery_adj";
    /// Sleep duration override (ms)
    pub const SLEEP_TIME: &str = "sleep_time";
    /// Ring occupancy that triggers an upload
    pub const HIGH_WATER: &str = "high_water";
}

/// Every name the server may push a new value for, in fetch order
pub const CONFIG_NAMES: [&str; 10] = [
    names::NODE_NAME,
    names::REPORT_HOST,
    names::REPORT_PORT,
    names::CLOCK_DRIFT,
    names::TEMP_ADJ,
    names::HUMIDITY_ADJ,
    names::PRESSURE_ADJ,
    names::BATTERY_ADJ,
    names::SLEEP_TIME,
    names::HIGH_WATER,
];

/// Names whose value is duplicated into retained memory
const CACHED_NAMES: [&str; 6] = [
    names::CLOCK_DRIFT,
    names::TEMP_ADJ,
    names::HUMIDITY_ADJ,
    names::BATTERY_ADJ,
    names::SLEEP_TIME,
    names::HIGH_WATER,
];

/// Default upload server
pub const DEFAULT_REPORT_HOST: &str = "boxy";

/// Default upload port
pub const DEFAULT_REPORT_PORT: u16 = 2880;

/// Prefix of the default node name, followed by the chip id
pub const NODE_BASE_NAME: &str = "spores-";

/// Raw byte access to the settings store
pub trait SettingsStore {
    /// Copy the value of `name` into `buf`
    ///
    /// Returns the value length, or `None` if the name is not stored.
    fn read(&mut self, name: &str, buf: &mut [u8]) -> StoreResult<Option<usize>>;

    /// Replace the value of `name`
    fn write(&mut self, name: &str, data: &[u8]) -> StoreResult<()>;
}

/// Strip padding and map the "absent" spellings to `None`
pub fn trimmed(raw: &[u8]) -> Option<&str> {
    let text = core::str::from_utf8(raw).ok()?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if text.is_empty() || text == "default" {
        None
    } else {
        Some(text)
    }
}

/// Parse a decimal or `0x` hex integer
pub fn parse_int(raw: &[u8]) -> Option<i64> {
    let text = trimmed(raw)?;
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Parse a float and scale it to milli-units
pub fn parse_milli(raw: &[u8]) -> Option<i32> {
    let value: f32 = trimmed(raw)?.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(libm::roundf(value * 1000.0) as i32)
}

fn read_with<S, T>(
    store: &mut S,
    name: &str,
    parse: impl FnOnce(&[u8]) -> Option<T>,
) -> StoreResult<Option<T>>
where
    S: SettingsStore + ?Sized,
{
    let mut buf = [0u8; MAX_SETTING_LEN];
    Ok(match store.read(name, &mut buf)? {
        Some(len) => parse(&buf[..len.min(MAX_SETTING_LEN)]),
        None => None,
    })
}

/// Read an integer setting
pub fn read_int<S: SettingsStore + ?Sized>(store: &mut S, name: &str) -> StoreResult<Option<i64>> {
    read_with(store, name, parse_int)
}

/// Read a float setting as milli-units
pub fn read_milli<S: SettingsStore + ?Sized>(store: &mut S, name: &str) -> StoreResult<Option<i32>> {
    read_with(store, name, parse_milli)
}

/// Read a text setting
pub fn read_text<S: SettingsStore + ?Sized, const L: usize>(
    store: &mut S,
    name: &str,
) -> StoreResult<Option<String<L>>> {
    read_with(store, name, |raw| {
        let text = trimmed(raw)?;
        let owned = String::try_from(text).ok();
        if owned.is_none() {
            log_warn!("setting {} longer than {} bytes, ignored", name, L);
        }
        owned
    })
}

/// Per-kind offsets added to readings before upload (milli-units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    /// milli-°C
    pub temperature: i32,
    /// milli-%RH
    pub humidity: i32,
    /// Pa
    pub pressure: i32,
    /// mV
    pub battery: i32,
}

impl Calibration {
    /// Offset applied to readings of `kind`
    pub fn offset_for(&self, kind: SensorKind) -> i32 {
        match kind {
            SensorKind::Temperature => self.temperature,
            SensorKind::Humidity => self.humidity,
            SensorKind::Pressure => self.pressure,
            SensorKind::BatteryVoltage => self.battery,
            _ => 0,
        }
    }

    /// Offsets cached in retained memory
    ///
    /// Pressure has no cache word and reads as zero.
    pub fn from_cache<const N: usize>(state: &RetainedState<N>) -> Self {
        Self {
            temperature: state.temperature_calibration(),
            humidity: state.humidity_calibration(),
            pressure: 0,
            battery: state.battery_calibration(),
        }
    }

    /// Offsets from the settings store, zero when absent
    pub fn load<S: SettingsStore + ?Sized>(store: &mut S) -> StoreResult<Self> {
        Ok(Self {
            temperature: read_milli(store, names::TEMP_ADJ)?.unwrap_or(0),
            humidity: read_milli(store, names::HUMIDITY_ADJ)?.unwrap_or(0),
            pressure: read_milli(store, names::PRESSURE_ADJ)?.unwrap_or(0),
            battery: read_milli(store, names::BATTERY_ADJ)?.unwrap_or(0),
        })
    }
}

/// Typed settings with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    /// Identifier sent with every upload
    pub node_name: String<32>,
    /// Upload server host
    pub report_host: String<64>,
    /// Upload server port
    pub report_port: u16,
    /// Added to every sleep
    pub clock_drift_ms: u16,
    /// Reading offsets
    pub calibration: Calibration,
    /// Deep sleep duration
    pub sleep_time_ms: u32,
    /// Ring occupancy that triggers an upload
    pub high_water_slot: usize,
}

impl NodeSettings {
    /// Settings used when the store holds nothing
    pub fn defaults(chip_id: u32) -> Self {
        use core::fmt::Write;

        let mut node_name = String::new();
        // "spores-" plus at most ten digits always fits
        let _ = write!(node_name, "{}{}", NODE_BASE_NAME, chip_id);

        let mut report_host = String::new();
        let _ = report_host.push_str(DEFAULT_REPORT_HOST);

        Self {
            node_name,
            report_host,
            report_port: DEFAULT_REPORT_PORT,
            clock_drift_ms: DEFAULT_SLEEP_CLOCK_ADJ_MS,
            calibration: Calibration::default(),
            sleep_time_ms: DEFAULT_SLEEP_TIME_MS,
            high_water_slot: DEFAULT_HIGH_WATER_SLOT,
        }
    }

    /// Read every setting, falling back to defaults
    pub fn load<S: SettingsStore + ?Sized>(store: &mut S, chip_id: u32) -> StoreResult<Self> {
        let mut settings = Self::defaults(chip_id);

        if let Some(name) = read_text(store, names::NODE_NAME)? {
            settings.node_name = name;
        }
        if let Some(host) = read_text(store, names::REPORT_HOST)? {
            settings.report_host = host;
        }
        if let Some(port) = read_int(store, names::REPORT_PORT)? {
            match u16::try_from(port) {
                Ok(port) if port != 0 => settings.report_port = port,
                _ => log_warn!("report_port {} out of range, using {}", port, DEFAULT_REPORT_PORT),
            }
        }
        if let Some(drift) = read_int(store, names::CLOCK_DRIFT)? {
            settings.clock_drift_ms = clamp_drift(drift).unwrap_or(DEFAULT_SLEEP_CLOCK_ADJ_MS);
        }
        settings.calibration = Calibration::load(store)?;
        if let Some(sleep) = read_int(store, names::SLEEP_TIME)? {
            settings.sleep_time_ms = clamp_sleep(sleep).unwrap_or(DEFAULT_SLEEP_TIME_MS);
        }
        if let Some(slot) = read_int(store, names::HIGH_WATER)? {
            settings.high_water_slot = clamp_high_water(slot)
                .map(usize::from)
                .unwrap_or(DEFAULT_HIGH_WATER_SLOT);
        }

        Ok(settings)
    }

    /// Sleep parameters as cached in retained memory
    pub fn sleep_params(&self) -> SleepParams {
        SleepParams {
            high_water_slot: clamp_high_water(self.high_water_slot as i64).unwrap_or(0),
            sleep_time_ms: clamp_sleep(self.sleep_time_ms as i64).unwrap_or(0),
        }
    }
}

fn clamp_drift(value: i64) -> Option<u16> {
    (value > 0).then(|| value.min(u16::MAX as i64) as u16)
}

fn clamp_sleep(value: i64) -> Option<u32> {
    (value > 0).then(|| value.min(MAX_SLEEP_TIME_MS as i64) as u32)
}

fn clamp_high_water(value: i64) -> Option<u8> {
    (value > 0).then(|| value.min(NUM_STORAGE_SLOTS as i64) as u8)
}

/// Update the retained copy of a setting after its value changed
///
/// `raw` is the new stored text. Returns `true` if `name` has a cache.
pub fn refresh_cache<const N: usize>(state: &mut RetainedState<N>, name: &str, raw: &[u8]) -> bool {
    match name {
        names::CLOCK_DRIFT => {
            let drift = parse_int(raw).and_then(clamp_drift).unwrap_or(DEFAULT_SLEEP_CLOCK_ADJ_MS);
            clock::set_clock_calibration(state, drift);
        }
        names::TEMP_ADJ => state.set_temperature_calibration(parse_milli(raw).unwrap_or(0)),
        names::HUMIDITY_ADJ => state.set_humidity_calibration(parse_milli(raw).unwrap_or(0)),
        names::BATTERY_ADJ => state.set_battery_calibration(parse_milli(raw).unwrap_or(0)),
        names::SLEEP_TIME => {
            let mut params = state.sleep_params();
            params.sleep_time_ms = parse_int(raw).and_then(clamp_sleep).unwrap_or(0);
            state.set_sleep_params(params);
        }
        names::HIGH_WATER => {
            let mut params = state.sleep_params();
            params.high_water_slot = parse_int(raw).and_then(clamp_high_water).unwrap_or(0);
            state.set_sleep_params(params);
        }
        _ => return false,
    }
    log_debug!("refreshed retained cache for {}", name);
    true
}

/// Fill every retained cache from the settings store
///
/// Absent names reset their cache to the default.
pub fn seed_cache<const N: usize, S: SettingsStore + ?Sized>(
    state: &mut RetainedState<N>,
    store: &mut S,
) -> StoreResult<()> {
    let mut buf = [0u8; MAX_SETTING_LEN];
    for name in CACHED_NAMES {
        let len = store.read(name, &mut buf)?.unwrap_or(0).min(MAX_SETTING_LEN);
        refresh_cache(state, name, &buf[..len]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_spellings() {
        assert_eq!(trimmed(b""), None);
        assert_eq!(trimmed(b" "), None);
        assert_eq!(trimmed(b"default"), None);
        assert_eq!(trimmed(b"\0\0"), None);
        assert_eq!(trimmed(b" boxy\n"), Some("boxy"));
    }

    #[test]
    fn integers() {
        assert_eq!(parse_int(b"2880"), Some(2880));
        assert_eq!(parse_int(b"-120"), Some(-120));
        assert_eq!(parse_int(b"0x1F"), Some(31));
        assert_eq!(parse_int(b"twelve"), None);
        assert_eq!(parse_int(b"default"), None);
    }

    #[test]
    fn floats_scale_to_milli() {
        assert_eq!(parse_milli(b"-1.5"), Some(-1500));
        assert_eq!(parse_milli(b"0.0304"), Some(30));
        assert_eq!(parse_milli(b"2"), Some(2000));
        assert_eq!(parse_milli(b"NaN"), None);
        assert_eq!(parse_milli(b" "), None);
    }

    #[test]
    fn defaults_when_store_empty() {
        let mut store = MemorySettings::new();
        let settings = NodeSettings::load(&mut store, 1234567).unwrap();

        assert_eq!(settings.node_name.as_str(), "spores-1234567");
        assert_eq!(settings.report_host.as_str(), DEFAULT_REPORT_HOST);
        assert_eq!(settings.report_port, DEFAULT_REPORT_PORT);
        assert_eq!(settings.clock_drift_ms, DEFAULT_SLEEP_CLOCK_ADJ_MS);
        assert_eq!(settings.sleep_time_ms, DEFAULT_SLEEP_TIME_MS);
        assert_eq!(settings.high_water_slot, DEFAULT_HIGH_WATER_SLOT);
        assert_eq!(settings.calibration, Calibration::default());
    }

    #[test]
    fn stored_values_override_defaults() {
        let mut store = MemorySettings::new();
        store.write(names::NODE_NAME, b"porch").unwrap();
        store.write(names::REPORT_PORT, b"9000").unwrap();
        store.write(names::TEMP_ADJ, b"-0.75").unwrap();
        store.write(names::PRESSURE_ADJ, b"0.2").unwrap();
        store.write(names::HIGH_WATER, b"500").unwrap();
        store.write(names::SLEEP_TIME, b"default").unwrap();

        let settings = NodeSettings::load(&mut store, 1).unwrap();
        assert_eq!(settings.node_name.as_str(), "porch");
        assert_eq!(settings.report_port, 9000);
        assert_eq!(settings.calibration.temperature, -750);
        assert_eq!(settings.calibration.pressure, 200);
        assert_eq!(settings.high_water_slot, NUM_STORAGE_SLOTS);
        assert_eq!(settings.sleep_time_ms, DEFAULT_SLEEP_TIME_MS);
    }

    #[test]
    fn cache_refresh_by_name() {
        let mut state = RetainedState::<8>::new();

        assert!(refresh_cache(&mut state, names::CLOCK_DRIFT, b"250"));
        assert!(refresh_cache(&mut state, names::HUMIDITY_ADJ, b"3.25"));
        assert!(refresh_cache(&mut state, names::HIGH_WATER, b"6"));
        assert!(refresh_cache(&mut state, names::SLEEP_TIME, b"60000"));
        assert!(!refresh_cache(&mut state, names::REPORT_HOST, b"example.net"));

        assert_eq!(state.sleep_clock().clock_cal_ms, 250);
        assert_eq!(state.humidity_calibration(), 3250);
        assert_eq!(state.sleep_params(), SleepParams { high_water_slot: 6, sleep_time_ms: 60_000 });
    }

    #[test]
    fn non_positive_drift_uses_default() {
        let mut state = RetainedState::<8>::new();
        for raw in [&b"0"[..], b"-40"] {
            refresh_cache(&mut state, names::CLOCK_DRIFT, b"250");
            assert!(refresh_cache(&mut state, names::CLOCK_DRIFT, raw));
            assert_eq!(state.sleep_clock().clock_cal_ms, DEFAULT_SLEEP_CLOCK_ADJ_MS);
        }

        let mut store = MemorySettings::new();
        store.write(names::CLOCK_DRIFT, b"0").unwrap();
        let settings = NodeSettings::load(&mut store, 1).unwrap();
        assert_eq!(settings.clock_drift_ms, DEFAULT_SLEEP_CLOCK_ADJ_MS);
    }

    #[test]
    fn seed_resets_absent_caches() {
        let mut state = RetainedState::<8>::new();
        state.set_battery_calibration(99);
        let mut store = MemorySettings::new();
        store.write(names::TEMP_ADJ, b"1.1").unwrap();

        seed_cache(&mut state, &mut store).unwrap();
        assert_eq!(state.temperature_calibration(), 1100);
        assert_eq!(state.battery_calibration(), 0);
        assert_eq!(state.sleep_clock().clock_cal_ms, DEFAULT_SLEEP_CLOCK_ADJ_MS);
        assert_eq!(Calibration::from_cache(&state).temperature, 1100);
    }

    #[test]
    fn calibration_offsets_by_kind() {
        let calibration = Calibration { temperature: 1, humidity: 2, pressure: 3, battery: 4 };
        assert_eq!(calibration.offset_for(SensorKind::BatteryVoltage), 4);
        assert_eq!(calibration.offset_for(SensorKind::TimestampOffset), 0);
        assert_eq!(calibration.offset_for(SensorKind::ParticulatePm2_5), 0);
    }
}
